//! Standalone probe tool for Marstek devices
//!
//! Sweeps the device's status commands (or a single chosen method) through
//! the library's scheduler and prints the raw and normalized results. Useful
//! for checking a device before wiring it into a monitoring host:
//!
//! ```bash
//! marstek-probe 192.168.1.100
//! marstek-probe 192.168.1.100 --method Wifi.GetStatus --timeout-ms 2000
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use marstek_udp::{
    extract, Command, CommandScheduler, ConnectionValidator, MarstekConfig, UdpTransport,
    ValidatePolicy,
};

#[derive(Parser, Debug)]
#[command(name = "marstek-probe", about = "Probe a Marstek battery over UDP")]
struct Args {
    /// Device IP address or hostname
    device_ip: String,

    /// Port the device listens on
    #[arg(long, default_value_t = 30000)]
    remote_port: u16,

    /// Local port to bind (0 picks an ephemeral port)
    #[arg(long, default_value_t = 0)]
    local_port: u16,

    /// Device id used in request params
    #[arg(long, default_value_t = 0)]
    device_id: u32,

    /// BLE MAC string for Marstek.GetDevice; without it the sweep skips
    /// that command
    #[arg(long)]
    ble_mac: Option<String>,

    /// Per-call response deadline in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Minimum delay between device calls in milliseconds
    #[arg(long, default_value_t = 2000)]
    gap_ms: u64,

    /// Probe a single method (e.g. Bat.GetStatus) instead of the full sweep
    #[arg(long)]
    method: Option<String>,

    /// Skip the initial connectivity validation
    #[arg(long)]
    no_validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = MarstekConfig::new(&args.device_ip);
    config.remote_port = args.remote_port;
    config.local_port = args.local_port;
    config.device_id = args.device_id;
    config.ble_mac = args.ble_mac.clone();
    config.timeout_ms = args.timeout_ms;
    config.min_command_gap_ms = args.gap_ms;

    let commands: Vec<Command> = match &args.method {
        Some(method) => {
            let command = Command::from_method(method)
                .with_context(|| format!("unknown method {method:?}"))?;
            vec![command]
        }
        None if config.ble_mac.is_some() => Command::ALL.to_vec(),
        None => Command::POLL_SEQUENCE.to_vec(),
    };

    let transport = UdpTransport::bind(&config)
        .await
        .context("binding UDP transport")?;
    let mut scheduler = CommandScheduler::new(transport, config.command_gap());

    if !args.no_validate {
        let validator = ConnectionValidator::new(ValidatePolicy::from_config(&config));
        if let Err(e) = validator.validate(&mut scheduler).await {
            bail!("device did not respond: {e}");
        }
        println!("connection to {} validated", config.remote_addr());
    }

    let results = scheduler.run_sequence(&commands).await;

    let mut succeeded = 0;
    for (command, outcome) in &results {
        println!("\n== {} ==", command.method());
        match outcome {
            Ok(response) => {
                succeeded += 1;
                let payload = response.result.clone().unwrap_or(serde_json::Value::Null);
                println!("raw: {payload}");
                let metrics = extract(*command, &payload);
                if metrics.is_empty() {
                    println!("(no canonical metrics resolved)");
                }
                let mut names: Vec<_> = metrics.keys().collect();
                names.sort();
                for name in names {
                    println!("  {name} = {:?}", metrics[name]);
                }
            }
            Err(e) => println!("failed: {e}"),
        }
    }

    println!("\n{succeeded}/{} commands answered", results.len());
    if succeeded == 0 {
        bail!("no command produced a response — check the address, port, and that the device's local API is enabled");
    }
    Ok(())
}
