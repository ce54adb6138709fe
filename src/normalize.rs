//! Tolerant field extraction
//!
//! Device response payloads are free-form key/value maps whose key names
//! drift across firmware revisions and models. Each canonical metric
//! therefore carries an explicit, ordered alias table: the exact key is
//! tried first, then each alias in order, each candidate checked at the top
//! level and one level down inside known category sub-objects. The first
//! key that resolves to a type-compatible value wins; a present but
//! incompatible value is treated as absent so later aliases still get a
//! chance. A metric no key resolves for is simply omitted — the poller's
//! stale-value retention handles the rest.

use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::trace;

use crate::protocol::Command;

/// A normalized measurement value.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Float(f64),
    Int(i64),
    Text(String),
}

/// Expected value shape for a metric; drives coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricKind {
    Float,
    Int,
    Text,
}

/// One canonical metric with its lookup and conversion rules.
struct MetricSpec {
    name: &'static str,
    kind: MetricKind,
    /// Primary key as documented for current firmware
    exact: &'static str,
    /// Accepted fallbacks, in authoritative precedence order
    aliases: &'static [&'static str],
    /// Multiplier applied to numeric values (device reports some fields in
    /// tenths or tens of the display unit)
    scale: f64,
}

impl MetricSpec {
    const fn float(
        name: &'static str,
        exact: &'static str,
        aliases: &'static [&'static str],
    ) -> Self {
        Self { name, kind: MetricKind::Float, exact, aliases, scale: 1.0 }
    }

    const fn scaled(
        name: &'static str,
        exact: &'static str,
        aliases: &'static [&'static str],
        scale: f64,
    ) -> Self {
        Self { name, kind: MetricKind::Float, exact, aliases, scale }
    }

    const fn int(
        name: &'static str,
        exact: &'static str,
        aliases: &'static [&'static str],
    ) -> Self {
        Self { name, kind: MetricKind::Int, exact, aliases, scale: 1.0 }
    }

    const fn text(
        name: &'static str,
        exact: &'static str,
        aliases: &'static [&'static str],
    ) -> Self {
        Self { name, kind: MetricKind::Text, exact, aliases, scale: 1.0 }
    }
}

/// Sub-object names a payload may group fields under; one nesting level is
/// searched, nothing deeper.
const CATEGORY_KEYS: &[&str] = &["bat", "battery", "es", "em", "wifi", "ble", "result"];

const BATTERY_METRICS: &[MetricSpec] = &[
    MetricSpec::float("battery_voltage", "voltage", &["volt", "v", "bat_voltage"]),
    MetricSpec::float("battery_current", "current", &["curr", "i", "bat_current"]),
    MetricSpec::float("battery_power", "power", &["bat_power", "w"]),
    MetricSpec::int("battery_soc", "soc", &["bat_soc", "battery_soc"]),
    // Firmware reports temperature in tenths of a degree
    MetricSpec::scaled("battery_temperature", "bat_temp", &["temp", "temperature"], 0.1),
    // Capacity arrives in tens of watt-hours
    MetricSpec::scaled("battery_capacity", "bat_capacity", &["capacity"], 10.0),
    MetricSpec::float("battery_rated_capacity", "rated_capacity", &["rated_cap"]),
    MetricSpec::text("battery_error_code", "error_code", &["err_code"]),
];

const MODE_METRICS: &[MetricSpec] = &[
    MetricSpec::text("operating_mode", "mode", &["work_mode"]),
    MetricSpec::int("ongrid_power", "ongrid_power", &["on_grid_power", "grid_power"]),
    MetricSpec::int("offgrid_power", "offgrid_power", &["off_grid_power"]),
    MetricSpec::int("mode_battery_soc", "bat_soc", &[]),
];

const ENERGY_METER_METRICS: &[MetricSpec] = &[
    MetricSpec::int("ct_state", "ct_state", &["ct_status"]),
    MetricSpec::int("phase_a_power", "a_power", &["phase_a"]),
    MetricSpec::int("phase_b_power", "b_power", &["phase_b"]),
    MetricSpec::int("phase_c_power", "c_power", &["phase_c"]),
    MetricSpec::int("total_power", "total_power", &["power_total", "total"]),
];

const WIFI_METRICS: &[MetricSpec] = &[
    MetricSpec::text("wifi_ssid", "ssid", &["wifi_name"]),
    MetricSpec::int("wifi_signal_strength", "rssi", &["signal", "wifi_rssi"]),
    MetricSpec::text("station_ip", "sta_ip", &["ip"]),
    MetricSpec::text("gateway_ip", "sta_gate", &["gateway"]),
    MetricSpec::text("subnet_mask", "sta_mask", &["mask"]),
    MetricSpec::text("dns_server", "sta_dns", &["dns"]),
];

const BLE_METRICS: &[MetricSpec] = &[
    MetricSpec::text("ble_state", "state", &["ble_state"]),
    MetricSpec::text("ble_mac", "ble_mac", &["mac"]),
];

const DEVICE_INFO_METRICS: &[MetricSpec] = &[
    MetricSpec::text("device_name", "device_name", &["name", "dev_name"]),
    MetricSpec::text("device_version", "device_version", &["version", "ver", "fw_version"]),
    MetricSpec::text("device_ble_mac", "ble_mac", &["mac"]),
    MetricSpec::text("device_wifi_mac", "wifi_mac", &[]),
    MetricSpec::text("device_reported_ip", "ip", &["sta_ip", "wifi_ip"]),
];

fn metrics_for(command: Command) -> &'static [MetricSpec] {
    match command {
        Command::BatteryStatus => BATTERY_METRICS,
        Command::ModeStatus => MODE_METRICS,
        Command::EnergyMeterStatus => ENERGY_METER_METRICS,
        Command::WifiStatus => WIFI_METRICS,
        Command::BleStatus => BLE_METRICS,
        Command::DeviceInfo => DEVICE_INFO_METRICS,
    }
}

/// All canonical metric names a command can produce. The poller uses this to
/// size snapshots; the probe tool uses it for display.
pub fn metric_names(command: Command) -> impl Iterator<Item = &'static str> {
    metrics_for(command).iter().map(|spec| spec.name)
}

/// Extract every canonical metric the payload carries for `command`.
/// Metrics without a resolvable, type-compatible key are omitted. Pure:
/// the same payload always yields the same mapping.
pub fn extract(command: Command, payload: &Value) -> HashMap<&'static str, MetricValue> {
    let mut extracted = HashMap::new();
    let Some(root) = payload.as_object() else {
        return extracted;
    };
    for spec in metrics_for(command) {
        if let Some(value) = resolve(root, spec) {
            extracted.insert(spec.name, value);
        } else {
            trace!(metric = spec.name, method = command.method(), "no key resolved");
        }
    }
    extracted
}

/// Try the exact key, then each alias in table order. For each candidate
/// key, the top level is checked before category sub-objects.
fn resolve(root: &Map<String, Value>, spec: &MetricSpec) -> Option<MetricValue> {
    std::iter::once(spec.exact)
        .chain(spec.aliases.iter().copied())
        .find_map(|key| lookup(root, key).and_then(|raw| coerce(raw, spec)))
}

/// Case-insensitive lookup at the top level and one level down.
fn lookup<'a>(root: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    if let Some(value) = get_ci(root, key) {
        return Some(value);
    }
    for category in CATEGORY_KEYS {
        if let Some(Value::Object(sub)) = get_ci(root, category) {
            if let Some(value) = get_ci(sub, key) {
                return Some(value);
            }
        }
    }
    None
}

fn get_ci<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

/// Coerce a raw JSON value into the metric's expected shape. Incompatible
/// values yield `None` rather than an error so schema drift never aborts a
/// poll cycle.
fn coerce(raw: &Value, spec: &MetricSpec) -> Option<MetricValue> {
    match spec.kind {
        MetricKind::Float => as_number(raw).map(|n| {
            let scaled = n * spec.scale;
            if (spec.scale - 1.0).abs() > f64::EPSILON {
                // Keep one decimal after unit conversion
                MetricValue::Float((scaled * 10.0).round() / 10.0)
            } else {
                MetricValue::Float(scaled)
            }
        }),
        MetricKind::Int => as_number(raw).map(|n| MetricValue::Int(n.round() as i64)),
        MetricKind::Text => match raw {
            Value::String(s) => Some(MetricValue::Text(s.clone())),
            Value::Number(n) => Some(MetricValue::Text(n.to_string())),
            _ => None,
        },
    }
}

/// Numbers, or numeric-looking strings.
fn as_number(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
