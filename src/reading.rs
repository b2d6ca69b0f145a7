//! Sensor readings
//!
//! A `SensorEvent` is one decoded `data:` payload from the board, with the
//! sentinel defaults already substituted for missing keys. A `SensorReading`
//! is the same event once the store has given it an id and a receipt time.

use chrono::{DateTime, Local};
use eyre::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Format of the `receive_time` column
pub const RECEIVE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One event as sent by the board.
///
/// Keys are the short names the firmware uses. A missing key, a JSON `null`
/// or a value that cannot be read as a number falls back to the sentinel
/// default, never to NULL in the store.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SensorEvent {
    /// Temperature in °C
    #[serde(deserialize_with = "lenient_real")]
    pub temp: f64,
    /// Relative humidity in %
    #[serde(deserialize_with = "lenient_real")]
    pub hum: f64,
    /// Pressure in hPa
    #[serde(deserialize_with = "lenient_real")]
    pub press: f64,
    /// Gas resistance in kOhm
    #[serde(deserialize_with = "lenient_real")]
    pub gas: f64,
    /// Air quality in %
    #[serde(deserialize_with = "lenient_real")]
    pub aq: f64,
    /// Distance in mm, -1 when the ranging sensor reported nothing
    #[serde(deserialize_with = "lenient_dist")]
    pub dist: i64,
    #[serde(deserialize_with = "lenient_real")]
    pub lat: f64,
    #[serde(deserialize_with = "lenient_real")]
    pub lon: f64,
    /// Altitude in m
    #[serde(deserialize_with = "lenient_real")]
    pub alt: f64,
    /// SD card status, 1 = OK
    #[serde(deserialize_with = "lenient_sd")]
    pub sd: i64,
}

impl Default for SensorEvent {
    fn default() -> Self {
        Self {
            temp: 0.0,
            hum: 0.0,
            press: 0.0,
            gas: 0.0,
            aq: 0.0,
            dist: -1,
            lat: 0.0,
            lon: 0.0,
            alt: 0.0,
            sd: 0,
        }
    }
}

/// Numbers as-is, booleans as 1/0, numeric strings parsed
fn as_real(value: &Value) -> Option<f64> {
    let real = match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    real.filter(|v| v.is_finite())
}

/// Like `as_real`, truncating toward zero (`412.5` becomes `412`)
fn as_integer(value: &Value) -> Option<i64> {
    if let Value::Number(n) = value
        && let Some(i) = n.as_i64()
    {
        return Some(i);
    }
    as_real(value).map(|v| v.trunc() as i64)
}

fn lenient<'de, D, T>(deserializer: D, read: fn(&Value) -> Option<T>, default: T) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => default,
        Some(value) => read(&value).unwrap_or_else(|| {
            log::debug!("Unreadable sensor value {}, using default", value);
            default
        }),
    })
}

fn lenient_real<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    lenient(deserializer, as_real, 0.0)
}

fn lenient_dist<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    lenient(deserializer, as_integer, SensorEvent::default().dist)
}

fn lenient_sd<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    lenient(deserializer, as_integer, SensorEvent::default().sd)
}

impl SensorEvent {
    /// Decode the JSON text that follows the `data: ` marker.
    ///
    /// Only a JSON object is a valid event; individual values are never
    /// rejected, they fall back to their default instead.
    pub fn from_json(payload: &str) -> Result<Self> {
        let object: serde_json::Map<String, Value> =
            serde_json::from_str(payload).context("Sensor payload is not a JSON object")?;
        serde_json::from_value(Value::Object(object)).context("Invalid sensor payload")
    }

    /// One-line console summary
    pub fn summary(&self) -> String {
        format!(
            "T:{}C | H:{}% | AQ:{}% | D:{}mm | GPS:{},{}",
            self.temp, self.hum, self.aq, self.dist, self.lat, self.lon
        )
    }
}

/// A stored row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub id: i64,
    /// Local time the collector received the event, `RECEIVE_TIME_FORMAT`
    pub receive_time: String,
    #[serde(flatten)]
    pub event: SensorEvent,
}

/// Render a receipt timestamp the way it is stored
pub fn format_receive_time(at: DateTime<Local>) -> String {
    at.format(RECEIVE_TIME_FORMAT).to_string()
}
