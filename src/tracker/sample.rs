use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use super::error::HistoryError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Returns `None` unless both components are finite.
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        if lat.is_finite() && lng.is_finite() {
            Some(Self { lat, lng })
        } else {
            None
        }
    }

    /// Parses a `"lat,lon"` pair.
    pub fn from_coordinates(coordinates: &str) -> Option<Self> {
        let parts: Vec<_> = coordinates.split(',').map(|s| s.trim()).collect();
        if parts.len() != 2 {
            return None;
        }
        let lat = parts[0].parse().ok()?;
        let lng = parts[1].parse().ok()?;
        Self::new(lat, lng)
    }

    pub fn lat_rad(&self) -> f64 {
        self.lat.to_radians()
    }

    pub fn lng_rad(&self) -> f64 {
        self.lng.to_radians()
    }
}

/// One entry of a `/data/{call_sign}` response as the backend stores it.
#[derive(Debug, Clone, Deserialize)]
pub struct Packet {
    #[serde(default)]
    pub call_sign: Option<String>,
    #[serde(default)]
    pub position: Option<RawPosition>,
    #[serde(default)]
    pub time_measured: Option<TimeMeasured>,
    #[serde(default)]
    pub orientation: Option<Orientation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPosition {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Orientation {
    #[serde(default)]
    pub yaw: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TimeMeasured {
    EpochMillis(i64),
    Fractional(f64),
    Text(String),
}

impl TimeMeasured {
    pub fn to_millis(&self) -> Option<i64> {
        match self {
            TimeMeasured::EpochMillis(ms) => Some(*ms),
            TimeMeasured::Fractional(ms) if ms.is_finite() => Some(ms.round() as i64),
            TimeMeasured::Fractional(_) => None,
            TimeMeasured::Text(s) => parse_timestamp(s),
        }
    }
}

fn parse_timestamp(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).timestamp_millis());
    }

    // Naive timestamps are taken as UTC
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc().timestamp_millis())
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionSample {
    pub call_sign: Option<String>,
    /// `None` when a coordinate is missing or non-finite.
    pub position: Option<LatLng>,
    pub timestamp_ms: i64,
    /// Radians or degrees, whichever the vehicle reports.
    pub yaw: Option<f64>,
}

impl PositionSample {
    /// Packets without a usable timestamp cannot be ordered and are dropped.
    pub fn from_packet(packet: Packet) -> Option<Self> {
        let timestamp_ms = packet.time_measured.as_ref()?.to_millis()?;
        let position = packet
            .position
            .and_then(|p| LatLng::new(p.latitude?, p.longitude?));
        let yaw = packet
            .orientation
            .and_then(|o| o.yaw)
            .filter(|y| y.is_finite());

        Some(Self {
            call_sign: packet.call_sign,
            position,
            timestamp_ms,
            yaw,
        })
    }
}

/// Decodes a raw history response. Ordering is left to the caller.
///
/// An empty array is a valid, empty history. A non-empty one where every
/// packet had to be dropped is an error.
pub fn decode_history(body: &[u8]) -> Result<Vec<PositionSample>, HistoryError> {
    let packets: Vec<Packet> = serde_json::from_slice(body)?;
    let total = packets.len();
    let samples: Vec<_> = packets
        .into_iter()
        .filter_map(PositionSample::from_packet)
        .collect();

    if samples.is_empty() && total > 0 {
        return Err(HistoryError::NoUsableSamples(total));
    }
    if samples.len() < total {
        log::debug!(
            "Dropped {} of {} packets without a usable timestamp",
            total - samples.len(),
            total
        );
    }

    Ok(samples)
}
