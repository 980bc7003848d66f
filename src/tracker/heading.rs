//! Heading estimation from consecutive GPS fixes.
//!
//! Bearings use a flat-earth approximation around the mean latitude of each
//! pair. It holds at the scale of local drone tracking; it degrades over long
//! baselines and near the poles where `cos(lat)` approaches zero.

use std::f64::consts::PI;

use super::sample::{LatLng, PositionSample};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Displacements at or below this are treated as GPS jitter.
pub const DEAD_BAND_M: f64 = 0.75;

/// Yaw magnitudes up to this are read as radians, anything larger as degrees.
pub const YAW_RADIANS_LIMIT: f64 = 2.0 * PI + 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingSource {
    History,
    LastKnownGood,
    Yaw,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Heading {
    pub degrees: f64,
    pub source: HeadingSource,
}

impl Heading {
    /// Only headings derived from motion may replace the last-known-good value.
    pub fn is_estimated(&self) -> bool {
        self.source == HeadingSource::History
    }
}

pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid rounds tiny negatives up to exactly 360.0
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Compass bearing from `from` to `to`, clockwise from north.
pub fn bearing_flat(from: LatLng, to: LatLng) -> f64 {
    let d_lat = to.lat_rad() - from.lat_rad();
    let d_lng = (to.lng_rad() - from.lng_rad()) * mean_lat_cos(from, to);
    normalize_degrees(d_lng.atan2(d_lat).to_degrees())
}

/// Equirectangular distance in meters.
pub fn displacement_m(a: LatLng, b: LatLng) -> f64 {
    let dx = (b.lng_rad() - a.lng_rad()) * EARTH_RADIUS_M * mean_lat_cos(a, b);
    let dy = (b.lat_rad() - a.lat_rad()) * EARTH_RADIUS_M;
    (dx * dx + dy * dy).sqrt()
}

pub fn moved_enough(a: LatLng, b: LatLng) -> bool {
    displacement_m(a, b) > DEAD_BAND_M
}

fn mean_lat_cos(a: LatLng, b: LatLng) -> f64 {
    ((a.lat_rad() + b.lat_rad()) / 2.0).cos()
}

/// Bearing of the most recent adjacent pair that moved past the dead-band.
/// `history` must be oldest first.
pub fn estimate(history: &[PositionSample]) -> Option<f64> {
    history.windows(2).rev().find_map(|pair| {
        let a = pair[0].position?;
        let b = pair[1].position?;
        moved_enough(a, b).then(|| bearing_flat(a, b))
    })
}

pub fn yaw_to_degrees(yaw: f64) -> Option<f64> {
    if !yaw.is_finite() {
        return None;
    }
    let degrees = if yaw.abs() <= YAW_RADIANS_LIMIT {
        yaw.to_degrees()
    } else {
        yaw
    };
    Some(normalize_degrees(degrees))
}

struct HeadingInputs<'a> {
    history: &'a [PositionSample],
    last_known_good: Option<f64>,
}

type Provider = fn(&HeadingInputs<'_>) -> Option<f64>;

fn from_history(inputs: &HeadingInputs<'_>) -> Option<f64> {
    estimate(inputs.history)
}

fn from_last_known_good(inputs: &HeadingInputs<'_>) -> Option<f64> {
    inputs.last_known_good
}

fn from_yaw(inputs: &HeadingInputs<'_>) -> Option<f64> {
    inputs
        .history
        .last()
        .and_then(|s| s.yaw)
        .and_then(yaw_to_degrees)
}

const FALLBACK_CHAIN: [(HeadingSource, Provider); 3] = [
    (HeadingSource::History, from_history as Provider),
    (HeadingSource::LastKnownGood, from_last_known_good as Provider),
    (HeadingSource::Yaw, from_yaw as Provider),
];

/// Picks a heading through history, last-known-good, then yaw, then 0°.
pub fn resolve(history: &[PositionSample], last_known_good: Option<f64>) -> Heading {
    let inputs = HeadingInputs {
        history,
        last_known_good,
    };

    FALLBACK_CHAIN
        .iter()
        .find_map(|(source, provider)| {
            provider(&inputs).map(|degrees| Heading {
                degrees,
                source: *source,
            })
        })
        .unwrap_or(Heading {
            degrees: 0.0,
            source: HeadingSource::Default,
        })
}
