use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde_json::{json, Value};

use crate::tracker::LatLng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl Bounds {
    pub fn from_points<I: IntoIterator<Item = LatLng>>(points: I) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let mut bounds = Bounds {
            south_west: first,
            north_east: first,
        };
        for p in points {
            bounds.south_west.lat = bounds.south_west.lat.min(p.lat);
            bounds.south_west.lng = bounds.south_west.lng.min(p.lng);
            bounds.north_east.lat = bounds.north_east.lat.max(p.lat);
            bounds.north_east.lng = bounds.north_east.lng.max(p.lng);
        }
        Some(bounds)
    }

    /// Grows each side by `ratio` of the span on that axis.
    pub fn pad(self, ratio: f64) -> Self {
        let lat_buffer = (self.north_east.lat - self.south_west.lat).abs() * ratio;
        let lng_buffer = (self.north_east.lng - self.south_west.lng).abs() * ratio;
        Bounds {
            south_west: LatLng {
                lat: self.south_west.lat - lat_buffer,
                lng: self.south_west.lng - lng_buffer,
            },
            north_east: LatLng {
                lat: self.north_east.lat + lat_buffer,
                lng: self.north_east.lng + lng_buffer,
            },
        }
    }
}

/// Capabilities the poll loop needs from a map.
pub trait Renderer: Send {
    fn set_view(&mut self, _center: LatLng, _zoom: u8) {}

    fn set_marker_position(&mut self, call_sign: &str, position: LatLng);

    fn set_marker_rotation(&mut self, call_sign: &str, degrees: f64);

    fn set_marker_label(&mut self, _call_sign: &str, _label: &str) {}

    fn set_path(&mut self, call_sign: &str, points: &[LatLng]);

    fn pan_to(&mut self, position: LatLng);

    fn fit_bounds(&mut self, _bounds: Bounds) {}

    /// Called once after each applied response.
    fn finish_frame(&mut self) {}
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn set_view(&mut self, center: LatLng, zoom: u8) {
        (**self).set_view(center, zoom)
    }

    fn set_marker_position(&mut self, call_sign: &str, position: LatLng) {
        (**self).set_marker_position(call_sign, position)
    }

    fn set_marker_rotation(&mut self, call_sign: &str, degrees: f64) {
        (**self).set_marker_rotation(call_sign, degrees)
    }

    fn set_marker_label(&mut self, call_sign: &str, label: &str) {
        (**self).set_marker_label(call_sign, label)
    }

    fn set_path(&mut self, call_sign: &str, points: &[LatLng]) {
        (**self).set_path(call_sign, points)
    }

    fn pan_to(&mut self, position: LatLng) {
        (**self).pan_to(position)
    }

    fn fit_bounds(&mut self, bounds: Bounds) {
        (**self).fit_bounds(bounds)
    }

    fn finish_frame(&mut self) {
        (**self).finish_frame()
    }
}

pub fn marker_label(call_sign: &str, position: LatLng) -> String {
    format!(
        "Drone {}\n{:.4}, {:.4}",
        call_sign, position.lat, position.lng
    )
}

/// Reports every map change through `log`.
#[derive(Debug, Default)]
pub struct LogRenderer;

impl Renderer for LogRenderer {
    fn set_view(&mut self, center: LatLng, zoom: u8) {
        log::info!("View centered on {:.4}, {:.4} at zoom {}", center.lat, center.lng, zoom);
    }

    fn set_marker_position(&mut self, call_sign: &str, position: LatLng) {
        log::info!("{} at {:.6}, {:.6}", call_sign, position.lat, position.lng);
    }

    fn set_marker_rotation(&mut self, call_sign: &str, degrees: f64) {
        log::info!("{} heading {:.1}°", call_sign, degrees);
    }

    fn set_path(&mut self, call_sign: &str, points: &[LatLng]) {
        log::debug!("{} path has {} points", call_sign, points.len());
    }

    fn pan_to(&mut self, position: LatLng) {
        log::debug!("Pan to {:.6}, {:.6}", position.lat, position.lng);
    }

    fn fit_bounds(&mut self, bounds: Bounds) {
        log::debug!(
            "Fit bounds {:.4},{:.4} .. {:.4},{:.4}",
            bounds.south_west.lat,
            bounds.south_west.lng,
            bounds.north_east.lat,
            bounds.north_east.lng
        );
    }
}

#[derive(Debug, Default)]
struct MarkerLayer {
    position: Option<LatLng>,
    heading: Option<f64>,
    label: Option<String>,
    path: Vec<LatLng>,
}

/// Keeps a GeoJSON snapshot of the map on disk, rewritten after every frame.
pub struct GeoJsonRenderer {
    path: PathBuf,
    layers: BTreeMap<String, MarkerLayer>,
    view: Option<(LatLng, u8)>,
    bounds: Option<Bounds>,
    dirty: bool,
}

impl GeoJsonRenderer {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            layers: BTreeMap::new(),
            view: None,
            bounds: None,
            dirty: false,
        }
    }

    fn layer(&mut self, call_sign: &str) -> &mut MarkerLayer {
        self.dirty = true;
        self.layers.entry(call_sign.to_string()).or_default()
    }

    pub fn to_geojson(&self) -> Value {
        let mut features = Vec::new();
        for (call_sign, layer) in &self.layers {
            if layer.path.len() > 1 {
                features.push(json!({
                    "type": "Feature",
                    "geometry": {
                        "type": "LineString",
                        "coordinates": layer.path.iter().map(|p| [p.lng, p.lat]).collect::<Vec<_>>(),
                    },
                    "properties": { "call_sign": call_sign, "kind": "path" },
                }));
            }
            if let Some(p) = layer.position {
                features.push(json!({
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [p.lng, p.lat] },
                    "properties": {
                        "call_sign": call_sign,
                        "kind": "marker",
                        "heading": layer.heading,
                        "label": layer.label,
                    },
                }));
            }
        }

        let mut collection = json!({ "type": "FeatureCollection", "features": features });
        if let Some(b) = self.bounds {
            collection["bbox"] = json!([
                b.south_west.lng,
                b.south_west.lat,
                b.north_east.lng,
                b.north_east.lat
            ]);
        }
        if let Some((center, zoom)) = self.view {
            collection["view"] = json!({ "center": [center.lng, center.lat], "zoom": zoom });
        }
        collection
    }

    fn write(&self) -> std::io::Result<()> {
        let body = serde_json::to_vec_pretty(&self.to_geojson())?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)
    }
}

impl Renderer for GeoJsonRenderer {
    fn set_view(&mut self, center: LatLng, zoom: u8) {
        self.view = Some((center, zoom));
        self.dirty = true;
    }

    fn set_marker_position(&mut self, call_sign: &str, position: LatLng) {
        self.layer(call_sign).position = Some(position);
    }

    fn set_marker_rotation(&mut self, call_sign: &str, degrees: f64) {
        self.layer(call_sign).heading = Some(degrees);
    }

    fn set_marker_label(&mut self, call_sign: &str, label: &str) {
        self.layer(call_sign).label = Some(label.to_string());
    }

    fn set_path(&mut self, call_sign: &str, points: &[LatLng]) {
        self.layer(call_sign).path = points.to_vec();
    }

    fn pan_to(&mut self, position: LatLng) {
        if let Some((_, zoom)) = self.view {
            self.view = Some((position, zoom));
            self.dirty = true;
        }
    }

    fn fit_bounds(&mut self, bounds: Bounds) {
        self.bounds = Some(bounds);
        self.dirty = true;
    }

    fn finish_frame(&mut self) {
        if !self.dirty {
            return;
        }
        match self.write() {
            Ok(()) => self.dirty = false,
            Err(e) => log::warn!("Failed to write {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ll(lat: f64, lng: f64) -> LatLng {
        LatLng::new(lat, lng).unwrap()
    }

    #[test]
    fn bounds_cover_all_points() {
        let b = Bounds::from_points([ll(27.1, -97.2), ll(27.3, -97.4), ll(27.2, -97.3)]).unwrap();
        assert_eq!(b.south_west, ll(27.1, -97.4));
        assert_eq!(b.north_east, ll(27.3, -97.2));
        assert!(Bounds::from_points(Vec::new()).is_none());
    }

    #[test]
    fn padding_grows_each_side() {
        let b = Bounds::from_points([ll(27.0, -97.0), ll(28.0, -95.0)])
            .unwrap()
            .pad(0.2);
        assert_abs_diff_eq!(b.south_west.lat, 26.8, epsilon = 1e-9);
        assert_abs_diff_eq!(b.north_east.lat, 28.2, epsilon = 1e-9);
        assert_abs_diff_eq!(b.south_west.lng, -97.4, epsilon = 1e-9);
        assert_abs_diff_eq!(b.north_east.lng, -94.6, epsilon = 1e-9);
    }

    #[test]
    fn single_marker_bounds_stay_a_point() {
        let b = Bounds::from_points([ll(27.0, -97.0)]).unwrap().pad(0.2);
        assert_eq!(b.south_west, b.north_east);
    }

    #[test]
    fn label_uses_four_decimals() {
        assert_eq!(
            marker_label("DUSKY24", ll(27.71234, -97.32461)),
            "Drone DUSKY24\n27.7123, -97.3246"
        );
    }

    #[test]
    fn geojson_snapshot_is_written_per_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.geojson");
        let mut renderer = GeoJsonRenderer::new(path.clone());

        renderer.finish_frame();
        assert!(!path.exists());

        renderer.set_path("DUSKY18", &[ll(27.0, -97.0), ll(27.001, -97.0)]);
        renderer.set_marker_position("DUSKY18", ll(27.001, -97.0));
        renderer.set_marker_rotation("DUSKY18", 12.5);
        renderer.finish_frame();

        let written: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        let features = written["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0]["geometry"]["type"], "LineString");
        assert_eq!(features[1]["geometry"]["coordinates"][1], 27.001);
        assert_eq!(features[1]["properties"]["heading"], 12.5);
    }
}
