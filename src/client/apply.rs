use super::render::{marker_label, Renderer};
use super::store::HeadingStore;
use crate::tracker::{heading, EntityState, Heading, LatLng, PositionSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    /// One entity drawn with its path, viewport following the marker.
    Follow,
    /// Markers only; the caller fits the viewport around all of them.
    Fleet,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Empty,
    Stale { newest_ms: i64, last_applied_ms: i64 },
    Applied { newest_ms: i64, heading: Heading },
}

/// Renders one history response for `state` unless it is empty or stale.
pub fn apply_history<R, S>(
    state: &mut EntityState,
    mut history: Vec<PositionSample>,
    mode: ViewMode,
    renderer: &mut R,
    store: &mut S,
) -> ApplyOutcome
where
    R: Renderer + ?Sized,
    S: HeadingStore + ?Sized,
{
    history.sort_by_key(|s| s.timestamp_ms);

    let Some(latest) = history.last() else {
        return ApplyOutcome::Empty;
    };
    let newest_ms = latest.timestamp_ms;

    if let Some(last_applied_ms) = state.last_applied_ms.filter(|_| state.is_stale(newest_ms)) {
        return ApplyOutcome::Stale {
            newest_ms,
            last_applied_ms,
        };
    }

    if mode == ViewMode::Follow {
        let path: Vec<LatLng> = history.iter().filter_map(|s| s.position).collect();
        renderer.set_path(&state.call_sign, &path);
    }

    if state.last_heading.is_none() && !state.heading_restored {
        state.last_heading = store.load(&state.call_sign);
        state.heading_restored = true;
    }

    let heading = heading::resolve(&history, state.last_heading);
    if heading.is_estimated() {
        state.last_heading = Some(heading.degrees);
    }
    if let Some(last_good) = state.last_heading {
        if let Err(e) = store.save(&state.call_sign, last_good) {
            log::warn!("Failed to persist heading for {}: {}", state.call_sign, e);
        }
    }

    match latest.position {
        Some(position) => {
            let label_name = latest.call_sign.as_deref().unwrap_or(&state.call_sign);
            renderer.set_marker_position(&state.call_sign, position);
            renderer.set_marker_rotation(&state.call_sign, heading.degrees);
            renderer.set_marker_label(&state.call_sign, &marker_label(label_name, position));
            if mode == ViewMode::Follow {
                renderer.pan_to(position);
            }
            state.marker = Some(position);
        }
        None => log::debug!(
            "{}: newest sample has no usable position, marker left in place",
            state.call_sign
        ),
    }

    state.last_applied_ms = Some(newest_ms);
    ApplyOutcome::Applied { newest_ms, heading }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::client::render::Bounds;
    use crate::client::store::MemoryStore;
    use crate::tracker::heading::HeadingSource;
    use approx::assert_abs_diff_eq;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        View(LatLng, u8),
        Position(String, LatLng),
        Rotation(String, f64),
        Label(String, String),
        Path(String, Vec<LatLng>),
        Pan(LatLng),
        Fit(Bounds),
        Frame,
    }

    #[derive(Debug, Default)]
    pub struct RecordingRenderer {
        pub calls: Vec<Call>,
    }

    impl Renderer for RecordingRenderer {
        fn set_view(&mut self, center: LatLng, zoom: u8) {
            self.calls.push(Call::View(center, zoom));
        }

        fn set_marker_position(&mut self, call_sign: &str, position: LatLng) {
            self.calls.push(Call::Position(call_sign.into(), position));
        }

        fn set_marker_rotation(&mut self, call_sign: &str, degrees: f64) {
            self.calls.push(Call::Rotation(call_sign.into(), degrees));
        }

        fn set_marker_label(&mut self, call_sign: &str, label: &str) {
            self.calls.push(Call::Label(call_sign.into(), label.into()));
        }

        fn set_path(&mut self, call_sign: &str, points: &[LatLng]) {
            self.calls.push(Call::Path(call_sign.into(), points.to_vec()));
        }

        fn pan_to(&mut self, position: LatLng) {
            self.calls.push(Call::Pan(position));
        }

        fn fit_bounds(&mut self, bounds: Bounds) {
            self.calls.push(Call::Fit(bounds));
        }

        fn finish_frame(&mut self) {
            self.calls.push(Call::Frame);
        }
    }

    pub fn sample(lat: f64, lng: f64, timestamp_ms: i64) -> PositionSample {
        PositionSample {
            call_sign: Some("DUSKY18".into()),
            position: LatLng::new(lat, lng),
            timestamp_ms,
            yaw: None,
        }
    }

    fn ll(lat: f64, lng: f64) -> LatLng {
        LatLng::new(lat, lng).unwrap()
    }

    #[test]
    fn sorts_before_rendering() {
        let mut state = EntityState::new("DUSKY18");
        let mut renderer = RecordingRenderer::default();
        let mut store = MemoryStore::default();

        let history = vec![
            sample(27.0, -96.998, 3_000),
            sample(27.0, -97.0, 1_000),
            sample(27.0, -96.999, 2_000),
        ];
        let outcome = apply_history(
            &mut state,
            history,
            ViewMode::Follow,
            &mut renderer,
            &mut store,
        );

        let ApplyOutcome::Applied { newest_ms, heading } = outcome else {
            panic!("expected an applied update, got {:?}", outcome);
        };
        assert_eq!(newest_ms, 3_000);
        assert_abs_diff_eq!(heading.degrees, 90.0, epsilon = 1e-6);

        assert_eq!(
            renderer.calls[0],
            Call::Path(
                "DUSKY18".into(),
                vec![ll(27.0, -97.0), ll(27.0, -96.999), ll(27.0, -96.998)]
            )
        );
        assert_eq!(
            renderer.calls[1],
            Call::Position("DUSKY18".into(), ll(27.0, -96.998))
        );
        assert_eq!(renderer.calls.last(), Some(&Call::Pan(ll(27.0, -96.998))));
        assert_eq!(state.last_applied_ms, Some(3_000));
        assert_eq!(state.marker, Some(ll(27.0, -96.998)));
    }

    #[test]
    fn stale_response_changes_nothing() {
        let mut state = EntityState::new("DUSKY18");
        state.last_applied_ms = Some(5_000);
        state.last_heading = Some(10.0);
        let before = state.clone();
        let mut renderer = RecordingRenderer::default();
        let mut store = MemoryStore::default();

        let outcome = apply_history(
            &mut state,
            vec![sample(27.0, -97.0, 1_000), sample(27.001, -97.0, 4_999)],
            ViewMode::Follow,
            &mut renderer,
            &mut store,
        );

        assert_eq!(
            outcome,
            ApplyOutcome::Stale {
                newest_ms: 4_999,
                last_applied_ms: 5_000
            }
        );
        assert!(renderer.calls.is_empty());
        assert_eq!(state, before);
        assert_eq!(store.load("DUSKY18"), None);
    }

    #[test]
    fn equal_timestamp_is_applied() {
        let mut state = EntityState::new("DUSKY18");
        state.last_applied_ms = Some(5_000);
        let mut renderer = RecordingRenderer::default();

        let outcome = apply_history(
            &mut state,
            vec![sample(27.0, -97.0, 5_000)],
            ViewMode::Follow,
            &mut renderer,
            &mut MemoryStore::default(),
        );
        assert!(matches!(outcome, ApplyOutcome::Applied { .. }));
    }

    #[test]
    fn empty_response_keeps_state() {
        let mut state = EntityState::new("DUSKY18");
        let mut renderer = RecordingRenderer::default();
        let outcome = apply_history(
            &mut state,
            Vec::new(),
            ViewMode::Follow,
            &mut renderer,
            &mut MemoryStore::default(),
        );
        assert_eq!(outcome, ApplyOutcome::Empty);
        assert!(renderer.calls.is_empty());
        assert_eq!(state, EntityState::new("DUSKY18"));
    }

    #[test]
    fn jitter_keeps_previous_heading() {
        let mut state = EntityState::new("DUSKY18");
        let mut renderer = RecordingRenderer::default();
        let mut store = MemoryStore::default();

        apply_history(
            &mut state,
            vec![sample(27.0, -97.0, 1_000), sample(27.0, -96.999, 2_000)],
            ViewMode::Follow,
            &mut renderer,
            &mut store,
        );
        let moving = state.last_heading.unwrap();
        assert_abs_diff_eq!(moving, 90.0, epsilon = 1e-6);

        let outcome = apply_history(
            &mut state,
            vec![
                sample(27.0, -96.999, 3_000),
                sample(27.000001, -96.999, 4_000),
            ],
            ViewMode::Follow,
            &mut renderer,
            &mut store,
        );
        let ApplyOutcome::Applied { heading, .. } = outcome else {
            panic!("expected an applied update");
        };
        assert_eq!(heading.source, HeadingSource::LastKnownGood);
        assert_eq!(state.last_heading, Some(moving));
        assert_eq!(store.load("DUSKY18"), Some(moving));
    }

    #[test]
    fn yaw_and_default_are_not_remembered() {
        let mut state = EntityState::new("DUSKY18");
        let mut store = MemoryStore::default();
        let mut still = sample(27.0, -97.0, 1_000);
        still.yaw = Some(1.5708);

        let outcome = apply_history(
            &mut state,
            vec![still],
            ViewMode::Follow,
            &mut RecordingRenderer::default(),
            &mut store,
        );
        let ApplyOutcome::Applied { heading, .. } = outcome else {
            panic!("expected an applied update");
        };
        assert_eq!(heading.source, HeadingSource::Yaw);
        assert_eq!(state.last_heading, None);
        assert_eq!(store.load("DUSKY18"), None);
    }

    #[test]
    fn restores_heading_from_store_once() {
        let mut store = MemoryStore::default();
        store.save("DUSKY18", 225.0).unwrap();
        let mut state = EntityState::new("DUSKY18");

        let outcome = apply_history(
            &mut state,
            vec![sample(27.0, -97.0, 1_000)],
            ViewMode::Fleet,
            &mut RecordingRenderer::default(),
            &mut store,
        );
        let ApplyOutcome::Applied { heading, .. } = outcome else {
            panic!("expected an applied update");
        };
        assert_eq!(heading.source, HeadingSource::LastKnownGood);
        assert_eq!(heading.degrees, 225.0);
        assert!(state.heading_restored);
    }

    #[test]
    fn missing_coordinates_skip_marker_only() {
        let mut state = EntityState::new("DUSKY18");
        let mut renderer = RecordingRenderer::default();
        let mut blind = sample(0.0, 0.0, 2_000);
        blind.position = None;

        let outcome = apply_history(
            &mut state,
            vec![sample(27.0, -97.0, 1_000), blind],
            ViewMode::Follow,
            &mut renderer,
            &mut MemoryStore::default(),
        );

        assert!(matches!(outcome, ApplyOutcome::Applied { newest_ms: 2_000, .. }));
        assert_eq!(
            renderer.calls,
            vec![Call::Path("DUSKY18".into(), vec![ll(27.0, -97.0)])]
        );
        assert_eq!(state.last_applied_ms, Some(2_000));
        assert_eq!(state.marker, None);
    }

    #[test]
    fn fleet_mode_draws_markers_only() {
        let mut state = EntityState::new("DUSKY24");
        let mut renderer = RecordingRenderer::default();

        apply_history(
            &mut state,
            vec![sample(27.0, -97.0, 1_000)],
            ViewMode::Fleet,
            &mut renderer,
            &mut MemoryStore::default(),
        );

        assert!(renderer
            .calls
            .iter()
            .all(|c| !matches!(c, Call::Path(..) | Call::Pan(_))));
        assert!(renderer
            .calls
            .contains(&Call::Label("DUSKY24".into(), "Drone DUSKY18\n27.0000, -97.0000".into())));
    }
}
