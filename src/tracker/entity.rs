use super::sample::LatLng;

/// Render state for one tracked call sign. Only the poll loop mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    pub call_sign: String,
    /// Newest sample timestamp that reached the renderer.
    pub last_applied_ms: Option<i64>,
    /// Most recent heading estimated from motion, in degrees.
    pub last_heading: Option<f64>,
    /// Whether the heading store has been consulted for this entity yet.
    pub heading_restored: bool,
    /// Last position handed to the renderer.
    pub marker: Option<LatLng>,
    /// Id of the only request whose response may still be applied.
    pub pending_request: Option<u64>,
}

impl EntityState {
    pub fn new(call_sign: impl Into<String>) -> Self {
        Self {
            call_sign: call_sign.into(),
            last_applied_ms: None,
            last_heading: None,
            heading_restored: false,
            marker: None,
            pending_request: None,
        }
    }

    /// A response is stale when its newest sample predates what was rendered.
    pub fn is_stale(&self, newest_ms: i64) -> bool {
        matches!(self.last_applied_ms, Some(last) if newest_ms < last)
    }

    pub fn accepts(&self, request: u64) -> bool {
        self.pending_request == Some(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staleness_is_strict() {
        let mut state = EntityState::new("DUSKY21");
        assert!(!state.is_stale(i64::MIN));

        state.last_applied_ms = Some(2_000);
        assert!(state.is_stale(1_999));
        assert!(!state.is_stale(2_000));
        assert!(!state.is_stale(2_001));
    }

    #[test]
    fn accepts_only_the_pending_request() {
        let mut state = EntityState::new("DUSKY21");
        assert!(!state.accepts(1));
        state.pending_request = Some(2);
        assert!(!state.accepts(1));
        assert!(state.accepts(2));
    }
}
