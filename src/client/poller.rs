use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::apply::{apply_history, ApplyOutcome, ViewMode};
use super::error::FetchError;
use super::render::{Bounds, Renderer};
use super::source::HistorySource;
use super::store::HeadingStore;
use crate::tracker::{EntityState, LatLng, PositionSample};

/// Fleet view padding on each side, as a share of the marker spread.
const FLEET_BOUNDS_PADDING: f64 = 0.2;

#[derive(Debug)]
pub struct Completion {
    pub call_sign: String,
    pub request: u64,
    pub result: Result<Vec<PositionSample>, FetchError>,
}

#[derive(Debug)]
struct InFlight {
    request: u64,
    cancel_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

pub struct PollingClient<S, R, H> {
    source: Arc<S>,
    renderer: R,
    store: H,
    mode: ViewMode,
    interval: Duration,
    entities: BTreeMap<String, EntityState>,
    in_flight: HashMap<String, InFlight>,
    next_request: u64,
    done_tx: mpsc::UnboundedSender<Completion>,
    done_rx: mpsc::UnboundedReceiver<Completion>,
}

impl<S, R, H> PollingClient<S, R, H>
where
    S: HistorySource,
    R: Renderer,
    H: HeadingStore,
{
    pub fn new<I>(
        source: S,
        renderer: R,
        store: H,
        mode: ViewMode,
        interval: Duration,
        call_signs: I,
    ) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let entities = call_signs
            .into_iter()
            .map(|cs| {
                let cs = cs.into();
                (cs.clone(), EntityState::new(cs))
            })
            .collect();
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        Self {
            source: Arc::new(source),
            renderer,
            store,
            mode,
            interval,
            entities,
            in_flight: HashMap::new(),
            next_request: 0,
            done_tx,
            done_rx,
        }
    }

    pub fn entity(&self, call_sign: &str) -> Option<&EntityState> {
        self.entities.get(call_sign)
    }

    pub fn set_view(&mut self, center: LatLng, zoom: u8) {
        self.renderer.set_view(center, zoom);
        self.renderer.finish_frame();
    }

    /// Starts a fetch for every tracked entity.
    pub fn tick(&mut self) {
        let call_signs: Vec<String> = self.entities.keys().cloned().collect();
        for call_sign in call_signs {
            self.issue(&call_sign);
        }
    }

    /// Starts a fetch for `call_sign`, superseding any request still in flight.
    /// Returns the new request id, or `None` for an unknown entity.
    pub fn issue(&mut self, call_sign: &str) -> Option<u64> {
        let state = self.entities.get_mut(call_sign)?;

        if let Some(previous) = self.in_flight.remove(call_sign) {
            log::debug!(
                "{}: canceling request {} in favor of a new one",
                call_sign,
                previous.request
            );
            let _ = previous.cancel_tx.send(());
        }

        self.next_request += 1;
        let request = self.next_request;
        state.pending_request = Some(request);

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let source = Arc::clone(&self.source);
        let done_tx = self.done_tx.clone();
        let cs = call_sign.to_string();

        let join = tokio::spawn(async move {
            // Cancellation wins over a reply that is ready on the same poll.
            tokio::select! {
                biased;
                _ = cancel_rx => {
                    log::debug!("{}: request {} canceled", cs, request);
                }
                result = source.fetch(&cs) => {
                    let _ = done_tx.send(Completion {
                        call_sign: cs.clone(),
                        request,
                        result,
                    });
                }
            }
        });

        self.in_flight.insert(
            call_sign.to_string(),
            InFlight {
                request,
                cancel_tx,
                join,
            },
        );
        Some(request)
    }

    #[cfg(test)]
    pub async fn next_completion(&mut self) -> Option<Completion> {
        self.done_rx.recv().await
    }

    /// Applies a finished request. Responses from superseded requests, failures
    /// and stale histories leave the rendered state untouched.
    pub fn handle_completion(&mut self, completion: Completion) -> Option<ApplyOutcome> {
        let Completion {
            call_sign,
            request,
            result,
        } = completion;

        let state = self.entities.get_mut(&call_sign)?;
        if !state.accepts(request) {
            log::debug!("{}: ignoring superseded request {}", call_sign, request);
            return None;
        }
        state.pending_request = None;
        if self
            .in_flight
            .get(&call_sign)
            .is_some_and(|f| f.request == request)
        {
            self.in_flight.remove(&call_sign);
        }

        let history = match result {
            Ok(history) => history,
            Err(e) => {
                log::warn!("{}: fetch failed: {}", call_sign, e);
                return None;
            }
        };

        let outcome = apply_history(
            state,
            history,
            self.mode,
            &mut self.renderer,
            &mut self.store,
        );

        match &outcome {
            ApplyOutcome::Empty => {
                log::debug!("{}: empty history, keeping previous render", call_sign);
            }
            ApplyOutcome::Stale {
                newest_ms,
                last_applied_ms,
            } => {
                log::debug!(
                    "{}: dropping stale history (newest {} < applied {})",
                    call_sign,
                    newest_ms,
                    last_applied_ms
                );
            }
            ApplyOutcome::Applied { newest_ms, heading } => {
                log::info!(
                    "{}: applied history up to {} (heading {:.1}° from {:?})",
                    call_sign,
                    newest_ms,
                    heading.degrees,
                    heading.source
                );
                if self.mode == ViewMode::Fleet {
                    self.fit_fleet();
                }
                self.renderer.finish_frame();
            }
        }

        Some(outcome)
    }

    fn fit_fleet(&mut self) {
        let markers = self.entities.values().filter_map(|s| s.marker);
        if let Some(bounds) = Bounds::from_points(markers) {
            self.renderer.fit_bounds(bounds.pad(FLEET_BOUNDS_PADDING));
        }
    }

    /// Polls until `shutdown` fires. The first tick is immediate.
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> Self {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!(
            "Polling {} entit{} every {:?} ({:?} view)",
            self.entities.len(),
            if self.entities.len() == 1 { "y" } else { "ies" },
            self.interval,
            self.mode
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(),
                Some(completion) = self.done_rx.recv() => {
                    self.handle_completion(completion);
                }
                _ = &mut shutdown => break,
            }
        }

        self.cancel_all().await;
        self
    }

    /// Cancels every outstanding request and waits for its task to finish.
    pub async fn cancel_all(&mut self) {
        for (call_sign, in_flight) in self.in_flight.drain() {
            if let Some(state) = self.entities.get_mut(&call_sign) {
                state.pending_request = None;
            }
            let _ = in_flight.cancel_tx.send(());
            let _ = in_flight.join.await;
        }
    }
}
