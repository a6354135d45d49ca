//! The burst controller: the single-flight start/stop/status surface.
//!
//! State lives in a `watch` channel so every snapshot is taken under one
//! lock and observers can await transitions. The cancellation slot is a
//! separate mutex that `start`, `stop` and the end-of-burst reset all take
//! first, which keeps "slot occupied" and "active" in step.

use crate::dispatch::{BurstOutcome, BurstReport, CancellationSignal, DispatchEngine, NotificationPayload};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// A snapshot of the controller's burst state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BurstState {
    pub active: bool,
    /// An operator asked to stop but the engine has not exited yet.
    pub stop_requested: bool,
    pub sent_count: u32,
    pub max_count: u32,
    pub interval_seconds: f64,
    /// How the most recent burst ended.
    pub last_report: Option<BurstReport>,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("a notification burst is already active")]
pub struct AlreadyActiveError;

struct Shared {
    state: watch::Sender<BurstState>,
    signal: Mutex<Option<CancellationSignal>>,
}

impl Shared {
    fn lock_signal(&self) -> MutexGuard<'_, Option<CancellationSignal>> {
        self.signal.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resets the controller to idle when the dispatch task ends, however it ends.
struct ActiveBurst {
    shared: Arc<Shared>,
    engine: Arc<DispatchEngine>,
    report: Option<BurstReport>,
}

impl Drop for ActiveBurst {
    fn drop(&mut self) {
        let mut slot = self.shared.lock_signal();
        *slot = None;

        // Only the dispatch task advances `sent_count`, and it has finished.
        let report = self.report.take().unwrap_or_else(|| BurstReport {
            outcome: BurstOutcome::Faulted,
            sent_count: self.shared.state.borrow().sent_count,
        });
        self.engine.metrics().burst_finished(report.outcome);
        self.shared.state.send_modify(|state| {
            state.active = false;
            state.stop_requested = false;
            state.sent_count = 0;
            state.last_report = Some(report);
        });
        drop(slot);

        if report.outcome == BurstOutcome::Faulted {
            error!("Notification burst terminated unexpectedly; controller reset to idle.");
        }
    }
}

/// Serializes burst lifecycles so at most one burst runs at a time.
#[derive(Clone)]
pub struct BurstController {
    engine: Arc<DispatchEngine>,
    shared: Arc<Shared>,
}

impl BurstController {
    pub fn new(engine: Arc<DispatchEngine>) -> Self {
        let settings = engine.settings();
        let (state, _) = watch::channel(BurstState {
            active: false,
            stop_requested: false,
            sent_count: 0,
            max_count: settings.max_count,
            interval_seconds: settings.notification_interval.as_secs_f64(),
            last_report: None,
        });
        Self {
            engine,
            shared: Arc::new(Shared {
                state,
                signal: Mutex::new(None),
            }),
        }
    }

    /// Starts a burst in the background.
    ///
    /// Must be called from within a tokio runtime. A second call while a
    /// burst is running is rejected and does not touch the running burst.
    pub fn start(&self, payload: NotificationPayload) -> Result<(), AlreadyActiveError> {
        let signal = CancellationSignal::new();
        {
            let mut slot = self.shared.lock_signal();
            let claimed = self.shared.state.send_if_modified(|state| {
                if state.active {
                    return false;
                }
                state.active = true;
                state.stop_requested = false;
                state.sent_count = 0;
                true
            });
            if !claimed {
                warn!("Notifications are already active, ignoring start request.");
                return Err(AlreadyActiveError);
            }
            *slot = Some(signal.clone());
        }

        self.engine.metrics().burst_started();
        info!(
            target_channel = %payload.target_channel_id,
            max = self.engine.settings().max_count,
            "Starting notification burst."
        );

        let mut burst = ActiveBurst {
            shared: self.shared.clone(),
            engine: self.engine.clone(),
            report: None,
        };
        tokio::spawn(async move {
            let shared = burst.shared.clone();
            let engine = burst.engine.clone();
            let report = engine
                .run(&payload, &signal, move |sent| {
                    shared.state.send_modify(|state| state.sent_count = sent);
                })
                .await;
            burst.report = Some(report);
        });
        Ok(())
    }

    /// Requests the running burst to stop. Returns `false` if none is running.
    pub fn stop(&self) -> bool {
        let slot = self.shared.lock_signal();
        match slot.as_ref() {
            Some(signal) => {
                signal.cancel();
                self.shared
                    .state
                    .send_modify(|state| state.stop_requested = true);
                info!("Stop signal received for notification burst.");
                true
            }
            None => {
                info!("No notification burst is active, nothing to stop.");
                false
            }
        }
    }

    /// Returns a consistent snapshot of the burst state.
    pub fn status(&self) -> BurstState {
        self.shared.state.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.shared.state.borrow().active
    }

    /// A receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<BurstState> {
        self.shared.state.subscribe()
    }

    /// Waits until no burst is running and returns the idle snapshot.
    pub async fn wait_idle(&self) -> BurstState {
        let mut rx = self.subscribe();
        // The sender is owned by `self.shared`, so it outlives this receiver.
        // Bound to a local so the `Ref` guard is released before `rx`.
        let idle = match rx.wait_for(|state| !state.active).await {
            Ok(state) => state.clone(),
            Err(_) => self.status(),
        };
        idle
    }
}
