use std::sync::{Arc, Weak};

use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio::{
    sync::{oneshot, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::config::LifecycleConfig;
use crate::registry::{ChannelId, Removal, SessionEnded, SessionState};
use crate::signal::{SessionPhase, ShutdownReason, ViewerSignal};

/// Owns the live-viewer registry and decides when the sharing session is over. The
/// outcome is published as a [`ShutdownReason`]; exiting is left to the caller.
#[derive(Clone)]
pub struct SessionEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: LifecycleConfig,
    state: Mutex<SessionState>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<Option<ShutdownReason>>,
}

pub struct ViewerRegistration {
    pub channel_id: ChannelId,
    pub active_viewers: usize,
    // Fires when a sweep evicts this channel.
    pub eviction: oneshot::Receiver<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SessionSnapshot {
    #[serde(flatten)]
    pub phase: SessionPhase,
    pub viewers: usize,
    pub viewers_admitted: u64,
}

impl SessionEngine {
    pub fn new(config: LifecycleConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(EngineInner {
                config,
                state: Mutex::new(SessionState::default()),
                sweeper: Mutex::new(None),
                shutdown_tx,
            }),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.inner.config
    }

    /// Starts the periodic sweep. Calling it again while a sweep task exists, or
    /// after the session ended, does nothing.
    pub fn spawn_sweeper(&self) {
        let mut sweeper = self.inner.sweeper.lock();
        if sweeper.is_some() || self.phase().is_terminal() {
            return;
        }

        let engine: Weak<EngineInner> = Arc::downgrade(&self.inner);
        let mut interval = tokio::time::interval(self.inner.config.sweep_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        *sweeper = Some(tokio::spawn(async move {
            loop {
                interval.tick().await;
                let Some(inner) = engine.upgrade() else {
                    break;
                };
                let engine = SessionEngine { inner };
                engine.sweep_stale_channels();
                if engine.phase().is_terminal() {
                    break;
                }
            }
            debug!("sweep task finished");
        }));
    }

    pub fn register_channel(
        &self,
        channel_id: ChannelId,
    ) -> Result<ViewerRegistration, SessionEnded> {
        let (evict_tx, evict_rx) = oneshot::channel();
        let active_viewers = self
            .inner
            .state
            .lock()
            .admit(channel_id, Instant::now(), Some(evict_tx))?;

        counter!("qr_share_viewers_registered_total", 1);
        gauge!("qr_share_viewers_active", active_viewers as f64);
        info!(channel_id = %channel_id, active_viewers, "viewer connected");

        Ok(ViewerRegistration {
            channel_id,
            active_viewers,
            eviction: evict_rx,
        })
    }

    pub fn record_heartbeat(&self, channel_id: ChannelId) -> bool {
        let touched = self.inner.state.lock().touch(&channel_id, Instant::now());
        if touched {
            counter!("qr_share_heartbeats_total", 1);
        } else {
            debug!(channel_id = %channel_id, "heartbeat from unknown channel ignored");
        }
        touched
    }

    /// A viewer said it is leaving. Ends the whole session no matter how many other
    /// viewers remain. Returns `true` if this call ended the session.
    pub fn record_explicit_close(&self, channel_id: ChannelId) -> bool {
        let reason = ShutdownReason::ExplicitClose;
        {
            let mut state = self.inner.state.lock();
            if state.phase().is_terminal() {
                return false;
            }
            if state.remove(&channel_id) == Removal::Unknown {
                debug!(channel_id = %channel_id, "close from unknown channel ignored");
                return false;
            }
            state.terminate(reason);
        }

        info!(channel_id = %channel_id, "viewer requested close");
        self.finish(reason);
        true
    }

    /// The channel's transport went away. Ends the session if it was the last
    /// viewer. Returns `true` if this call ended the session.
    pub fn record_channel_closed(&self, channel_id: ChannelId) -> bool {
        let (removal, remaining) = {
            let mut state = self.inner.state.lock();
            if state.phase().is_terminal() {
                return false;
            }
            let removal = state.remove(&channel_id);
            if removal == Removal::Drained {
                state.terminate(ShutdownReason::LastViewerDisconnected);
            }
            (removal, state.len())
        };

        match removal {
            Removal::Unknown => false,
            Removal::StillActive => {
                gauge!("qr_share_viewers_active", remaining as f64);
                info!(
                    channel_id = %channel_id,
                    active_viewers = remaining,
                    "viewer disconnected"
                );
                false
            }
            Removal::Drained => {
                gauge!("qr_share_viewers_active", 0.0);
                info!(channel_id = %channel_id, "last viewer disconnected");
                self.finish(ShutdownReason::LastViewerDisconnected);
                true
            }
        }
    }

    /// Evicts every channel whose last heartbeat is at least `stale_after` old and
    /// asks its transport to close. Ends the session if that empties the registry.
    /// Returns the number of evicted channels.
    pub fn sweep_stale_channels(&self) -> usize {
        let (evicted, removal, remaining) = {
            let mut state = self.inner.state.lock();
            let (evicted, removal) =
                state.evict_stale(Instant::now(), self.inner.config.stale_after());
            if removal == Removal::Drained {
                state.terminate(ShutdownReason::LastViewerTimedOut);
            }
            (evicted, removal, state.len())
        };

        let count = evicted.len();
        for (channel_id, entry) in evicted {
            info!(channel_id = %channel_id, "viewer heartbeat timed out; closing connection");
            entry.request_close();
        }
        if count > 0 {
            counter!("qr_share_viewers_evicted_total", count as u64);
            gauge!("qr_share_viewers_active", remaining as f64);
        }

        if removal == Removal::Drained {
            info!("no viewers left after sweep");
            self.finish(ShutdownReason::LastViewerTimedOut);
        }
        count
    }

    pub fn handle_signal(&self, channel_id: ChannelId, signal: ViewerSignal) {
        match signal {
            ViewerSignal::Heartbeat => {
                self.record_heartbeat(channel_id);
            }
            ViewerSignal::Close => {
                self.record_explicit_close(channel_id);
            }
        }
    }

    pub fn handle_payload(&self, channel_id: ChannelId, payload: &str) -> Option<ViewerSignal> {
        let signal = ViewerSignal::parse(payload);
        match signal {
            Some(signal) => self.handle_signal(channel_id, signal),
            None => debug!(channel_id = %channel_id, "ignoring unrecognised payload"),
        }
        signal
    }

    /// Ends the session. Only the first call has any effect: it cancels the sweep
    /// task and publishes `reason` to every subscriber. Returns whether this call
    /// was the one that ended the session.
    pub fn shutdown(&self, reason: ShutdownReason) -> bool {
        if !self.inner.state.lock().terminate(reason) {
            return false;
        }
        self.finish(reason);
        true
    }

    fn finish(&self, reason: ShutdownReason) {
        if let Some(sweeper) = self.inner.sweeper.lock().take() {
            sweeper.abort();
        }

        counter!(
            "qr_share_sessions_ended_total",
            1,
            "reason" => reason.metric_label()
        );
        info!(reason = ?reason, "sharing session ended");
        let previous = self.inner.shutdown_tx.send_replace(Some(reason));
        debug_assert!(previous.is_none(), "shutdown published twice");
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.inner.shutdown_tx.subscribe(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.state.lock().phase()
    }

    pub fn viewer_count(&self) -> usize {
        self.inner.state.lock().len()
    }

    pub fn is_registered(&self, channel_id: ChannelId) -> bool {
        self.inner.state.lock().contains(&channel_id)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state.lock();
        SessionSnapshot {
            phase: state.phase(),
            viewers: state.len(),
            viewers_admitted: state.admitted_total(),
        }
    }

    #[cfg(test)]
    fn sweeper_running(&self) -> bool {
        self.inner
            .sweeper
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<Option<ShutdownReason>>,
}

impl ShutdownSignal {
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.rx.borrow()
    }

    pub async fn wait(&mut self) -> ShutdownReason {
        let outcome = self.rx.wait_for(Option::is_some).await.map(|reason| *reason);
        match outcome {
            Ok(reason) => reason.unwrap_or(ShutdownReason::Interrupted),
            // Engine dropped without ending the session; nothing will ever fire.
            Err(_) => std::future::pending().await,
        }
    }
}
