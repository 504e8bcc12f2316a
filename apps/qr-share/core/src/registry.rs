use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

use crate::signal::{SessionPhase, ShutdownReason};

pub type ChannelId = Uuid;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("session has ended ({0:?}); no new viewers are admitted")]
pub struct SessionEnded(pub ShutdownReason);

pub(crate) struct ViewerEntry {
    last_heartbeat: Instant,
    eviction: Option<oneshot::Sender<()>>,
}

impl ViewerEntry {
    pub(crate) fn request_close(mut self) {
        if let Some(eviction) = self.eviction.take() {
            let _ = eviction.send(());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Removal {
    Unknown,
    StillActive,
    // Empty after having held viewers.
    Drained,
}

/// Live-viewer registry plus the session's terminal flag.
///
/// Every method runs under the engine's lock; nothing here blocks or awaits.
#[derive(Default)]
pub(crate) struct SessionState {
    viewers: HashMap<ChannelId, ViewerEntry>,
    admitted_total: u64,
    terminal: Option<ShutdownReason>,
}

impl SessionState {
    pub(crate) fn phase(&self) -> SessionPhase {
        match self.terminal {
            Some(reason) => SessionPhase::Terminal(reason),
            None if self.viewers.is_empty() => SessionPhase::Idle,
            None => SessionPhase::Active,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.viewers.len()
    }

    pub(crate) fn admitted_total(&self) -> u64 {
        self.admitted_total
    }

    pub(crate) fn contains(&self, id: &ChannelId) -> bool {
        self.viewers.contains_key(id)
    }

    pub(crate) fn admit(
        &mut self,
        id: ChannelId,
        now: Instant,
        eviction: Option<oneshot::Sender<()>>,
    ) -> Result<usize, SessionEnded> {
        if let Some(reason) = self.terminal {
            return Err(SessionEnded(reason));
        }
        let entry = ViewerEntry {
            last_heartbeat: now,
            eviction,
        };
        if self.viewers.insert(id, entry).is_none() {
            self.admitted_total += 1;
        }
        Ok(self.viewers.len())
    }

    pub(crate) fn touch(&mut self, id: &ChannelId, now: Instant) -> bool {
        if self.terminal.is_some() {
            return false;
        }
        match self.viewers.get_mut(id) {
            Some(entry) => {
                entry.last_heartbeat = now;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove(&mut self, id: &ChannelId) -> Removal {
        if self.viewers.remove(id).is_none() {
            return Removal::Unknown;
        }
        self.drain_state()
    }

    /// Removes every channel silent for at least `stale_after` and hands them back so
    /// the caller can ask their transports to close.
    pub(crate) fn evict_stale(
        &mut self,
        now: Instant,
        stale_after: Duration,
    ) -> (Vec<(ChannelId, ViewerEntry)>, Removal) {
        if self.terminal.is_some() {
            return (Vec::new(), Removal::Unknown);
        }
        let stale: Vec<ChannelId> = self
            .viewers
            .iter()
            .filter(|(_, entry)| {
                now.saturating_duration_since(entry.last_heartbeat) >= stale_after
            })
            .map(|(id, _)| *id)
            .collect();
        if stale.is_empty() {
            return (Vec::new(), Removal::Unknown);
        }

        let evicted = stale
            .into_iter()
            .filter_map(|id| self.viewers.remove(&id).map(|entry| (id, entry)))
            .collect();
        (evicted, self.drain_state())
    }

    fn drain_state(&self) -> Removal {
        if self.viewers.is_empty() && self.admitted_total > 0 {
            Removal::Drained
        } else {
            Removal::StillActive
        }
    }

    /// Marks the session terminal. Only the first call returns `true`.
    pub(crate) fn terminate(&mut self, reason: ShutdownReason) -> bool {
        if self.terminal.is_some() {
            return false;
        }
        self.terminal = Some(reason);
        true
    }
}
