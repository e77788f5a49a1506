//! Fleet lifecycle phases
//!
//! ```text
//! PRELOAD ──▶ LOADING ──▶ LOADED ──▶ POSTLOAD
//! ```
//!
//! Transitions move exactly one step forward. POSTLOAD is terminal and
//! means every module is active.

use crate::error::FleetError;
use crate::metrics;

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::broadcast;
use tracing::info;

/// Fleet readiness, ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(u8)]
pub enum LifecyclePhase {
    #[serde(rename = "PRELOAD")]
    PreLoad = 0,
    #[serde(rename = "LOADING")]
    Loading = 1,
    #[serde(rename = "LOADED")]
    Loaded = 2,
    #[serde(rename = "POSTLOAD")]
    PostLoad = 3,
}

impl LifecyclePhase {
    /// Every phase, in order
    pub const ALL: [Self; 4] = [Self::PreLoad, Self::Loading, Self::Loaded, Self::PostLoad];

    /// The only phase this one may move to
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::PreLoad => Some(Self::Loading),
            Self::Loading => Some(Self::Loaded),
            Self::Loaded => Some(Self::PostLoad),
            Self::PostLoad => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreLoad => "PRELOAD",
            Self::Loading => "LOADING",
            Self::Loaded => "LOADED",
            Self::PostLoad => "POSTLOAD",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::PreLoad,
            1 => Self::Loading,
            2 => Self::Loaded,
            _ => Self::PostLoad,
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current phase plus a feed of transitions
#[derive(Debug)]
pub struct PhaseTracker {
    current: AtomicU8,
    transitions: broadcast::Sender<LifecyclePhase>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        // Room for every transition, so a subscriber never lags
        let (transitions, _) = broadcast::channel(LifecyclePhase::ALL.len());
        Self {
            current: AtomicU8::new(LifecyclePhase::PreLoad as u8),
            transitions,
        }
    }

    pub fn current(&self) -> LifecyclePhase {
        LifecyclePhase::from_u8(self.current.load(Ordering::Acquire))
    }

    /// Move to `to`, which must be the next phase
    pub fn advance(&self, to: LifecyclePhase) -> Result<(), FleetError> {
        let from = self.current();
        if from.next() != Some(to) {
            return Err(FleetError::PhaseTransition { from, to });
        }

        self.current
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|raw| FleetError::PhaseTransition {
                from: LifecyclePhase::from_u8(raw),
                to,
            })?;

        metrics::set_phase(to);
        info!(from = %from, to = %to, "Lifecycle phase changed");
        // No subscribers is fine
        let _ = self.transitions.send(to);
        Ok(())
    }

    /// Receive every transition made after this call
    pub fn subscribe(&self) -> broadcast::Receiver<LifecyclePhase> {
        self.transitions.subscribe()
    }

    /// Resolve once the fleet has reached at least `phase`
    pub async fn wait_for(&self, phase: LifecyclePhase) {
        let mut rx = self.subscribe();
        if self.current() >= phase {
            return;
        }
        loop {
            match rx.recv().await {
                Ok(reached) if reached >= phase => return,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                    if self.current() >= phase {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}
