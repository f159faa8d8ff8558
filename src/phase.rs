//! Migration phase registry.
//!
//! A phase is four independent capabilities: reading and writing the
//! document store ("mongo") and the relational store ("mysql"). The registry
//! resolves its source on every query so an operator can move the migration
//! forward without restarting callers.
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Phase {
    pub mongo_read: bool,
    pub mongo_write: bool,
    pub mysql_read: bool,
    pub mysql_write: bool,
}

impl Phase {
    /// Document store only; the state before the migration starts.
    pub const LEGACY: Phase = Phase {
        mongo_read: true,
        mongo_write: true,
        mysql_read: false,
        mysql_write: false,
    };
    pub const DUAL_WRITE: Phase = Phase {
        mongo_read: true,
        mongo_write: true,
        mysql_read: false,
        mysql_write: true,
    };
    pub const DUAL_WRITE_RELATIONAL_READ: Phase = Phase {
        mongo_read: false,
        mongo_write: true,
        mysql_read: true,
        mysql_write: true,
    };
    /// Both stores readable and writable.
    pub const OVERLAP: Phase = Phase {
        mongo_read: true,
        mongo_write: true,
        mysql_read: true,
        mysql_write: true,
    };
    pub const RELATIONAL: Phase = Phase {
        mongo_read: false,
        mongo_write: false,
        mysql_read: true,
        mysql_write: true,
    };

    pub fn is_all_disabled(&self) -> bool {
        !(self.mongo_read || self.mongo_write || self.mysql_read || self.mysql_write)
    }

    pub fn reads_overlap(&self) -> bool {
        self.mongo_read && self.mysql_read
    }
}

impl Default for Phase {
    fn default() -> Self {
        Phase::LEGACY
    }
}

/// Where the current phase comes from. `None` means unconfigured.
pub trait PhaseSource: Send + Sync {
    fn current(&self) -> Option<Phase>;
}

/// A phase that never changes; used by tests and one-shot tools.
#[derive(Debug, Clone, Copy)]
pub struct FixedPhase(pub Phase);

impl PhaseSource for FixedPhase {
    fn current(&self) -> Option<Phase> {
        Some(self.0)
    }
}

/// In-process switch an operator (or admin endpoint) can flip at runtime.
#[derive(Debug, Clone, Default)]
pub struct SharedPhase {
    inner: Arc<RwLock<Option<Phase>>>,
}

impl SharedPhase {
    pub fn new(phase: Option<Phase>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(phase)),
        }
    }

    pub fn set(&self, phase: Option<Phase>) {
        match self.inner.write() {
            Ok(mut guard) => *guard = phase,
            Err(poisoned) => *poisoned.into_inner() = phase,
        }
    }
}

impl PhaseSource for SharedPhase {
    fn current(&self) -> Option<Phase> {
        match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// YAML file re-read on every query. A missing or unparsable file counts
/// as unconfigured.
#[derive(Debug, Clone)]
pub struct PhaseFile {
    path: PathBuf,
}

impl PhaseFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PhaseSource for PhaseFile {
    fn current(&self) -> Option<Phase> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(err) => {
                debug!(?err, path=%self.path.display(), "phase file unreadable");
                return None;
            }
        };
        match serde_yaml::from_str::<Phase>(&content) {
            Ok(phase) => Some(phase),
            Err(err) => {
                warn!(?err, path=%self.path.display(), "phase file is not valid YAML");
                None
            }
        }
    }
}

#[derive(Clone)]
pub struct PhaseRegistry {
    source: Arc<dyn PhaseSource>,
}

impl std::fmt::Debug for PhaseRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseRegistry")
            .field("current", &self.snapshot())
            .finish()
    }
}

impl PhaseRegistry {
    pub fn new(source: Arc<dyn PhaseSource>) -> Self {
        Self { source }
    }

    pub fn fixed(phase: Phase) -> Self {
        Self::new(Arc::new(FixedPhase(phase)))
    }

    /// Resolve the phase now. Unconfigured or all-disabled phases fall back
    /// to [`Phase::LEGACY`].
    pub fn snapshot(&self) -> Phase {
        match self.source.current() {
            Some(phase) if phase.is_all_disabled() => {
                warn!("configured phase disables every backend; using legacy phase");
                Phase::default()
            }
            Some(phase) => phase,
            None => {
                debug!("no phase configured; using legacy phase");
                Phase::default()
            }
        }
    }

    pub fn is_mongo_read_enabled(&self) -> bool {
        self.snapshot().mongo_read
    }

    pub fn is_mongo_write_enabled(&self) -> bool {
        self.snapshot().mongo_write
    }

    pub fn is_mysql_read_enabled(&self) -> bool {
        self.snapshot().mysql_read
    }

    pub fn is_mysql_write_enabled(&self) -> bool {
        self.snapshot().mysql_write
    }
}
