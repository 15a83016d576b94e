/// Lifecycle states shared by pipelines and adapters
use serde::{Deserialize, Serialize};

/// Lifecycle status of a pipeline or adapter
///
/// Serialized and displayed in upper case (`"RUNNING"`), which is also the
/// form published in status change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleStatus {
    /// Being constructed; no operations accepted yet
    Initializing,

    /// Constructed and idle; components may be registered
    Ready,

    /// Adapters are being connected and subscriptions opened
    Starting,

    /// Subscriptions are live and data flows in
    Running,

    /// Subscriptions are being closed
    Stopping,

    /// A lifecycle operation failed; only `reset` is accepted
    Error,
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Initializing => "INITIALIZING",
            LifecycleStatus::Ready => "READY",
            LifecycleStatus::Starting => "STARTING",
            LifecycleStatus::Running => "RUNNING",
            LifecycleStatus::Stopping => "STOPPING",
            LifecycleStatus::Error => "ERROR",
        }
    }

    /// Check if the state is between a start request and a completed stop
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            LifecycleStatus::Starting | LifecycleStatus::Running | LifecycleStatus::Stopping
        )
    }

    /// Whether the registry may be modified in this state
    pub fn accepts_registration(&self) -> bool {
        !self.is_active()
    }
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
