/// Lifecycle state machine for pipelines and adapters
///
/// # States
///
/// - `INITIALIZING` - Being constructed
/// - `READY` - Idle, components may be registered
/// - `STARTING` - Connecting adapters and opening subscriptions
/// - `RUNNING` - Receiving data from source adapters
/// - `STOPPING` - Closing subscriptions
/// - `ERROR` - A lifecycle operation failed
///
/// ```text
/// INITIALIZING -> READY -> STARTING -> RUNNING -> STOPPING -> READY
///        any state -> ERROR -> READY (reset)
/// ```
///
/// # Example
///
/// ```
/// use plantlink::state_machine::{Lifecycle, LifecycleStatus};
///
/// let mut lifecycle = Lifecycle::new();
/// lifecycle.transition(LifecycleStatus::Ready).unwrap();
/// lifecycle.transition(LifecycleStatus::Starting).unwrap();
/// assert!(lifecycle.transition(LifecycleStatus::Stopping).is_err());
/// ```
pub mod states;
pub mod transitions;

pub use states::*;
pub use transitions::*;
