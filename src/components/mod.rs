//! Collaborator contracts consumed by the engine
//!
//! Adapters, transformers, validators and custom stage handlers are built
//! outside the engine and registered into a pipeline's [`ComponentRegistry`].
//! Stages refer to them by `componentId`.

pub mod adapter;
pub mod handler;
pub mod mock;
pub mod registry;
pub mod transformer;
pub mod validator;

pub use adapter::{Adapter, ConnectionStatus, DataCallback, SubscriptionId};
pub use handler::{FnHandler, StageHandler};
pub use mock::MockAdapter;
pub use registry::ComponentRegistry;
pub use transformer::{TransformOutput, Transformer};
pub use validator::{ValidationIssue, ValidationResult, Validator};
