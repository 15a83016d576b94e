use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::StageOptions;
use crate::error::{IntegrationError, PlantlinkResult};
use crate::packet::DataPacket;
use crate::state_machine::LifecycleStatus;

/// Identifier returned by an adapter for an open subscription
pub type SubscriptionId = String;

/// Callback invoked by a source adapter for every delivered packet
pub type DataCallback = Arc<dyn Fn(DataPacket) -> BoxFuture<'static, ()> + Send + Sync>;

/// Connection state of an adapter's link to its external system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Connecting,
    Error,
}

/// Connection to an external system (message broker, industrial protocol
/// server, HTTP endpoint)
///
/// Adapters are constructed and owned outside the engine. A pipeline only
/// registers them, starts them if needed when it starts, and talks to them
/// through this trait.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Registry id; stages reference the adapter through this id
    fn id(&self) -> &str;

    fn status(&self) -> LifecycleStatus;

    fn connection_status(&self) -> ConnectionStatus;

    async fn start(&self) -> PlantlinkResult<()>;

    async fn stop(&self) -> PlantlinkResult<()>;

    /// Deliver a packet to the external system
    async fn send_data(
        &self,
        packet: DataPacket,
        options: Option<&StageOptions>,
    ) -> PlantlinkResult<()>;

    /// Open a subscription; `callback` is invoked for every received packet
    async fn receive_data(
        &self,
        callback: DataCallback,
        options: Option<StageOptions>,
    ) -> PlantlinkResult<SubscriptionId>;

    async fn unsubscribe(&self, subscription_id: &str) -> PlantlinkResult<()>;

    async fn test_connection(&self) -> bool;

    /// Round-trip latency of the last probe, if known
    async fn latency(&self) -> Option<Duration>;

    fn last_error(&self) -> Option<IntegrationError>;

    async fn reconnect(&self) -> PlantlinkResult<()>;
}
