use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::adapter::{Adapter, ConnectionStatus, DataCallback, SubscriptionId};
use crate::config::StageOptions;
use crate::error::{IntegrationError, IntegrationErrorKind, PlantlinkError, PlantlinkResult};
use crate::packet::DataPacket;
use crate::state_machine::LifecycleStatus;

struct MockSubscription {
    callback: DataCallback,
    options: Option<StageOptions>,
}

/// In-memory adapter for development and testing
///
/// Records every packet sent to it and lets the caller push packets to its
/// subscribers. Failures can be switched on to exercise error paths:
/// - `fail_start`: `start()` fails and the adapter reports an error state
/// - `fail_send`: `send_data()` fails
/// - `fail_unsubscribe`: `unsubscribe()` fails
pub struct MockAdapter {
    id: String,
    status: Mutex<LifecycleStatus>,
    connection: Mutex<ConnectionStatus>,
    sent: Mutex<Vec<DataPacket>>,
    subscriptions: Mutex<HashMap<SubscriptionId, MockSubscription>>,
    next_subscription: AtomicUsize,
    start_calls: AtomicUsize,
    last_error: Mutex<Option<IntegrationError>>,
    latency: Duration,
    fail_start: AtomicBool,
    fail_send: AtomicBool,
    fail_unsubscribe: AtomicBool,
}

impl MockAdapter {
    /// Create a stopped, disconnected mock adapter
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: Mutex::new(LifecycleStatus::Ready),
            connection: Mutex::new(ConnectionStatus::Disconnected),
            sent: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(HashMap::new()),
            next_subscription: AtomicUsize::new(1),
            start_calls: AtomicUsize::new(0),
            last_error: Mutex::new(None),
            latency: Duration::from_millis(5),
            fail_start: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            fail_unsubscribe: AtomicBool::new(false),
        }
    }

    /// Create a mock adapter that is already running and connected
    pub fn connected(id: impl Into<String>) -> Self {
        let adapter = Self::new(id);
        adapter.set_state(LifecycleStatus::Running, ConnectionStatus::Connected);
        adapter
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_unsubscribe(&self, fail: bool) {
        self.fail_unsubscribe.store(fail, Ordering::SeqCst);
    }

    pub fn set_connection_status(&self, status: ConnectionStatus) {
        if let Ok(mut connection) = self.connection.lock() {
            *connection = status;
        }
    }

    fn set_state(&self, status: LifecycleStatus, connection: ConnectionStatus) {
        if let Ok(mut current) = self.status.lock() {
            *current = status;
        }
        self.set_connection_status(connection);
    }

    fn record_error(&self, message: &str) -> PlantlinkError {
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(IntegrationError::new(
                IntegrationErrorKind::Connection,
                message,
                self.id.clone(),
            ));
        }
        PlantlinkError::Adapter(message.to_string())
    }

    /// Packets delivered through `send_data`
    pub fn sent_packets(&self) -> Vec<DataPacket> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Options passed to each open subscription
    pub fn subscription_options(&self) -> Vec<Option<StageOptions>> {
        self.subscriptions
            .lock()
            .map(|subs| subs.values().map(|s| s.options.clone()).collect())
            .unwrap_or_default()
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    /// Push a packet to every open subscription and wait for the callbacks
    pub async fn emit(&self, packet: DataPacket) {
        let callbacks: Vec<DataCallback> = match self.subscriptions.lock() {
            Ok(subs) => subs.values().map(|s| s.callback.clone()).collect(),
            Err(_) => return,
        };
        for callback in callbacks {
            callback(packet.clone()).await;
        }
    }

    /// Push a packet only to subscriptions opened for `topic`
    pub async fn emit_to_topic(&self, topic: &str, packet: DataPacket) {
        let callbacks: Vec<DataCallback> = match self.subscriptions.lock() {
            Ok(subs) => subs
                .values()
                .filter(|s| {
                    s.options
                        .as_ref()
                        .and_then(|o| o.get("topic"))
                        .and_then(|t| t.as_str())
                        == Some(topic)
                })
                .map(|s| s.callback.clone())
                .collect(),
            Err(_) => return,
        };
        for callback in callbacks {
            callback(packet.clone()).await;
        }
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> LifecycleStatus {
        self.status
            .lock()
            .map(|s| *s)
            .unwrap_or(LifecycleStatus::Error)
    }

    fn connection_status(&self) -> ConnectionStatus {
        self.connection
            .lock()
            .map(|c| *c)
            .unwrap_or(ConnectionStatus::Error)
    }

    async fn start(&self) -> PlantlinkResult<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            self.set_state(LifecycleStatus::Error, ConnectionStatus::Error);
            return Err(self.record_error("connection refused"));
        }
        self.set_state(LifecycleStatus::Running, ConnectionStatus::Connected);
        Ok(())
    }

    async fn stop(&self) -> PlantlinkResult<()> {
        self.set_state(LifecycleStatus::Ready, ConnectionStatus::Disconnected);
        Ok(())
    }

    async fn send_data(
        &self,
        packet: DataPacket,
        _options: Option<&StageOptions>,
    ) -> PlantlinkResult<()> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(self.record_error("write rejected by remote system"));
        }
        self.sent.lock()?.push(packet);
        Ok(())
    }

    async fn receive_data(
        &self,
        callback: DataCallback,
        options: Option<StageOptions>,
    ) -> PlantlinkResult<SubscriptionId> {
        let id = format!(
            "{}-sub-{}",
            self.id,
            self.next_subscription.fetch_add(1, Ordering::SeqCst)
        );
        self.subscriptions
            .lock()?
            .insert(id.clone(), MockSubscription { callback, options });
        Ok(id)
    }

    async fn unsubscribe(&self, subscription_id: &str) -> PlantlinkResult<()> {
        if self.fail_unsubscribe.load(Ordering::SeqCst) {
            return Err(self.record_error("unsubscribe timed out"));
        }
        self.subscriptions
            .lock()?
            .remove(subscription_id)
            .map(|_| ())
            .ok_or_else(|| {
                PlantlinkError::Subscription(format!("unknown subscription {}", subscription_id))
            })
    }

    async fn test_connection(&self) -> bool {
        self.connection_status() == ConnectionStatus::Connected
    }

    async fn latency(&self) -> Option<Duration> {
        Some(self.latency)
    }

    fn last_error(&self) -> Option<IntegrationError> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    async fn reconnect(&self) -> PlantlinkResult<()> {
        self.stop().await?;
        self.start().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_start_and_send() {
        let adapter = MockAdapter::new("historian");
        assert_eq!(adapter.connection_status(), ConnectionStatus::Disconnected);

        adapter.start().await.unwrap();
        assert_eq!(adapter.status(), LifecycleStatus::Running);
        assert!(adapter.test_connection().await);

        adapter
            .send_data(DataPacket::new("p1", "test", json!(1)), None)
            .await
            .unwrap();
        assert_eq!(adapter.sent_packets().len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_recorded() {
        let adapter = MockAdapter::new("plc");
        adapter.set_fail_start(true);

        assert!(adapter.start().await.is_err());
        assert_eq!(adapter.status(), LifecycleStatus::Error);
        assert!(adapter.last_error().unwrap().message.contains("refused"));
    }

    #[tokio::test]
    async fn test_emit_reaches_subscribers() {
        let adapter = MockAdapter::connected("broker");
        let received = Arc::new(AtomicUsize::new(0));

        let counter = received.clone();
        let callback: DataCallback = Arc::new(move |_packet: DataPacket| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        });
        let sub = adapter.receive_data(callback, None).await.unwrap();

        adapter.emit(DataPacket::new("p", "broker", json!({}))).await;
        assert_eq!(received.load(Ordering::SeqCst), 1);

        adapter.unsubscribe(&sub).await.unwrap();
        adapter.emit(DataPacket::new("p", "broker", json!({}))).await;
        assert_eq!(received.load(Ordering::SeqCst), 1);
        assert!(adapter.unsubscribe(&sub).await.is_err());
    }
}
