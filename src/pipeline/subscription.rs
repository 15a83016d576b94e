use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::components::{Adapter, DataCallback, SubscriptionId};
use crate::config::StageConfig;
use crate::error::{PlantlinkError, PlantlinkResult};
use crate::logger::{LogLevel, Logger};
use crate::state_machine::LifecycleStatus;

struct TrackedAdapter {
    adapter: Arc<dyn Adapter>,
    subscriptions: Vec<SubscriptionId>,
}

/// Open subscriptions per source adapter id
///
/// Adapters are started here when they are not running yet, but never stopped:
/// they are owned by whoever registered them.
pub struct SubscriptionManager {
    tracked: Mutex<HashMap<String, TrackedAdapter>>,
    logger: Arc<Logger>,
}

impl SubscriptionManager {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self {
            tracked: Mutex::new(HashMap::new()),
            logger,
        }
    }

    /// Start the adapter unless it already runs
    pub async fn ensure_started(&self, adapter: Arc<dyn Adapter>) -> PlantlinkResult<()> {
        if adapter.status() == LifecycleStatus::Running {
            return Ok(());
        }
        self.logger.log(
            LogLevel::Info,
            &format!("Starting source adapter {}", adapter.id()),
            "pipeline::subscription",
        );
        adapter.start().await.map_err(|e| {
            PlantlinkError::Subscription(format!(
                "Failed to start source adapter {}: {}",
                adapter.id(),
                e
            ))
        })
    }

    /// Open the subscriptions a source stage asks for and track them
    ///
    /// One subscription per entry of `config.topics` (with `topic` added to its
    /// options), or a single one with the stage options as they are. If any
    /// subscription fails, the ones already opened for this stage are closed.
    pub async fn open(
        &self,
        adapter: Arc<dyn Adapter>,
        stage: &StageConfig,
        callback: DataCallback,
    ) -> PlantlinkResult<usize> {
        let topics = stage.topics();
        let requests = if topics.is_empty() {
            vec![stage.config.clone()]
        } else {
            topics
                .into_iter()
                .map(|topic| {
                    let mut options = stage.config.clone();
                    options.insert("topic".to_string(), Value::String(topic));
                    options
                })
                .collect()
        };

        let mut opened = Vec::with_capacity(requests.len());
        for options in requests {
            match adapter.receive_data(callback.clone(), Some(options)).await {
                Ok(id) => opened.push(id),
                Err(e) => {
                    self.close(adapter.as_ref(), &opened).await;
                    return Err(PlantlinkError::Subscription(format!(
                        "Failed to subscribe to {} for stage {}: {}",
                        adapter.id(),
                        stage.id,
                        e
                    )));
                }
            }
        }

        let count = opened.len();
        self.logger.log(
            LogLevel::Debug,
            &format!(
                "Opened {} subscription(s) on {} for stage {}",
                count,
                adapter.id(),
                stage.id
            ),
            "pipeline::subscription",
        );

        let mut tracked = self.tracked.lock()?;
        tracked
            .entry(adapter.id().to_string())
            .or_insert_with(|| TrackedAdapter {
                adapter: adapter.clone(),
                subscriptions: Vec::new(),
            })
            .subscriptions
            .extend(opened);
        Ok(count)
    }

    /// Close every tracked subscription and forget them
    ///
    /// Best effort: a failed unsubscribe is logged and the rest continue.
    /// Returns the number of failures.
    pub async fn unsubscribe_all(&self) -> usize {
        let drained: Vec<TrackedAdapter> = match self.tracked.lock() {
            Ok(mut tracked) => tracked.drain().map(|(_, t)| t).collect(),
            Err(poisoned) => poisoned.into_inner().drain().map(|(_, t)| t).collect(),
        };

        let mut failures = 0;
        for tracked in drained {
            failures += self
                .close(tracked.adapter.as_ref(), &tracked.subscriptions)
                .await;
        }
        failures
    }

    async fn close(&self, adapter: &dyn Adapter, subscriptions: &[SubscriptionId]) -> usize {
        let mut failures = 0;
        for id in subscriptions {
            if let Err(e) = adapter.unsubscribe(id).await {
                failures += 1;
                self.logger.log(
                    LogLevel::Warn,
                    &format!(
                        "Failed to unsubscribe {} from {}: {}",
                        id,
                        adapter.id(),
                        e
                    ),
                    "pipeline::subscription",
                );
            }
        }
        failures
    }

    /// Number of open subscriptions across all adapters
    pub fn count(&self) -> usize {
        self.tracked
            .lock()
            .map(|tracked| tracked.values().map(|t| t.subscriptions.len()).sum::<usize>())
            .unwrap_or(0)
    }

    pub fn adapter_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .tracked
            .lock()
            .map(|tracked| tracked.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::MockAdapter;
    use crate::config::StageType;
    use crate::packet::DataPacket;
    use futures::FutureExt;
    use serde_json::json;

    fn noop_callback() -> DataCallback {
        Arc::new(|_packet: DataPacket| async {}.boxed())
    }

    fn manager() -> SubscriptionManager {
        SubscriptionManager::new(Arc::new(Logger::new()))
    }

    #[tokio::test]
    async fn test_single_subscription_starts_adapter() {
        let adapter = Arc::new(MockAdapter::new("opcua"));
        let stage = StageConfig::new("in", "In", StageType::Source, "opcua");
        let manager = manager();

        manager.ensure_started(adapter.clone()).await.unwrap();
        let opened = manager
            .open(adapter.clone(), &stage, noop_callback())
            .await
            .unwrap();

        assert_eq!(opened, 1);
        assert_eq!(adapter.start_calls(), 1);
        assert_eq!(adapter.subscription_count(), 1);
        assert_eq!(manager.count(), 1);
        assert_eq!(manager.adapter_ids(), vec!["opcua"]);
    }

    #[tokio::test]
    async fn test_running_adapter_is_not_restarted() {
        let adapter = Arc::new(MockAdapter::connected("opcua"));
        manager().ensure_started(adapter.clone()).await.unwrap();
        assert_eq!(adapter.start_calls(), 0);
    }

    #[tokio::test]
    async fn test_one_subscription_per_topic() {
        let adapter = Arc::new(MockAdapter::connected("mqtt"));
        let stage = StageConfig::new("in", "In", StageType::Source, "mqtt")
            .with_option("topics", json!(["line/1/temp", "line/1/pressure"]))
            .with_option("qos", 1);
        let manager = manager();

        let opened = manager
            .open(adapter.clone(), &stage, noop_callback())
            .await
            .unwrap();
        assert_eq!(opened, 2);

        let mut topics: Vec<String> = adapter
            .subscription_options()
            .into_iter()
            .map(|o| {
                let o = o.unwrap();
                assert_eq!(o["qos"], 1);
                o["topic"].as_str().unwrap().to_string()
            })
            .collect();
        topics.sort();
        assert_eq!(topics, vec!["line/1/pressure", "line/1/temp"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_all_is_best_effort() {
        let a = Arc::new(MockAdapter::connected("a"));
        let b = Arc::new(MockAdapter::connected("b"));
        let manager = manager();
        let stage_a = StageConfig::new("sa", "A", StageType::Source, "a");
        let stage_b = StageConfig::new("sb", "B", StageType::Source, "b");
        manager.open(a.clone(), &stage_a, noop_callback()).await.unwrap();
        manager.open(b.clone(), &stage_b, noop_callback()).await.unwrap();

        a.set_fail_unsubscribe(true);
        let failures = manager.unsubscribe_all().await;

        assert_eq!(failures, 1);
        assert_eq!(b.subscription_count(), 0);
        assert_eq!(manager.count(), 0);
    }
}
