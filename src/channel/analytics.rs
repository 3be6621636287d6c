use super::spawn_listener;
use crate::client::RealtimeClient;
use crate::infrastructure::TaskManager;
use crate::messaging::{AnalyticsUpdate, InboundEvent, MessageKind};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub metric: String,
    pub value: f64,
    /// `None` for workspace-wide metrics
    pub content_id: Option<String>,
    pub dimensions: Value,
    pub received_at: DateTime<Utc>,
}

type MetricKey = (String, Option<String>);

/// Latest value per metric, scoped by content id
#[derive(Clone, Default)]
pub struct AnalyticsStream {
    inner: Arc<StreamInner>,
}

#[derive(Default)]
struct StreamInner {
    latest: RwLock<HashMap<MetricKey, MetricSample>>,
    tasks: Mutex<TaskManager>,
}

impl AnalyticsStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attach(&self, client: &RealtimeClient) {
        let rx = client.on(MessageKind::AnalyticsUpdate).await;
        spawn_listener(
            &self.inner.tasks,
            Arc::downgrade(&self.inner),
            rx,
            |inner, event| {
                if let InboundEvent::AnalyticsUpdate(update) = event {
                    inner.record(update);
                }
            },
        );
    }

    pub fn detach(&self) {
        self.inner.tasks.lock().abort_all();
    }

    pub fn record(&self, update: AnalyticsUpdate) {
        self.inner.record(update);
    }

    /// Latest workspace-wide value of `metric`
    pub fn latest(&self, metric: &str) -> Option<MetricSample> {
        self.inner
            .latest
            .read()
            .get(&(metric.to_string(), None))
            .cloned()
    }

    pub fn latest_for(&self, metric: &str, content_id: &str) -> Option<MetricSample> {
        self.inner
            .latest
            .read()
            .get(&(metric.to_string(), Some(content_id.to_string())))
            .cloned()
    }

    /// All samples ordered by metric, then content id
    pub fn snapshot(&self) -> Vec<MetricSample> {
        let mut samples: Vec<_> = self.inner.latest.read().values().cloned().collect();
        samples.sort_by(|a, b| {
            a.metric
                .cmp(&b.metric)
                .then_with(|| a.content_id.cmp(&b.content_id))
        });
        samples
    }
}

impl StreamInner {
    fn record(&self, update: AnalyticsUpdate) {
        let key = (update.metric.clone(), update.content_id.clone());
        let sample = MetricSample {
            metric: update.metric,
            value: update.value,
            content_id: update.content_id,
            dimensions: update.dimensions,
            received_at: Utc::now(),
        };
        self.latest.write().insert(key, sample);
    }
}
