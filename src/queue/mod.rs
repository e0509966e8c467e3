// The task-queue boundary: enqueue a JSON POST for at-least-once delivery.
// The HTTP implementation hands the request to a spawned delivery task with
// a few retries; handlers stay idempotent, so a duplicate or late delivery
// is harmless. The in-memory implementation records tasks for assertions.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, warn};

const DELIVERY_ATTEMPTS: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("enqueue failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("payload serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Queue a POST of `payload` to `url`, returning a task id. Delivery is
    /// at-least-once; it may happen after this call returns.
    async fn enqueue(&self, url: &str, payload: serde_json::Value) -> Result<String, QueueError>;
}

pub struct HttpTaskQueue {
    http: reqwest::Client,
}

impl HttpTaskQueue {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to construct http client");
        Self { http }
    }
}

impl Default for HttpTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for HttpTaskQueue {
    async fn enqueue(&self, url: &str, payload: serde_json::Value) -> Result<String, QueueError> {
        let task_id = uuid::Uuid::new_v4().to_string();
        let http = self.http.clone();
        let url = url.to_owned();
        tokio::spawn(async move {
            for attempt in 1..=DELIVERY_ATTEMPTS {
                let result = http
                    .post(&url)
                    .json(&payload)
                    .send()
                    .await
                    .and_then(|response| response.error_for_status());
                match result {
                    Ok(_) => return,
                    Err(err) => {
                        warn!(%url, attempt, ?err, "task delivery attempt failed");
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                    }
                }
            }
            // The next push or sync for this path re-enqueues it.
            error!(%url, "task dropped after {DELIVERY_ATTEMPTS} attempts");
        });
        Ok(task_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnqueuedTask {
    pub url: String,
    pub payload: serde_json::Value,
}

/// Test double recording every enqueued task.
#[derive(Default)]
pub struct InMemoryTaskQueue {
    tasks: Mutex<Vec<EnqueuedTask>>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> Vec<EnqueuedTask> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, url: &str, payload: serde_json::Value) -> Result<String, QueueError> {
        let mut tasks = self.tasks.lock().unwrap();
        tasks.push(EnqueuedTask {
            url: url.to_owned(),
            payload,
        });
        Ok(format!("task-{}", tasks.len()))
    }
}
