use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// A chat message the core asks the transport to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outbound {
    pub external_id: String,
    pub text: String,
    /// Public code to render as a scannable image next to the text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_code: Option<String>,
}

impl Outbound {
    pub fn text(external_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            text: text.into(),
            public_code: None,
        }
    }

    pub fn with_code(mut self, public_code: impl Into<String>) -> Self {
        self.public_code = Some(public_code.into());
        self
    }
}

#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver(&self, message: &Outbound) -> anyhow::Result<()>;
}

/// Writes messages to the log only.
pub struct LogSink;

#[async_trait]
impl MessageSink for LogSink {
    async fn deliver(&self, message: &Outbound) -> anyhow::Result<()> {
        info!(external_id = message.external_id.as_str(), text = message.text.as_str(), "notification");
        Ok(())
    }
}

/// POSTs each message as JSON to a relay that owns the chat transport.
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
}

impl HttpSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl MessageSink for HttpSink {
    async fn deliver(&self, message: &Outbound) -> anyhow::Result<()> {
        self.client
            .post(&self.url)
            .json(message)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct DeliveryStats {
    pub delivered: AtomicU64,
    pub failed: AtomicU64,
    pub dropped: AtomicU64,
}

/// Producer side of the notification queue. Enqueueing never blocks and never
/// reports failure to the caller.
#[derive(Clone)]
pub struct Notifier {
    sender: mpsc::Sender<Outbound>,
    stats: Arc<DeliveryStats>,
}

impl Notifier {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let notifier = Self {
            sender,
            stats: Arc::new(DeliveryStats::default()),
        };
        (notifier, receiver)
    }

    /// Creates the queue and spawns its delivery worker on the current runtime.
    pub fn start(sink: Arc<dyn MessageSink>, capacity: usize) -> Self {
        let (notifier, receiver) = Self::channel(capacity);
        actix_web::rt::spawn(run_worker(receiver, sink, notifier.stats.clone()));
        notifier
    }

    pub fn enqueue(&self, message: Outbound) {
        if let Err(e) = self.sender.try_send(message) {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            let message = match e {
                mpsc::error::TrySendError::Full(m) | mpsc::error::TrySendError::Closed(m) => m,
            };
            warn!(external_id = message.external_id.as_str(), "notification queue unavailable, message dropped");
        }
    }

    #[cfg(test)]
    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }
}

pub async fn run_worker(mut receiver: mpsc::Receiver<Outbound>, sink: Arc<dyn MessageSink>, stats: Arc<DeliveryStats>) {
    while let Some(message) = receiver.recv().await {
        match sink.deliver(&message).await {
            Ok(()) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(external_id = message.external_id.as_str(), "notification delivery failed: {e}");
            }
        }
    }
    info!(
        delivered = stats.delivered.load(Ordering::Relaxed),
        failed = stats.failed.load(Ordering::Relaxed),
        dropped = stats.dropped.load(Ordering::Relaxed),
        "notification worker stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<Outbound>>,
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn deliver(&self, message: &Outbound) -> anyhow::Result<()> {
            if message.text == "boom" {
                anyhow::bail!("transport down");
            }
            self.seen.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    #[actix_web::test]
    async fn test_worker_counts_deliveries_and_failures() {
        let sink = Arc::new(RecordingSink::default());
        let (notifier, receiver) = Notifier::channel(8);
        notifier.enqueue(Outbound::text("1", "hello"));
        notifier.enqueue(Outbound::text("2", "boom"));
        notifier.enqueue(Outbound::text("3", "bye").with_code("003-abc"));
        let stats = notifier.stats.clone();
        drop(notifier);

        run_worker(receiver, sink.clone(), stats.clone()).await;

        assert_eq!(stats.delivered.load(Ordering::Relaxed), 2);
        assert_eq!(stats.failed.load(Ordering::Relaxed), 1);
        let seen = sink.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].public_code.as_deref(), Some("003-abc"));
    }

    #[test]
    fn test_full_queue_drops_without_failing() {
        let (notifier, _receiver) = Notifier::channel(1);
        notifier.enqueue(Outbound::text("1", "first"));
        notifier.enqueue(Outbound::text("1", "second"));
        assert_eq!(notifier.stats().dropped.load(Ordering::Relaxed), 1);
    }

    #[actix_web::test]
    async fn test_started_notifier_delivers() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = Notifier::start(sink.clone(), 4);
        notifier.enqueue(Outbound::text("9", "ping"));
        for _ in 0..50 {
            if notifier.stats().delivered.load(Ordering::Relaxed) == 1 {
                break;
            }
            actix_web::rt::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(sink.seen.lock().unwrap().len(), 1);
    }
}
