//! JSON-lines replay subscriber
//!
//! Delivers each non-empty line of a file as one message, then ends the
//! stream. Settlement is a no-op: a replay file has nothing to
//! redeliver. Useful for local runs and fixtures.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use cdcflow_config::FileBusConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{BusError, Result};
use crate::flow::{FlowControl, FlowController};
use crate::message::{AckHandle, Acknowledger, Message};
use crate::metrics::{BusMetrics, BusMetricsHandle};
use crate::subscriber::{Subscriber, Subscription, Worker};

struct DiscardAcknowledger;

impl Acknowledger for DiscardAcknowledger {
    fn ack(&self, _ack_id: &str) {}
    fn nack(&self, _ack_id: &str) {}
}

/// Subscriber replaying a JSON-lines file
#[derive(Debug)]
pub struct FileSubscriber {
    path: PathBuf,
    id: String,
    metrics: Arc<BusMetrics>,
}

impl FileSubscriber {
    /// Create a subscriber for `path`; the file is opened on subscribe
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            id: path.display().to_string(),
            path,
            metrics: Arc::new(BusMetrics::new()),
        }
    }

    /// Create from configuration
    pub fn from_config(config: &FileBusConfig) -> Self {
        Self::new(&config.path)
    }
}

#[async_trait]
impl Subscriber for FileSubscriber {
    fn transport(&self) -> &'static str {
        "file"
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn metrics_handle(&self) -> BusMetricsHandle {
        BusMetricsHandle::new(&self.id, self.transport(), Arc::clone(&self.metrics))
    }

    async fn subscribe(&self, flow: FlowControl) -> Result<Subscription> {
        let file = tokio::fs::File::open(&self.path).await.map_err(|source| {
            self.metrics.errors.inc();
            BusError::Io {
                path: self.id.clone(),
                source,
            }
        })?;
        info!(path = %self.id, "replaying change events from file");

        let controller = FlowController::new(&flow, Arc::clone(&self.metrics));
        let (tx, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(replay(
            BufReader::new(file),
            self.id.clone(),
            controller.clone(),
            tx,
            Arc::clone(&self.metrics),
            cancel.clone(),
        ));

        Ok(Subscription::new(&self.id, rx, controller).with_producer(Worker::new(cancel, task)))
    }
}

async fn replay(
    reader: BufReader<tokio::fs::File>,
    id: String,
    flow: FlowController,
    tx: mpsc::Sender<Message>,
    metrics: Arc<BusMetrics>,
    cancel: CancellationToken,
) {
    let acker: Arc<dyn Acknowledger> = Arc::new(DiscardAcknowledger);
    let mut lines = reader.split(b'\n');
    let mut line_no = 0u64;

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_segment() => line,
        };
        // Bytes go through unchanged; invalid UTF-8 is the parser's to report
        let mut line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                metrics.errors.inc();
                warn!(path = %id, line = line_no + 1, error = %e, "replay read failed, ending stream");
                break;
            }
        };
        line_no += 1;
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = flow.acquire() => permit,
        };
        let Some(permit) = permit else { break };

        let ack_id = format!("line-{line_no}");
        let message = Message::new(
            ack_id.clone(),
            line,
            AckHandle::new(ack_id, Arc::clone(&acker), permit),
        );
        metrics.received.inc();
        if tx.send(message).await.is_err() {
            break;
        }
    }

    debug!(path = %id, lines = line_no, "replay finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdcflow_metrics::SourceMetricsProvider;
    use std::io::Write;

    #[tokio::test]
    async fn test_replays_lines_then_ends() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"op":"c","after":{{"id":1}}}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"op":"d","before":{{"id":1}}}}"#).unwrap();
        file.flush().unwrap();

        let subscriber = FileSubscriber::new(file.path());
        let mut subscription = subscriber.subscribe(FlowControl::default()).await.unwrap();

        let first = subscription.recv().await.unwrap();
        assert_eq!(first.id(), "line-1");
        assert!(first.data().starts_with(br#"{"op":"c""#));
        first.ack();

        let second = subscription.recv().await.unwrap();
        assert_eq!(second.id(), "line-3");
        second.ack();

        assert!(subscription.recv().await.is_none());
        subscription.cancel().await;
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_delivered() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"op\":\"c\",\"after\":{\"id\":1}}\r\n").unwrap();
        file.write_all(b"\xff\xfe garbage\n").unwrap();
        file.write_all(b"{\"op\":\"c\",\"after\":{\"id\":2}}").unwrap();
        file.flush().unwrap();

        let subscriber = FileSubscriber::new(file.path());
        let mut subscription = subscriber.subscribe(FlowControl::default()).await.unwrap();

        let mut delivered = Vec::new();
        while let Some(message) = subscription.recv().await {
            delivered.push((message.id().to_string(), message.data().to_vec()));
            message.ack();
        }

        let ids: Vec<_> = delivered.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["line-1", "line-2", "line-3"]);
        assert_eq!(delivered[0].1, br#"{"op":"c","after":{"id":1}}"#);
        assert_eq!(delivered[1].1, b"\xff\xfe garbage");
        assert_eq!(subscriber.metrics_handle().snapshot().errors, 0);
        subscription.cancel().await;
    }

    #[tokio::test]
    async fn test_missing_file_fails_subscribe() {
        let subscriber = FileSubscriber::new("/nonexistent/changes.jsonl");
        let err = subscriber.subscribe(FlowControl::default()).await.unwrap_err();
        assert!(matches!(err, BusError::Io { .. }));
        assert_eq!(subscriber.metrics_handle().snapshot().errors, 1);
    }
}
