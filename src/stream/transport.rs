// src/stream/transport.rs - Cancellable streaming HTTP transport
//
// `open` spawns a task that performs the POST and forwards raw body chunks
// over a bounded channel. The consumer pulls them through `StreamHandle::next`.
// After `stop()` no further event is yielded, whatever the task is doing.

use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use crate::infra::errors::NovelerError;
use crate::util::truncate_str;

/// Chunks buffered between the network task and the consumer.
const CHANNEL_CAPACITY: usize = 64;

/// Error bodies from non-2xx responses are cut to this many bytes.
const MAX_ERROR_BODY: usize = 200;

/// One outbound streaming request. Always a JSON POST with bearer auth.
#[derive(Clone)]
pub struct StreamRequest {
    pub url: String,
    pub api_key: String,
    pub body: serde_json::Value,
}

impl std::fmt::Debug for StreamRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRequest")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("body", &self.body)
            .finish()
    }
}

/// Raw transport output: any number of chunks, then exactly one of `End` / `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Chunk(Vec<u8>),
    End,
    Error(String),
}

impl TransportEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransportEvent::Chunk(_))
    }
}

/// Seam between the orchestrator and the network.
pub trait ChatTransport: Send + Sync {
    /// Start a stream. Must be called from within a tokio runtime.
    fn open(&self, request: StreamRequest) -> Result<StreamHandle, NovelerError>;
}

/// Producer half handed to whatever feeds a `StreamHandle`.
#[derive(Debug, Clone)]
pub struct StreamSender {
    tx: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
}

impl StreamSender {
    /// Forward one event. `false` once the consumer stopped or went away.
    pub async fn send(&self, event: TransportEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(event) => sent.is_ok(),
        }
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Consumer half of one in-flight stream.
#[derive(Debug)]
pub struct StreamHandle {
    rx: mpsc::Receiver<TransportEvent>,
    cancel: CancellationToken,
    task: Option<AbortHandle>,
    finished: bool,
}

impl StreamHandle {
    /// A connected sender/handle pair with no background task attached.
    pub fn channel() -> (StreamSender, StreamHandle) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let sender = StreamSender {
            tx,
            cancel: cancel.clone(),
        };
        let handle = StreamHandle {
            rx,
            cancel,
            task: None,
            finished: false,
        };
        (sender, handle)
    }

    /// Tie a spawned producer task to this handle so `stop` aborts it.
    pub fn attach_task(&mut self, task: AbortHandle) {
        self.task = Some(task);
    }

    /// Next event, or `None` after a terminal event or `stop()`.
    ///
    /// A producer that disappears without a terminal event is reported as
    /// an `Error`, so every unstopped stream ends in exactly one of
    /// `End` / `Error`.
    pub async fn next(&mut self) -> Option<TransportEvent> {
        if self.finished || self.cancel.is_cancelled() {
            return None;
        }
        let event = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            event = self.rx.recv() => event,
        };
        let event = event
            .unwrap_or_else(|| TransportEvent::Error("stream closed unexpectedly".into()));
        if event.is_terminal() {
            self.finished = true;
        }
        Some(event)
    }

    /// Tear the stream down. Safe to call any number of times.
    pub fn stop(&self) {
        self.cancel.cancel();
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// reqwest-backed transport for OpenAI-compatible endpoints.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration) -> Result<Self, NovelerError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(format!("noveler/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl ChatTransport for HttpTransport {
    fn open(&self, request: StreamRequest) -> Result<StreamHandle, NovelerError> {
        let url = url::Url::parse(&request.url)
            .map_err(|e| NovelerError::Config(format!("invalid API URL '{}': {e}", request.url)))?;

        tracing::debug!(url = %url, "Opening chat completion stream");

        let builder = self
            .client
            .post(url)
            .bearer_auth(&request.api_key)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .json(&request.body);

        let (sender, mut handle) = StreamHandle::channel();
        let task = tokio::spawn(pump(builder, sender));
        handle.attach_task(task.abort_handle());
        Ok(handle)
    }
}

async fn pump(builder: reqwest::RequestBuilder, tx: StreamSender) {
    let response = tokio::select! {
        _ = tx.cancelled() => return,
        response = builder.send() => response,
    };
    let response = match response {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("Chat completion request failed: {e}");
            tx.send(TransportEvent::Error(e.to_string())).await;
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = tokio::select! {
            _ = tx.cancelled() => return,
            body = response.text() => body.unwrap_or_default(),
        };
        let err = NovelerError::HttpStatus {
            status: status.as_u16(),
            body: truncate_str(body.trim(), MAX_ERROR_BODY).to_string(),
        };
        tracing::warn!("{err}");
        tx.send(TransportEvent::Error(err.to_string())).await;
        return;
    }

    let mut body = response.bytes_stream();
    loop {
        let next = tokio::select! {
            _ = tx.cancelled() => return,
            next = body.next() => next,
        };
        match next {
            Some(Ok(bytes)) => {
                if !tx.send(TransportEvent::Chunk(bytes.to_vec())).await {
                    return;
                }
            }
            Some(Err(e)) => {
                tracing::warn!("Chat completion stream broke: {e}");
                tx.send(TransportEvent::Error(e.to_string())).await;
                return;
            }
            None => {
                tx.send(TransportEvent::End).await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_yields_until_terminal() {
        let (tx, mut handle) = StreamHandle::channel();
        tokio::spawn(async move {
            tx.send(TransportEvent::Chunk(b"a".to_vec())).await;
            tx.send(TransportEvent::End).await;
            tx.send(TransportEvent::Chunk(b"late".to_vec())).await;
        });
        assert_eq!(handle.next().await, Some(TransportEvent::Chunk(b"a".to_vec())));
        assert_eq!(handle.next().await, Some(TransportEvent::End));
        assert_eq!(handle.next().await, None);
        assert!(handle.is_finished());
    }

    #[test]
    fn test_next_pending_until_event() {
        let (tx, mut handle) = StreamHandle::channel();
        {
            let mut next = tokio_test::task::spawn(handle.next());
            tokio_test::assert_pending!(next.poll());
            assert!(tx.tx.try_send(TransportEvent::End).is_ok());
            assert!(next.is_woken());
            tokio_test::assert_ready_eq!(next.poll(), Some(TransportEvent::End));
        }
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_silences_stream() {
        let (tx, mut handle) = StreamHandle::channel();
        assert!(tx.send(TransportEvent::Chunk(b"buffered".to_vec())).await);
        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());
        assert_eq!(handle.next().await, None);
        assert!(!tx.send(TransportEvent::Chunk(b"more".to_vec())).await);
    }

    #[tokio::test]
    async fn test_stop_after_completion_is_noop() {
        let (tx, mut handle) = StreamHandle::channel();
        tx.send(TransportEvent::End).await;
        assert_eq!(handle.next().await, Some(TransportEvent::End));
        handle.stop();
        assert_eq!(handle.next().await, None);
    }

    #[tokio::test]
    async fn test_dropped_producer_reports_error() {
        let (tx, mut handle) = StreamHandle::channel();
        drop(tx);
        assert!(matches!(handle.next().await, Some(TransportEvent::Error(_))));
        assert_eq!(handle.next().await, None);
    }

    #[tokio::test]
    async fn test_drop_cancels_producer() {
        let (tx, handle) = StreamHandle::channel();
        drop(handle);
        assert!(tx.is_cancelled());
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_url() {
        let transport = HttpTransport::new(Duration::from_secs(1)).unwrap();
        let err = transport
            .open(StreamRequest {
                url: "not a url".into(),
                api_key: "k".into(),
                body: serde_json::json!({}),
            })
            .unwrap_err();
        assert!(matches!(err, NovelerError::Config(_)));
    }

    #[test]
    fn test_request_debug_redacts_key() {
        let req = StreamRequest {
            url: "https://x".into(),
            api_key: "sk-secret".into(),
            body: serde_json::json!({}),
        };
        assert!(!format!("{req:?}").contains("sk-secret"));
    }
}
