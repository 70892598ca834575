//! Chrome native-messaging bridge.
//!
//! The browser extension launches tabquota as a native-messaging host and
//! talks to it over stdin/stdout. Every message is a JSON document preceded by
//! its length as a 4-byte little-endian integer; Chrome caps messages at 1 MiB.
//!
//! ## Protocol
//!
//! Extension → host:
//! - lifecycle events, shaped as [`TabEvent`] (`{"type": "tab_removed", "tabId": 4}`)
//! - answers to host requests: `{"type": "response", "requestId": 7, "url": "..."}`
//!   or `{"type": "response", "requestId": 7, "error": "No tab with id: 4."}`
//!
//! Host → extension:
//! - `{"type": "get_tab", "requestId": 7, "tabId": 4}`
//! - `{"type": "navigate", "requestId": 8, "tabId": 4, "url": "https://example.com/"}`
//!
//! Reading, event handling and writing run as separate tasks: events are
//! applied strictly in arrival order, while responses are routed to their
//! waiting request as soon as they are read, even if an event or sweep is in
//! the middle of waiting for one.

use crate::libs::browser::{Browser, BrowserError, TabInfo};
use crate::libs::handlers::{EventHandler, TabEvent};
use crate::libs::rule::TabId;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Chrome limits native messages to 1 MiB.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Requests the host sends to the extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum HostRequest {
    GetTab { request_id: u64, tab_id: TabId },
    Navigate { request_id: u64, tab_id: TabId, url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserResponse {
    pub request_id: u64,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Event(TabEvent),
    Response(BrowserResponse),
}

impl Incoming {
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(payload)?;
        if value.get("type").and_then(Value::as_str) == Some("response") {
            Ok(Incoming::Response(serde_json::from_value(value)?))
        } else {
            Ok(Incoming::Event(serde_json::from_value(value)?))
        }
    }
}

/// Reads one frame. Returns `Ok(None)` when the stream ends cleanly between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = usize::try_from(u32::from_le_bytes(len_bytes)).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Message too large: {} bytes (max: {} bytes)", len, MAX_MESSAGE_SIZE),
        ));
    }

    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer).await?;
    Ok(Some(buffer))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Message too large: {} bytes (max: {} bytes)", payload.len(), MAX_MESSAGE_SIZE),
        ));
    }
    let len = u32::try_from(payload.len()).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

/// [`Browser`] implemented as request/response over the native-messaging pipe.
pub struct NativeBrowser {
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<BrowserResponse>>>,
    next_id: AtomicU64,
    timeout: Duration,
    closed: AtomicBool,
}

impl NativeBrowser {
    /// Creates the browser handle and the queue of encoded frames it produces.
    pub fn channel(timeout: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (outgoing, frames) = mpsc::unbounded_channel();
        let browser = Arc::new(Self {
            outgoing,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            timeout,
            closed: AtomicBool::new(false),
        });
        (browser, frames)
    }

    /// Hands a response to the request waiting for it.
    pub fn resolve(&self, response: BrowserResponse) {
        match self.pending.lock().remove(&response.request_id) {
            Some(waiter) => {
                let _ = waiter.send(response);
            }
            None => debug!(request_id = response.request_id, "response for unknown or expired request"),
        }
    }

    /// Fails every outstanding and future request with [`BrowserError::Disconnected`].
    pub fn disconnect(&self) {
        let mut pending = self.pending.lock();
        self.closed.store(true, Ordering::SeqCst);
        pending.clear();
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len()
    }

    async fn request(&self, build: impl FnOnce(u64) -> HostRequest + Send) -> Result<BrowserResponse, BrowserError> {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = serde_json::to_vec(&build(request_id)).map_err(|e| BrowserError::Other(e.to_string()))?;

        let (waiter, answer) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            if self.closed.load(Ordering::SeqCst) {
                return Err(BrowserError::Disconnected);
            }
            pending.insert(request_id, waiter);
        }

        if self.outgoing.send(payload).is_err() {
            self.pending.lock().remove(&request_id);
            return Err(BrowserError::Disconnected);
        }

        match tokio::time::timeout(self.timeout, answer).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(BrowserError::Disconnected),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Err(BrowserError::Timeout(u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)))
            }
        }
    }
}

fn response_error(tab_id: TabId, message: String) -> BrowserError {
    // chrome.runtime.lastError reads "No tab with id: N." for closed tabs
    if message.contains("No tab") {
        BrowserError::NotFound(tab_id)
    } else {
        BrowserError::Other(message)
    }
}

#[async_trait]
impl Browser for NativeBrowser {
    async fn get_tab_info(&self, tab_id: TabId) -> Result<TabInfo, BrowserError> {
        let response = self.request(|request_id| HostRequest::GetTab { request_id, tab_id }).await?;
        match (response.error, response.url) {
            (Some(message), _) => Err(response_error(tab_id, message)),
            (None, Some(url)) => Ok(TabInfo { url }),
            (None, None) => Err(BrowserError::Other(format!("no url reported for tab {}", tab_id))),
        }
    }

    async fn navigate(&self, tab_id: TabId, url: &str) -> Result<(), BrowserError> {
        let url = url.to_string();
        let response = self.request(|request_id| HostRequest::Navigate { request_id, tab_id, url }).await?;
        match response.error {
            Some(message) => Err(response_error(tab_id, message)),
            None => Ok(()),
        }
    }
}

/// Runs the host until the extension closes stdin.
///
/// Frames that are not valid JSON or not a known message are logged and
/// skipped; a frame with an impossible length ends the session because the
/// stream can no longer be resynchronized.
pub async fn serve<R, W>(
    mut reader: R,
    mut writer: W,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
    browser: Arc<NativeBrowser>,
    handler: Arc<EventHandler>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer_task = tokio::spawn(async move {
        while let Some(payload) = frames.recv().await {
            if let Err(e) = write_frame(&mut writer, &payload).await {
                warn!(error = %e, "failed to write to browser");
                return Err(e);
            }
        }
        Ok(())
    });

    let (events, mut queue) = mpsc::unbounded_channel::<TabEvent>();
    let event_task = tokio::spawn(async move {
        while let Some(event) = queue.recv().await {
            handler.handle(event).await;
        }
    });

    let result = loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("browser closed the connection");
                break Ok(());
            }
            Err(e) => break Err(e),
        };

        match Incoming::parse(&frame) {
            Ok(Incoming::Response(response)) => browser.resolve(response),
            Ok(Incoming::Event(event)) => {
                debug!(?event, "event received");
                if events.send(event).is_err() {
                    break Ok(());
                }
            }
            Err(e) => warn!(error = %e, "ignoring malformed message"),
        }
    };

    browser.disconnect();
    drop(events);
    if let Err(e) = event_task.await {
        warn!(error = %e, "event task ended abnormally");
    }
    writer_task.abort();

    result
}
