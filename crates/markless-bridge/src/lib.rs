//! Request/response bridge to an out-of-process diagram renderer.
//!
//! The renderer (typically a webview running a diagram library) loads asynchronously and signals
//! readiness once. After that it answers one request at a time.
//!
//! ## Two halves
//!
//! - [`RendererBridge`]: the engine side. [`RendererBridge::render`] fails fast before readiness,
//!   queues callers FIFO while a request is in flight, and gives up after a bounded timeout.
//! - [`RendererEndpoint`]: the host side. Forward [`RenderRequest`]s to the renderer and send the
//!   answers back with [`RendererEndpoint::respond`] (or drive everything with
//!   [`RendererEndpoint::serve`]).
//!
//! ```rust,no_run
//! # async fn demo() {
//! use markless_bridge::{DiagramRequest, channel};
//! use markless_core::decoration::RenderedImage;
//! use std::time::Duration;
//!
//! let (bridge, endpoint) = channel(Duration::from_secs(5));
//! tokio::spawn(endpoint.serve(|req: &DiagramRequest| {
//!     Ok(RenderedImage::svg(format!("<svg><!-- {} --></svg>", req.source)))
//! }));
//! bridge.ready().await.unwrap();
//! let image = bridge.render(DiagramRequest::new("graph TD; A-->B", true, "monospace")).await;
//! # let _ = image;
//! # }
//! ```
use markless_core::decoration::RenderedImage;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("renderer host has not signalled readiness")]
    NotReady,
    #[error("renderer host did not answer within {0:?}")]
    Timeout(Duration),
    #[error("renderer host disconnected")]
    Closed,
    #[error("renderer failed: {0}")]
    Render(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    Uninitialized,
    Ready,
    AwaitingResponse,
}

/// Payload sent to the diagram renderer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DiagramRequest {
    pub source: String,
    pub dark: bool,
    pub font_family: String,
}

impl DiagramRequest {
    pub fn new(source: impl Into<String>, dark: bool, font_family: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            dark,
            font_family: font_family.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RenderRequest {
    pub id: u64,
    pub payload: DiagramRequest,
}

#[derive(Clone, Debug)]
pub struct DiagramResponse {
    pub id: u64,
    pub result: Result<RenderedImage, String>,
}

/// Creates a connected bridge/endpoint pair. `timeout` bounds each request after it is sent.
pub fn channel(timeout: Duration) -> (RendererBridge, RendererEndpoint) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (response_tx, response_rx) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = watch::channel(false);

    let bridge = RendererBridge {
        requests: request_tx,
        responses: Mutex::new(response_rx),
        ready: ready_rx,
        next_id: AtomicU64::new(1),
        awaiting: AtomicBool::new(false),
        timeout,
    };
    let endpoint = RendererEndpoint {
        requests: request_rx,
        responses: response_tx,
        ready: ready_tx,
    };
    (bridge, endpoint)
}

pub struct RendererBridge {
    requests: mpsc::UnboundedSender<RenderRequest>,
    /// Holding this lock is what makes a caller the single in-flight request.
    responses: Mutex<mpsc::UnboundedReceiver<DiagramResponse>>,
    ready: watch::Receiver<bool>,
    next_id: AtomicU64,
    awaiting: AtomicBool,
    timeout: Duration,
}

impl RendererBridge {
    pub fn state(&self) -> BridgeState {
        if !*self.ready.borrow() {
            BridgeState::Uninitialized
        } else if self.awaiting.load(Ordering::Acquire) {
            BridgeState::AwaitingResponse
        } else {
            BridgeState::Ready
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Waits until the renderer host signals readiness.
    pub async fn ready(&self) -> Result<(), BridgeError> {
        let mut ready = self.ready.clone();
        ready
            .wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| BridgeError::Closed)
    }

    /// Renders one diagram.
    ///
    /// Returns [`BridgeError::NotReady`] immediately if the host has not loaded yet. Concurrent
    /// callers are served one at a time in arrival order.
    pub async fn render(&self, payload: DiagramRequest) -> Result<RenderedImage, BridgeError> {
        if !self.is_ready() {
            return Err(BridgeError::NotReady);
        }

        let mut responses = self.responses.lock().await;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let _awaiting = AwaitingGuard::new(&self.awaiting);

        tracing::trace!(id, bytes = payload.source.len(), "sending render request");
        self.requests
            .send(RenderRequest { id, payload })
            .map_err(|_| BridgeError::Closed)?;

        let deadline = Instant::now() + self.timeout;
        loop {
            match tokio::time::timeout_at(deadline, responses.recv()).await {
                Err(_) => {
                    tracing::warn!(id, timeout = ?self.timeout, "render request timed out");
                    return Err(BridgeError::Timeout(self.timeout));
                }
                Ok(None) => return Err(BridgeError::Closed),
                Ok(Some(response)) if response.id == id => {
                    tracing::trace!(id, ok = response.result.is_ok(), "render response");
                    return response.result.map_err(BridgeError::Render);
                }
                Ok(Some(response)) => {
                    tracing::debug!(id = response.id, "dropping late render response");
                }
            }
        }
    }
}

struct AwaitingGuard<'a>(&'a AtomicBool);

impl<'a> AwaitingGuard<'a> {
    fn new(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for AwaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Host side of the bridge.
pub struct RendererEndpoint {
    requests: mpsc::UnboundedReceiver<RenderRequest>,
    responses: mpsc::UnboundedSender<DiagramResponse>,
    ready: watch::Sender<bool>,
}

impl RendererEndpoint {
    /// Marks the renderer as loaded. Further calls are no-ops.
    pub fn signal_ready(&self) {
        if !self.ready.send_replace(true) {
            tracing::debug!("renderer host ready");
        }
    }

    pub async fn next_request(&mut self) -> Option<RenderRequest> {
        self.requests.recv().await
    }

    pub fn respond(&self, id: u64, result: Result<RenderedImage, String>) -> Result<(), BridgeError> {
        self.responses
            .send(DiagramResponse { id, result })
            .map_err(|_| BridgeError::Closed)
    }

    /// Signals readiness and answers requests with `render` until the bridge is dropped.
    pub async fn serve<F>(mut self, mut render: F)
    where
        F: FnMut(&DiagramRequest) -> Result<RenderedImage, String>,
    {
        self.signal_ready();
        while let Some(request) = self.next_request().await {
            let result = render(&request.payload);
            if self.respond(request.id, result).is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(source: &str) -> DiagramRequest {
        DiagramRequest::new(source, true, "monospace")
    }

    #[tokio::test]
    async fn fails_fast_before_readiness() {
        let (bridge, _endpoint) = channel(Duration::from_secs(5));
        assert_eq!(bridge.state(), BridgeState::Uninitialized);
        let started = std::time::Instant::now();
        assert_eq!(
            bridge.render(request("graph TD")).await,
            Err(BridgeError::NotReady)
        );
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn round_trips_after_readiness() {
        let (bridge, endpoint) = channel(Duration::from_secs(5));
        let host = endpoint.serve(|req| Ok(RenderedImage::svg(format!("<svg>{}</svg>", req.source))));
        let client = async {
            bridge.ready().await.unwrap();
            assert_eq!(bridge.state(), BridgeState::Ready);
            let image = bridge.render(request("A")).await.unwrap();
            drop(bridge);
            image
        };
        let (image, ()) = tokio::join!(client, host);
        assert_eq!(image, RenderedImage::svg("<svg>A</svg>"));
    }

    #[tokio::test]
    async fn times_out_when_host_never_answers() {
        let (bridge, endpoint) = channel(Duration::from_millis(30));
        endpoint.signal_ready();
        let err = bridge.render(request("A")).await.unwrap_err();
        assert_eq!(err, BridgeError::Timeout(Duration::from_millis(30)));
        assert_eq!(bridge.state(), BridgeState::Ready);
    }

    #[tokio::test]
    async fn late_responses_are_discarded() {
        let (bridge, mut endpoint) = channel(Duration::from_millis(30));
        endpoint.signal_ready();
        assert!(matches!(
            bridge.render(request("slow")).await,
            Err(BridgeError::Timeout(_))
        ));

        let stale = endpoint.next_request().await.unwrap();
        endpoint
            .respond(stale.id, Ok(RenderedImage::svg("stale")))
            .unwrap();

        let client = bridge.render(request("fresh"));
        let host = async {
            let req = endpoint.next_request().await.unwrap();
            assert_eq!(req.payload.source, "fresh");
            endpoint
                .respond(req.id, Ok(RenderedImage::svg("fresh")))
                .unwrap();
        };
        let (image, ()) = tokio::join!(client, host);
        assert_eq!(image.unwrap(), RenderedImage::svg("fresh"));
    }

    #[tokio::test]
    async fn concurrent_callers_are_served_one_at_a_time() {
        let (bridge, mut endpoint) = channel(Duration::from_secs(5));
        endpoint.signal_ready();

        let host = async {
            let mut seen = Vec::new();
            for _ in 0..2 {
                let req = endpoint.next_request().await.unwrap();
                assert!(endpoint.requests.try_recv().is_err());
                seen.push(req.payload.source.clone());
                tokio::task::yield_now().await;
                endpoint
                    .respond(req.id, Ok(RenderedImage::svg(req.payload.source)))
                    .unwrap();
            }
            seen
        };

        let (first, second, seen) =
            tokio::join!(bridge.render(request("one")), bridge.render(request("two")), host);
        assert_eq!(first.unwrap(), RenderedImage::svg("one"));
        assert_eq!(second.unwrap(), RenderedImage::svg("two"));
        let mut seen = seen;
        seen.sort();
        assert_eq!(seen, vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn render_errors_are_reported() {
        let (bridge, endpoint) = channel(Duration::from_secs(5));
        let host = endpoint.serve(|_| Err("syntax error".to_string()));
        let client = async {
            bridge.ready().await.unwrap();
            let result = bridge.render(request("bad")).await;
            drop(bridge);
            result
        };
        let (result, ()) = tokio::join!(client, host);
        assert_eq!(result, Err(BridgeError::Render("syntax error".to_string())));
    }

    #[tokio::test]
    async fn dropped_host_closes_the_bridge() {
        let (bridge, endpoint) = channel(Duration::from_secs(5));
        endpoint.signal_ready();
        drop(endpoint);
        assert_eq!(bridge.render(request("A")).await, Err(BridgeError::Closed));
    }
}
