//! Response observer.
//!
//! A transparent tap on one outbound response: it mirrors the status and
//! the number of body bytes actually handed to the transport, without
//! buffering, reordering or changing anything that is sent.

use axum::body::{Body, Bytes};
use axum::http::StatusCode;
use axum::response::Response;
use hyper::body::{Body as HttpBody, Frame, SizeHint};
use std::pin::Pin;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

/// Observed status and byte count for one response.
///
/// Clones share the same counters.
#[derive(Clone, Debug, Default)]
pub struct ResponseObserver {
    state: Arc<ObserverState>,
}

#[derive(Debug, Default)]
struct ObserverState {
    status: AtomicU16,
    bytes: AtomicU64,
}

impl ResponseObserver {
    /// Creates an observer with no status and zero bytes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a status. The last recorded status is the final one.
    pub fn record_status(&self, status: StatusCode) {
        self.state.status.store(status.as_u16(), Ordering::Relaxed);
    }

    /// Adds `len` to the byte count.
    pub fn record_bytes(&self, len: usize) {
        self.state.bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Last recorded status, or 0 if none was recorded.
    pub fn status(&self) -> u16 {
        self.state.status.load(Ordering::Relaxed)
    }

    /// Bytes of body data delivered so far.
    pub fn bytes_written(&self) -> u64 {
        self.state.bytes.load(Ordering::Relaxed)
    }

    /// Taps `response`: records its status now and counts body bytes as the
    /// transport pulls them.
    ///
    /// `guard` is kept alive exactly as long as the body, so its `Drop` runs
    /// once the body has been fully sent or abandoned.
    pub fn observe<G>(&self, response: Response, guard: G) -> Response
    where
        G: Send + Unpin + 'static,
    {
        self.record_status(response.status());
        let (parts, body) = response.into_parts();
        let tapped = ObservedBody {
            inner: body,
            observer: self.clone(),
            _guard: guard,
        };
        Response::from_parts(parts, Body::new(tapped))
    }
}

/// Body wrapper that forwards every frame unchanged and counts data bytes.
struct ObservedBody<G> {
    inner: Body,
    observer: ResponseObserver,
    _guard: G,
}

impl<G> HttpBody for ObservedBody<G>
where
    G: Unpin,
{
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        if let Poll::Ready(Some(Ok(frame))) = &polled {
            if let Some(data) = frame.data_ref() {
                this.observer.record_bytes(data.len());
            }
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
