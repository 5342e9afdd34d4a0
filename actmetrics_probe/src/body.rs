/**
 * `http_body::Body` decorator that stamps timing anchors and counts
 * bytes as frames flow through it — the piece that makes the
 * request-finished / first-byte / response-end anchors (spec §4.2)
 * observable without a pooling client hiding the underlying I/O.
 *
 * The same wrapper is used for both directions: around the outgoing
 * request body (`Kind::Request`, marks `request_finished` on EOF) and
 * around the incoming response body (`Kind::Response`, marks
 * `first_byte` on the first data frame and calls
 * [`RequestRecorder::complete`] on EOF).
 */
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Buf;
use http_body::{Body, Frame, SizeHint};
use pin_project::pin_project;

use crate::metrics::RequestRecorder;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Request,
    Response,
}

#[pin_project]
pub struct TimingBody<B> {
    #[pin]
    inner: B,
    recorder: Arc<RequestRecorder>,
    kind: Kind,
    first_byte_seen: bool,
}

impl<B> TimingBody<B> {
    pub fn new(inner: B, recorder: Arc<RequestRecorder>, kind: Kind) -> Self {
        Self {
            inner,
            recorder,
            kind,
            first_byte_seen: false,
        }
    }
}

impl<B> Body for TimingBody<B>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<B::Data>, B::Error>>> {
        let this = self.project();
        match this.inner.poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    let n = data.remaining() as u64;
                    match *this.kind {
                        Kind::Request => this.recorder.add_request_bytes(n),
                        Kind::Response => {
                            if !*this.first_byte_seen {
                                this.recorder.mark_first_byte();
                                *this.first_byte_seen = true;
                            }
                            this.recorder.add_response_bytes(n);
                        }
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(None) => {
                match *this.kind {
                    Kind::Request => this.recorder.mark_request_finished(),
                    Kind::Response => this.recorder.complete(),
                }
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(err))) => {
                if *this.kind == Kind::Response {
                    this.recorder.fail(err.to_string(), None);
                }
                Poll::Ready(Some(Err(err)))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
