use std::fmt;
use std::pin::Pin;
use std::task::{ready, Context as TaskContext, Poll};

use bytes::Buf;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;

use xray_segment::{Context, Segment};

use crate::service::{close_logged, close_logged_with_error};

pin_project! {
    /// Response body wrapper that finalizes the segment when the response is
    /// done.
    ///
    /// The transport may signal both "fully flushed" (end of stream) and
    /// "connection closed" (drop) for the same response; both funnel into the
    /// segment's idempotent close, as does a mid-stream body error. In
    /// ambient mode every poll runs under the attached context, keeping the
    /// outbound stream bound to the request's execution scope.
    #[derive(Debug)]
    pub struct SegmentBody<B> {
        #[pin]
        inner: B,
        segment: Option<Segment>,
        cx: Option<Context>,
        count_bytes: bool,
        bytes_sent: u64,
    }

    impl<B> PinnedDrop for SegmentBody<B> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if let Some(segment) = this.segment.take() {
                if *this.count_bytes {
                    segment.set_content_length(*this.bytes_sent);
                }
                close_logged(&segment);
            }
        }
    }
}

impl<B> SegmentBody<B> {
    pub(crate) fn new(
        inner: B,
        segment: Segment,
        cx: Option<Context>,
        count_bytes: bool,
    ) -> Self {
        SegmentBody {
            inner,
            segment: Some(segment),
            cx,
            count_bytes,
            bytes_sent: 0,
        }
    }
}

impl<B> Body for SegmentBody<B>
where
    B: Body,
    B::Error: fmt::Display,
{
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        task_cx: &mut TaskContext<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();

        let result = {
            let _guard = this.cx.as_ref().map(|cx| cx.clone().attach());
            ready!(this.inner.poll_frame(task_cx))
        };

        match result {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    *this.bytes_sent += data.remaining() as u64;
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(error)) => {
                if let Some(segment) = this.segment.take() {
                    if *this.count_bytes {
                        segment.set_content_length(*this.bytes_sent);
                    }
                    close_logged_with_error(&segment, &error);
                }
                Poll::Ready(Some(Err(error)))
            }
            None => {
                if let Some(segment) = this.segment.take() {
                    if *this.count_bytes {
                        segment.set_content_length(*this.bytes_sent);
                    }
                    close_logged(&segment);
                }
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
