use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context as TaskContext, Poll};

use http::{header, HeaderName, HeaderValue, Response};
use pin_project_lite::pin_project;

use xray_segment::{Context, SamplingDirective, Segment, TraceHeader, TRACE_HEADER};

use crate::body::SegmentBody;
use crate::service::{close_logged, close_logged_with_error};

pin_project! {
    /// Response future for [`SegmentService`](crate::SegmentService).
    ///
    /// Polls the inner future under the ambient context (when the recorder is
    /// in ambient mode) and converges every way the request cycle can end
    /// onto one segment close: a produced response hands the segment to
    /// [`SegmentBody`], an inner error closes it with the error recorded, and
    /// dropping the future before completion closes it with whatever state
    /// was captured by then.
    #[derive(Debug)]
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        segment: Option<Segment>,
        cx: Option<Context>,
        echo_decision: bool,
    }

    impl<F> PinnedDrop for ResponseFuture<F> {
        fn drop(this: Pin<&mut Self>) {
            // The transport tore the request down before a response was
            // produced. The close is a no-op if the segment already went to
            // the response body.
            if let Some(segment) = this.project().segment.take() {
                close_logged(&segment);
            }
        }
    }
}

impl<F> ResponseFuture<F> {
    pub(crate) fn new(
        inner: F,
        segment: Segment,
        cx: Option<Context>,
        echo_decision: bool,
    ) -> Self {
        ResponseFuture {
            inner,
            segment: Some(segment),
            cx,
            echo_decision,
        }
    }
}

impl<F, ResBody, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
    E: fmt::Display,
{
    type Output = Result<Response<SegmentBody<ResBody>>, E>;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();

        let result = {
            let _guard = this.cx.as_ref().map(|cx| cx.clone().attach());
            ready!(this.inner.poll(task_cx))
        };

        let segment = this
            .segment
            .take()
            .expect("ResponseFuture polled after completion");

        match result {
            Ok(mut res) => {
                let header_length = res
                    .headers()
                    .get(header::CONTENT_LENGTH)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse::<u64>().ok());
                segment.record_response(res.status().as_u16(), header_length);

                if *this.echo_decision {
                    set_decision_header(&mut res, &segment);
                }

                let count_body_bytes = header_length.is_none();
                let cx = this.cx.clone();
                Poll::Ready(Ok(
                    res.map(|body| SegmentBody::new(body, segment, cx, count_body_bytes))
                ))
            }
            Err(error) => {
                close_logged_with_error(&segment, &error);
                Poll::Ready(Err(error))
            }
        }
    }
}

/// Tells the requester the local sampling outcome, as asked for by an
/// inbound `Sampled=?` directive.
fn set_decision_header<B>(res: &mut Response<B>, segment: &Segment) {
    let decision = TraceHeader {
        root: Some(segment.trace_id()),
        parent: None,
        sampled: Some(if segment.is_sampled() {
            SamplingDirective::Sampled
        } else {
            SamplingDirective::NotSampled
        }),
    };
    if let Ok(value) = HeaderValue::try_from(decision.to_string()) {
        res.headers_mut()
            .insert(HeaderName::from_static(TRACE_HEADER), value);
    }
}
