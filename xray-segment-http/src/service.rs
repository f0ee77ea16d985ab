use std::fmt;
use std::task::{Context as TaskContext, Poll};

use http::{header, Request, Response};
use tower::Service;

use xray_segment::{
    Context, Recorder, RequestData, SamplingDirective, Segment, TraceHeader, TRACE_HEADER,
};

use crate::body::SegmentBody;
use crate::future::ResponseFuture;
use crate::naming::SegmentNaming;

/// Middleware that wraps an inner HTTP service with segment lifecycle
/// management. Created by [`SegmentLayer`](crate::SegmentLayer).
///
/// Per request it parses the propagated trace header, opens a segment named
/// per the configured naming, binds the segment per the recorder's
/// propagation mode, and guarantees exactly one close, whether the cycle
/// ends in a response, a handler error, or a disconnect.
#[derive(Clone, Debug)]
pub struct SegmentService<S> {
    inner: S,
    recorder: Recorder,
    naming: SegmentNaming,
}

impl<S> SegmentService<S> {
    pub(crate) fn new(inner: S, recorder: Recorder, naming: SegmentNaming) -> Self {
        SegmentService {
            inner,
            recorder,
            naming,
        }
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for SegmentService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: fmt::Display,
{
    type Response = Response<SegmentBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let header = req
            .headers()
            .get(TRACE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(TraceHeader::parse)
            .unwrap_or_default();

        let host = req
            .headers()
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .or_else(|| req.uri().host());
        let name = self.naming.resolve(host);

        let segment = self.recorder.begin_segment(name, &header);
        segment.set_request(request_data(&req));

        let echo_decision = matches!(header.sampled, Some(SamplingDirective::Requested));

        let cx = if self.recorder.is_ambient() {
            Some(Context::current().with_segment(segment.clone()))
        } else {
            req.extensions_mut().insert(segment.clone());
            None
        };

        // Synchronous work in the inner `call` (routing, extractors) must
        // already observe the segment, not just the polls of its future.
        let inner = {
            let _guard = cx.clone().map(Context::attach);
            self.inner.call(req)
        };

        ResponseFuture::new(inner, segment, cx, echo_decision)
    }
}

fn request_data<B>(req: &Request<B>) -> RequestData {
    let forwarded_for = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty());

    RequestData {
        method: req.method().to_string(),
        url: req.uri().to_string(),
        x_forwarded_for: forwarded_for.is_some(),
        client_ip: forwarded_for,
        user_agent: req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    }
}

/// Closes a segment on one of the teardown paths. Failures are logged, never
/// propagated: tracing must not alter the response already owed to the
/// client.
pub(crate) fn close_logged(segment: &Segment) {
    if let Err(error) = segment.close() {
        tracing::debug!(name: "Segment.CloseFailed", error = %error);
    }
}

/// Records `error` on the segment and closes it, logging any close failure.
pub(crate) fn close_logged_with_error(segment: &Segment, error: &dyn fmt::Display) {
    if let Err(error) = segment.close_with_error(error) {
        tracing::debug!(name: "Segment.CloseFailed", error = %error);
    }
}
