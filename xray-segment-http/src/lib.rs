//! Tower middleware that attaches an X-Ray style trace segment to every
//! inbound HTTP request and closes it exactly once when the request cycle
//! ends: on response completion, on a handler error, or on disconnect.
//!
//! The middleware is a request-lifecycle adapter: everything that makes
//! tracing hard (identifiers, sampling, emission) lives in a
//! [`Recorder`](xray_segment::Recorder) built at startup. Per request it
//!
//! 1. parses the propagated `x-amzn-trace-id` header (missing or malformed
//!    values simply mean "no propagated context"),
//! 2. opens a [`Segment`](xray_segment::Segment) named from the configured
//!    default and/or the request host, with propagated identifiers used
//!    verbatim and the sampling decision resolved (upstream directive first,
//!    local sampler otherwise),
//! 3. attaches method, URL, client address and user agent as incoming
//!    request data,
//! 4. makes the segment reachable downstream, through the ambient
//!    [`Context`](xray_segment::Context) in ambient mode or as a request
//!    extension in explicit mode, and
//! 5. finalizes it exactly once, classifying the final status code
//!    (429 throttle, 4xx error, 5xx fault) and recording response metadata.
//!
//! # Server example
//!
//! ```
//! use xray_segment::Recorder;
//! use xray_segment_http::SegmentLayer;
//!
//! let recorder = Recorder::builder().build();
//! let layer = SegmentLayer::new(recorder, "svc-A")?
//!     .with_naming_pattern("*.example.com");
//! // tower::ServiceBuilder::new().layer(layer).service(app)
//! # Ok::<(), xray_segment::Error>(())
//! ```
//!
//! # Reaching the segment from handlers
//!
//! In ambient mode (the default), handler code running inside the request's
//! task calls [`xray_segment::current_segment`]. In explicit mode the
//! segment rides on the request:
//!
//! ```
//! use http::Request;
//! use xray_segment_http::RequestSegmentExt;
//!
//! fn handler(req: &Request<()>) {
//!     if let Some(segment) = req.segment() {
//!         segment.add_error_flag();
//!     }
//! }
//! ```
//!
//! # Reporting errors the middleware cannot see
//!
//! A handler error that propagates out of the inner service is recorded and
//! closed by the middleware itself. An error *swallowed* by the host
//! framework's error handling (turned into a response before this layer sees
//! it) can still be reported by closing the segment from that error handler:
//!
//! ```
//! use xray_segment::current_segment;
//!
//! fn on_unhandled_error(error: &dyn std::error::Error) {
//!     if let Some(segment) = current_segment() {
//!         let _ = segment.close_with_error(error);
//!     }
//! }
//! ```
//!
//! The close is idempotent, so the middleware's own finalization turning up
//! later is a no-op. Tracing failures never alter the response: close errors
//! are logged at debug level and dropped.
#![warn(missing_docs, unreachable_pub)]

mod body;
mod future;
mod layer;
mod naming;
mod service;

pub use body::SegmentBody;
pub use future::ResponseFuture;
pub use layer::SegmentLayer;
pub use naming::{wildcard_match, SegmentNaming};
pub use service::SegmentService;

use xray_segment::Segment;

/// Access to the segment attached to a request in explicit propagation mode.
pub trait RequestSegmentExt {
    /// Returns the segment opened for this request, when one was attached.
    fn segment(&self) -> Option<&Segment>;
}

impl<B> RequestSegmentExt for http::Request<B> {
    fn segment(&self) -> Option<&Segment> {
        self.extensions().get::<Segment>()
    }
}
