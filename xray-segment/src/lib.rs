//! Segment data model, trace header propagation, sampling and emission
//! interfaces for X-Ray style request tracing.
//!
//! A [`Segment`] records one server-side request: its identifiers, sampling
//! decision, fault flags and HTTP metadata. Segments are created by a
//! [`Recorder`] (the process-wide, read-only configuration of sampler,
//! emitter and id source), mutated while the request is handled, and closed
//! exactly once; the first close hands the data to the configured
//! [`Emitter`].
//!
//! Propagated context arrives in an `x-amzn-trace-id` header, parsed by
//! [`TraceHeader`]; the execution-scoped [`Context`] lets nested code find
//! the current segment without explicit parameter passing.
//!
//! The request lifecycle itself (opening a segment per inbound HTTP request
//! and guaranteeing the close) is implemented by the `xray-segment-http`
//! middleware on top of this crate.
//!
//! # Getting started
//!
//! ```
//! use xray_segment::{InMemoryEmitter, Recorder, TraceHeader};
//!
//! let emitter = InMemoryEmitter::new();
//! let recorder = Recorder::builder().with_emitter(emitter.clone()).build();
//!
//! let header = TraceHeader::parse("Root=1-58406520-a006649127e371903a2de979;Sampled=1");
//! let segment = recorder.begin_segment("svc-A", &header);
//!
//! // ... handle the request ...
//! segment.record_response(200, Some(5));
//! segment.close().unwrap();
//!
//! assert_eq!(emitter.get_finished_segments().unwrap().len(), 1);
//! ```
#![warn(missing_docs, unreachable_pub, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod context;
mod emit;
mod error;
mod header;
mod id;
mod recorder;
mod sampler;
mod segment;

pub use context::{current_segment, Context, ContextGuard, FutureExt, WithContext};
pub use emit::{Emitter, InMemoryEmitter, NoopEmitter};
pub use error::Error;
pub use header::{SamplingDirective, TraceHeader, TRACE_HEADER};
#[cfg(feature = "testing")]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub use id::IncrementIdGenerator;
pub use id::{IdGenerator, ParseIdError, RandomIdGenerator, SegmentId, TraceId};
pub use recorder::{PropagationMode, Recorder, RecorderBuilder};
pub use sampler::{Sampler, ShouldSample};
pub use segment::{
    categorize_status, Cause, RequestData, ResponseData, Segment, SegmentData, StatusCategory,
};
