use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::emit::Emitter;
use crate::error::Error;
use crate::id::{SegmentId, TraceId};

/// Status code treated as rate limiting.
const THROTTLE_STATUS: u16 = 429;

/// Fault classification derived from an HTTP response status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusCategory {
    /// 4xx, the caller is at fault.
    Error,
    /// 5xx, the service is at fault.
    Fault,
}

/// Maps an HTTP status code to its fault category, if it has one.
pub fn categorize_status(status: u16) -> Option<StatusCategory> {
    match status {
        400..=499 => Some(StatusCategory::Error),
        500..=599 => Some(StatusCategory::Fault),
        _ => None,
    }
}

/// Incoming request data attached to a segment at open time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestData {
    /// HTTP method.
    pub method: String,
    /// Full request URL.
    pub url: String,
    /// Client address, when one could be determined.
    pub client_ip: Option<String>,
    /// User agent header value.
    pub user_agent: Option<String>,
    /// Whether `client_ip` was taken from a forwarding header rather than the
    /// transport peer.
    pub x_forwarded_for: bool,
}

/// Response data attached to a segment at finalization time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseData {
    /// Final HTTP status code.
    pub status: u16,
    /// Response content length, when known.
    pub content_length: Option<u64>,
}

/// Exception details recorded when a request cycle ends in an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cause {
    /// Rendered error message.
    pub message: String,
}

/// The recorded state of one request's trace segment.
#[derive(Clone, Debug)]
pub struct SegmentData {
    /// Segment display name.
    pub name: String,
    /// Trace this segment belongs to.
    pub trace_id: TraceId,
    /// This segment's identifier.
    pub id: SegmentId,
    /// Identifier of the upstream segment, when propagated.
    pub parent_id: Option<SegmentId>,
    /// Instant the segment was opened.
    pub start_time: SystemTime,
    /// Instant the segment was closed. `None` while open.
    pub end_time: Option<SystemTime>,
    /// Whether this segment will be handed to the emitter on close.
    pub sampled: bool,
    /// Caller-fault indicator (4xx).
    pub error: bool,
    /// Service-fault indicator (5xx or recorded exception).
    pub fault: bool,
    /// Rate-limiting indicator (429).
    pub throttled: bool,
    /// Incoming request data.
    pub request: Option<RequestData>,
    /// Response data.
    pub response: Option<ResponseData>,
    /// Exception details, when the cycle ended in an error.
    pub cause: Option<Cause>,
}

/// A handle to one request's trace segment.
///
/// Handles are cheap to clone and all clones refer to the same segment. The
/// segment is mutable until [`close`](Segment::close) runs; the first close
/// takes the recorded data and hands it to the emitter, every later mutation
/// or close is a no-op. This makes teardown idempotent under duplicate
/// completion signals.
#[derive(Clone, Debug)]
pub struct Segment {
    inner: Arc<SegmentInner>,
}

#[derive(Debug)]
struct SegmentInner {
    trace_id: TraceId,
    id: SegmentId,
    parent_id: Option<SegmentId>,
    name: String,
    sampled: bool,
    data: Mutex<Option<SegmentData>>,
    emitter: Arc<dyn Emitter>,
}

impl Segment {
    pub(crate) fn new(data: SegmentData, emitter: Arc<dyn Emitter>) -> Self {
        Segment {
            inner: Arc::new(SegmentInner {
                trace_id: data.trace_id,
                id: data.id,
                parent_id: data.parent_id,
                name: data.name.clone(),
                sampled: data.sampled,
                data: Mutex::new(Some(data)),
                emitter,
            }),
        }
    }

    /// Trace this segment belongs to.
    pub fn trace_id(&self) -> TraceId {
        self.inner.trace_id
    }

    /// This segment's identifier.
    pub fn id(&self) -> SegmentId {
        self.inner.id
    }

    /// Identifier of the upstream segment, when one was propagated.
    pub fn parent_id(&self) -> Option<SegmentId> {
        self.inner.parent_id
    }

    /// Segment display name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether this segment will be emitted on close.
    pub fn is_sampled(&self) -> bool {
        self.inner.sampled
    }

    /// Whether the segment has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner
            .data
            .lock()
            .map(|guard| guard.is_none())
            .unwrap_or(true)
    }

    /// Operate on a mutable reference to the segment data. No-op after close.
    fn with_data<T, F>(&self, f: F) -> Option<T>
    where
        F: FnOnce(&mut SegmentData) -> T,
    {
        self.inner
            .data
            .lock()
            .ok()
            .and_then(|mut guard| guard.as_mut().map(f))
    }

    /// Attaches incoming request data.
    pub fn set_request(&self, request: RequestData) {
        self.with_data(|data| data.request = Some(request));
    }

    /// Attaches response data and classifies the status code: 429 adds the
    /// throttle flag, any 4xx the error flag and any 5xx the fault flag.
    pub fn record_response(&self, status: u16, content_length: Option<u64>) {
        self.with_data(|data| {
            if status == THROTTLE_STATUS {
                data.throttled = true;
            }
            match categorize_status(status) {
                Some(StatusCategory::Error) => data.error = true,
                Some(StatusCategory::Fault) => data.fault = true,
                None => {}
            }
            data.response = Some(ResponseData {
                status,
                content_length,
            });
        });
    }

    /// Fills in the response content length when it was not known at the time
    /// the response head was recorded.
    pub fn set_content_length(&self, content_length: u64) {
        self.with_data(|data| {
            if let Some(response) = data.response.as_mut() {
                if response.content_length.is_none() {
                    response.content_length = Some(content_length);
                }
            }
        });
    }

    /// Sets the caller-fault indicator.
    pub fn add_error_flag(&self) {
        self.with_data(|data| data.error = true);
    }

    /// Sets the service-fault indicator.
    pub fn add_fault_flag(&self) {
        self.with_data(|data| data.fault = true);
    }

    /// Sets the rate-limiting indicator.
    pub fn add_throttle_flag(&self) {
        self.with_data(|data| data.throttled = true);
    }

    /// Records an exception on the segment and sets the fault flag.
    pub fn add_error<E: fmt::Display>(&self, error: E) {
        self.with_data(|data| {
            data.fault = true;
            data.cause = Some(Cause {
                message: error.to_string(),
            });
        });
    }

    /// Closes the segment.
    ///
    /// The first close wins: it stamps the end time and, when the segment is
    /// sampled, hands the data to the emitter. Closing an already closed
    /// segment is a no-op returning `Ok(())`.
    pub fn close(&self) -> Result<(), Error> {
        let mut data = match self.inner.data.lock().ok().and_then(|mut guard| guard.take()) {
            Some(data) => data,
            None => return Ok(()), // already closed
        };
        data.end_time = Some(SystemTime::now());

        if data.sampled {
            self.inner.emitter.emit(data)
        } else {
            Ok(())
        }
    }

    /// Records the given error and closes the segment, bypassing status-code
    /// classification. This is the teardown path for unhandled errors.
    pub fn close_with_error<E: fmt::Display>(&self, error: E) -> Result<(), Error> {
        self.add_error(error);
        self.close()
    }
}
