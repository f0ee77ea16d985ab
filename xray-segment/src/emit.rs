use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::Error;
use crate::segment::SegmentData;

/// Receives closed segments for recording.
///
/// Implementations forward segments to whatever backend records them; the
/// built-in ones stop at process boundaries. Emission runs on the request
/// task, so implementations should hand data off rather than block.
pub trait Emitter: Send + Sync + fmt::Debug {
    /// Records one closed segment.
    fn emit(&self, segment: SegmentData) -> Result<(), Error>;
}

/// An [`Emitter`] that discards every segment. This is the default.
#[derive(Clone, Debug, Default)]
pub struct NoopEmitter {
    _private: (),
}

impl NoopEmitter {
    /// Creates a new `NoopEmitter`.
    pub fn new() -> Self {
        NoopEmitter::default()
    }
}

impl Emitter for NoopEmitter {
    fn emit(&self, _segment: SegmentData) -> Result<(), Error> {
        Ok(())
    }
}

/// An [`Emitter`] that stores closed segments in memory.
///
/// Useful for tests and debugging: finished segments can be inspected with
/// [`get_finished_segments`](InMemoryEmitter::get_finished_segments).
#[derive(Clone, Debug, Default)]
pub struct InMemoryEmitter {
    segments: Arc<Mutex<Vec<SegmentData>>>,
}

impl InMemoryEmitter {
    /// Creates a new `InMemoryEmitter`.
    pub fn new() -> Self {
        InMemoryEmitter::default()
    }

    /// Returns the segments emitted so far, in emission order.
    pub fn get_finished_segments(&self) -> Result<Vec<SegmentData>, Error> {
        self.segments
            .lock()
            .map(|segments| segments.clone())
            .map_err(|_| Error::Emit("segment store lock poisoned".to_string()))
    }

    /// Clears the stored segments.
    pub fn reset(&self) {
        if let Ok(mut segments) = self.segments.lock() {
            segments.clear();
        }
    }
}

impl Emitter for InMemoryEmitter {
    fn emit(&self, segment: SegmentData) -> Result<(), Error> {
        self.segments
            .lock()
            .map(|mut segments| segments.push(segment))
            .map_err(|_| Error::Emit("segment store lock poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{SegmentId, TraceId};
    use std::time::SystemTime;

    fn segment_data(name: &str) -> SegmentData {
        SegmentData {
            name: name.to_string(),
            trace_id: TraceId::from(1),
            id: SegmentId::from(1),
            parent_id: None,
            start_time: SystemTime::now(),
            end_time: Some(SystemTime::now()),
            sampled: true,
            error: false,
            fault: false,
            throttled: false,
            request: None,
            response: None,
            cause: None,
        }
    }

    #[test]
    fn in_memory_emitter_stores_in_order() {
        let emitter = InMemoryEmitter::new();
        emitter.emit(segment_data("a")).unwrap();
        emitter.emit(segment_data("b")).unwrap();

        let finished = emitter.get_finished_segments().unwrap();
        assert_eq!(finished.len(), 2);
        assert_eq!(finished[0].name, "a");
        assert_eq!(finished[1].name, "b");

        emitter.reset();
        assert!(emitter.get_finished_segments().unwrap().is_empty());
    }
}
