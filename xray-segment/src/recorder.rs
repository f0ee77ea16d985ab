use std::sync::Arc;
use std::time::SystemTime;

use crate::emit::{Emitter, NoopEmitter};
use crate::header::{SamplingDirective, TraceHeader};
use crate::id::{IdGenerator, RandomIdGenerator};
use crate::sampler::{Sampler, ShouldSample};
use crate::segment::{Segment, SegmentData};

/// How the segment of an in-flight request is made available to nested code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PropagationMode {
    /// The segment is bound to an execution-scoped [`Context`](crate::Context)
    /// that travels with the request's task, so nested code retrieves it via
    /// [`current_segment`](crate::current_segment) without explicit passing.
    #[default]
    Ambient,
    /// The segment is attached directly to the request object; nested code
    /// must retrieve it from there.
    Explicit,
}

/// Creates segments and holds the recording configuration.
///
/// A `Recorder` is built once at startup and read-only afterwards; clones are
/// cheap references to the same configuration. Per-request state lives
/// entirely in the [`Segment`]s it creates.
///
/// # Examples
///
/// ```
/// use xray_segment::{Recorder, Sampler, TraceHeader};
///
/// let recorder = Recorder::builder()
///     .with_sampler(Sampler::TraceIdRatio(0.05))
///     .build();
///
/// let header = TraceHeader::parse("Root=1-58406520-a006649127e371903a2de979;Sampled=1");
/// let segment = recorder.begin_segment("svc", &header);
/// assert!(segment.is_sampled());
/// segment.close().unwrap();
/// ```
#[derive(Clone, Debug)]
pub struct Recorder {
    inner: Arc<RecorderInner>,
}

#[derive(Debug)]
struct RecorderInner {
    sampler: Box<dyn ShouldSample>,
    emitter: Arc<dyn Emitter>,
    id_generator: Box<dyn IdGenerator>,
    mode: PropagationMode,
}

impl Default for Recorder {
    fn default() -> Self {
        Recorder::builder().build()
    }
}

impl Recorder {
    /// Returns a builder with the default configuration: sample everything,
    /// emit nowhere, random ids, ambient propagation.
    pub fn builder() -> RecorderBuilder {
        RecorderBuilder {
            sampler: Box::new(Sampler::AlwaysOn),
            emitter: Arc::new(NoopEmitter::new()),
            id_generator: Box::<RandomIdGenerator>::default(),
            mode: PropagationMode::default(),
        }
    }

    /// The configured propagation mode.
    pub fn propagation_mode(&self) -> PropagationMode {
        self.inner.mode
    }

    /// Whether ambient propagation is active.
    pub fn is_ambient(&self) -> bool {
        self.inner.mode == PropagationMode::Ambient
    }

    /// Opens a segment for one request cycle.
    ///
    /// Identifiers propagated in `header` are used verbatim; fresh ones are
    /// minted only where the header supplied none. A propagated `Sampled=1`
    /// or `Sampled=0` wins over the local sampler, which decides for
    /// `Sampled=?` and for requests without a directive.
    pub fn begin_segment(&self, name: impl Into<String>, header: &TraceHeader) -> Segment {
        let inner = &self.inner;
        let name = name.into();

        let trace_id = header
            .root
            .unwrap_or_else(|| inner.id_generator.new_trace_id());
        let sampled = match header.sampled {
            Some(SamplingDirective::Sampled) => true,
            Some(SamplingDirective::NotSampled) => false,
            Some(SamplingDirective::Requested) | None => {
                inner.sampler.should_sample(trace_id, &name)
            }
        };

        Segment::new(
            SegmentData {
                name,
                trace_id,
                id: inner.id_generator.new_segment_id(),
                parent_id: header.parent,
                start_time: SystemTime::now(),
                end_time: None,
                sampled,
                error: false,
                fault: false,
                throttled: false,
                request: None,
                response: None,
                cause: None,
            },
            inner.emitter.clone(),
        )
    }
}

/// Builder for [`Recorder`].
#[derive(Debug)]
pub struct RecorderBuilder {
    sampler: Box<dyn ShouldSample>,
    emitter: Arc<dyn Emitter>,
    id_generator: Box<dyn IdGenerator>,
    mode: PropagationMode,
}

impl RecorderBuilder {
    /// The local sampling strategy applied when no upstream decision is
    /// propagated.
    pub fn with_sampler<S: ShouldSample + 'static>(mut self, sampler: S) -> Self {
        self.sampler = Box::new(sampler);
        self
    }

    /// Where closed, sampled segments are handed for recording.
    pub fn with_emitter<E: Emitter + 'static>(mut self, emitter: E) -> Self {
        self.emitter = Arc::new(emitter);
        self
    }

    /// The identifier source for traces and segments.
    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, id_generator: G) -> Self {
        self.id_generator = Box::new(id_generator);
        self
    }

    /// How segments are made available to nested code.
    pub fn with_propagation_mode(mut self, mode: PropagationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Builds the configured [`Recorder`].
    pub fn build(self) -> Recorder {
        Recorder {
            inner: Arc::new(RecorderInner {
                sampler: self.sampler,
                emitter: self.emitter,
                id_generator: self.id_generator,
                mode: self.mode,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::InMemoryEmitter;

    #[test]
    fn propagated_identifiers_are_used_verbatim() {
        let recorder = Recorder::builder().build();
        let header = TraceHeader::parse(
            "Root=1-58406520-a006649127e371903a2de979;Parent=4c721bf33e3caf8f;Sampled=1",
        );

        let segment = recorder.begin_segment("svc", &header);
        assert_eq!(
            segment.trace_id().to_string(),
            "1-58406520-a006649127e371903a2de979"
        );
        assert_eq!(
            segment.parent_id().map(|id| id.to_string()),
            Some("4c721bf33e3caf8f".to_string())
        );
    }

    #[test]
    fn propagation_mode_defaults_to_ambient() {
        let recorder = Recorder::default();
        assert_eq!(recorder.propagation_mode(), PropagationMode::Ambient);
        assert!(recorder.is_ambient());

        let recorder = Recorder::builder()
            .with_propagation_mode(PropagationMode::Explicit)
            .build();
        assert_eq!(recorder.propagation_mode(), PropagationMode::Explicit);
        assert!(!recorder.is_ambient());
    }

    #[test]
    fn fresh_identifiers_without_propagated_context() {
        let recorder = Recorder::builder().build();
        let first = recorder.begin_segment("svc", &TraceHeader::default());
        let second = recorder.begin_segment("svc", &TraceHeader::default());

        assert!(first.parent_id().is_none());
        assert_ne!(first.trace_id(), second.trace_id());
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn propagated_decision_wins_over_local_sampler() {
        let recorder = Recorder::builder().with_sampler(Sampler::AlwaysOn).build();
        let not_sampled = TraceHeader::parse("Root=1-58406520-a006649127e371903a2de979;Sampled=0");
        assert!(!recorder.begin_segment("svc", &not_sampled).is_sampled());

        let recorder = Recorder::builder().with_sampler(Sampler::AlwaysOff).build();
        let sampled = TraceHeader::parse("Root=1-58406520-a006649127e371903a2de979;Sampled=1");
        assert!(recorder.begin_segment("svc", &sampled).is_sampled());
    }

    #[test]
    fn requested_decision_falls_through_to_local_sampler() {
        let recorder = Recorder::builder().with_sampler(Sampler::AlwaysOff).build();
        let requested = TraceHeader::parse("Root=1-58406520-a006649127e371903a2de979;Sampled=?");
        assert!(!recorder.begin_segment("svc", &requested).is_sampled());

        let recorder = Recorder::builder().with_sampler(Sampler::AlwaysOn).build();
        assert!(recorder.begin_segment("svc", &requested).is_sampled());
    }

    #[test]
    fn segments_reach_the_configured_emitter() {
        let emitter = InMemoryEmitter::new();
        let recorder = Recorder::builder().with_emitter(emitter.clone()).build();

        recorder
            .begin_segment("svc", &TraceHeader::default())
            .close()
            .unwrap();

        let finished = emitter.get_finished_segments().unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].name, "svc");
    }
}
