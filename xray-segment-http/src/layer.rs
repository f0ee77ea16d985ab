use tower::Layer;

use xray_segment::{Error, Recorder};

use crate::naming::SegmentNaming;
use crate::service::SegmentService;

/// A [`tower::Layer`] that opens a trace segment for every inbound request
/// and closes it exactly once when the request cycle ends.
///
/// Register it outermost, before route handlers, so the segment covers the
/// whole cycle. Construction validates the default segment name up front:
/// an empty name is a configuration error surfaced here, synchronously,
/// before any request is processed.
///
/// # Examples
///
/// ```
/// use xray_segment::Recorder;
/// use xray_segment_http::SegmentLayer;
///
/// let recorder = Recorder::builder().build();
/// let layer = SegmentLayer::new(recorder, "svc-A")?;
/// // let service = tower::ServiceBuilder::new().layer(layer).service(app);
/// # Ok::<(), xray_segment::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct SegmentLayer {
    recorder: Recorder,
    naming: SegmentNaming,
}

impl SegmentLayer {
    /// Creates a layer naming every segment `default_name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when `default_name` is empty or
    /// whitespace.
    pub fn new(recorder: Recorder, default_name: impl Into<String>) -> Result<Self, Error> {
        let default_name = default_name.into();
        if default_name.trim().is_empty() {
            return Err(Error::Configuration(
                "a non-empty default segment name is required".to_string(),
            ));
        }
        Ok(SegmentLayer {
            recorder,
            naming: SegmentNaming::Fixed(default_name),
        })
    }

    /// Switches to dynamic naming: requests whose `Host` matches the wildcard
    /// `pattern` are named after the host, everything else keeps the default
    /// name.
    pub fn with_naming_pattern(mut self, pattern: impl Into<String>) -> Self {
        let fallback = match self.naming {
            SegmentNaming::Fixed(name) | SegmentNaming::Dynamic { fallback: name, .. } => name,
        };
        self.naming = SegmentNaming::Dynamic {
            fallback,
            pattern: pattern.into(),
        };
        self
    }
}

impl<S> Layer<S> for SegmentLayer {
    type Service = SegmentService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SegmentService::new(inner, self.recorder.clone(), self.naming.clone())
    }
}
