use std::cell::RefCell;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use futures_core::stream::Stream;
use pin_project_lite::pin_project;

use crate::segment::Segment;

thread_local! {
    static CURRENT_CONTEXT: RefCell<Context> = RefCell::new(Context::default());
}

/// An execution-scoped carrier for the current [`Segment`].
///
/// A `Context` makes the segment of the in-flight request retrievable without
/// explicit parameter passing. Contexts are immutable; adding a segment yields
/// a new context.
///
/// A context becomes current for the calling execution unit via
/// [`attach`](Context::attach), and the previous context is restored when the
/// returned [`ContextGuard`] drops. The context is not a global lookup table:
/// asynchronous work carries its context itself by being wrapped in
/// [`WithContext`], which re-attaches around every poll, so concurrent
/// requests interleaved on one thread each observe their own segment.
///
/// # Examples
///
/// ```
/// use xray_segment::{current_segment, Context, Recorder, TraceHeader};
///
/// let recorder = Recorder::builder().build();
/// let segment = recorder.begin_segment("svc", &TraceHeader::default());
///
/// {
///     let _guard = Context::current_with_segment(segment.clone()).attach();
///     assert_eq!(current_segment().map(|s| s.id()), Some(segment.id()));
/// }
///
/// // Dropping the guard restores the previous context
/// assert!(current_segment().is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct Context {
    segment: Option<Segment>,
}

impl Context {
    /// Creates an empty `Context`.
    pub fn new() -> Self {
        Context::default()
    }

    /// Returns a snapshot of the current execution unit's context.
    pub fn current() -> Self {
        Context::map_current(|cx| cx.clone())
    }

    /// Applies a function to the current context, returning its value without
    /// cloning the context itself.
    pub fn map_current<T>(f: impl FnOnce(&Context) -> T) -> T {
        CURRENT_CONTEXT.with(|cx| f(&cx.borrow()))
    }

    /// Returns a clone of the current context with the given segment set.
    pub fn current_with_segment(segment: Segment) -> Self {
        let mut cx = Context::current();
        cx.segment = Some(segment);
        cx
    }

    /// Returns a copy of this context with the given segment set.
    pub fn with_segment(&self, segment: Segment) -> Self {
        Context {
            segment: Some(segment),
        }
    }

    /// The segment carried by this context, if any.
    pub fn segment(&self) -> Option<&Segment> {
        self.segment.as_ref()
    }

    /// Replaces the current context on this execution unit with this context.
    ///
    /// Dropping the returned [`ContextGuard`] restores the previous context.
    /// A variable name is required (`let _guard = ...`); an underscore alone
    /// drops the guard immediately, restoring the previous context before the
    /// next statement runs.
    pub fn attach(self) -> ContextGuard {
        let previous_cx = CURRENT_CONTEXT
            .try_with(|current| current.replace(self))
            .ok();

        ContextGuard {
            previous_cx,
            _marker: PhantomData,
        }
    }
}

/// Returns the segment bound to the current execution scope, if any.
///
/// Only resolves inside a scope established by [`Context::attach`] or a
/// [`WithContext`]-wrapped task; it does not consult any global registry.
pub fn current_segment() -> Option<Segment> {
    Context::map_current(|cx| cx.segment().cloned())
}

/// A guard that resets the current context to the prior context when dropped.
#[allow(missing_debug_implementations)]
pub struct ContextGuard {
    previous_cx: Option<Context>,
    // ensure this type is !Send as it relies on thread locals
    _marker: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(previous_cx) = self.previous_cx.take() {
            let _ = CURRENT_CONTEXT.try_with(|current| current.replace(previous_cx));
        }
    }
}

pin_project! {
    /// A future or stream that has an associated context.
    ///
    /// The attached context is set as current for every poll, so code running
    /// inside the wrapped task observes the segment the task was created
    /// under even after the task migrates between suspension points.
    #[derive(Clone, Debug)]
    pub struct WithContext<T> {
        #[pin]
        inner: T,
        cx: Context,
    }
}

impl<T: Sized> FutureExt for T {}

impl<T: std::future::Future> std::future::Future for WithContext<T> {
    type Output = T::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.cx.clone().attach();

        this.inner.poll(task_cx)
    }
}

impl<T: Stream> Stream for WithContext<T> {
    type Item = T::Item;

    fn poll_next(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let _guard = this.cx.clone().attach();
        T::poll_next(this.inner, task_cx)
    }
}

/// Extension trait allowing futures and streams to carry a segment context.
pub trait FutureExt: Sized {
    /// Attaches the provided [`Context`] to this type, returning a
    /// [`WithContext`] wrapper.
    fn with_context(self, cx: Context) -> WithContext<Self> {
        WithContext { inner: self, cx }
    }

    /// Attaches the current [`Context`] to this type, returning a
    /// [`WithContext`] wrapper.
    fn with_current_context(self) -> WithContext<Self> {
        let cx = Context::current();
        self.with_context(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::Recorder;
    use crate::TraceHeader;

    fn test_segment(name: &str) -> Segment {
        Recorder::builder()
            .build()
            .begin_segment(name, &TraceHeader::default())
    }

    #[test]
    fn nested_contexts() {
        let outer = test_segment("outer");
        let inner = test_segment("inner");

        let _outer_guard = Context::new().with_segment(outer.clone()).attach();
        assert_eq!(current_segment().map(|s| s.id()), Some(outer.id()));

        {
            let _inner_guard = Context::current_with_segment(inner.clone()).attach();
            assert_eq!(current_segment().map(|s| s.id()), Some(inner.id()));
        }

        // Resets to the outer segment when the inner guard is dropped
        assert_eq!(current_segment().map(|s| s.id()), Some(outer.id()));
    }

    #[test]
    fn no_segment_outside_a_scope() {
        assert!(current_segment().is_none());
    }

    #[tokio::test]
    async fn with_current_context_snapshots_the_attached_scope() {
        let segment = test_segment("snapshot");
        let observed = {
            let _guard = Context::new().with_segment(segment.clone()).attach();
            async { current_segment().map(|s| s.id()) }.with_current_context()
        };
        // polled outside the guard's scope, the wrapper still carries it
        assert_eq!(observed.await, Some(segment.id()));
    }

    #[tokio::test]
    async fn with_context_propagates_across_awaits() {
        let segment = test_segment("task");
        let cx = Context::new().with_segment(segment.clone());

        let observed = async {
            let before = current_segment().map(|s| s.id());
            tokio::task::yield_now().await;
            let after = current_segment().map(|s| s.id());
            (before, after)
        }
        .with_context(cx)
        .await;

        assert_eq!(observed, (Some(segment.id()), Some(segment.id())));
        assert!(current_segment().is_none());
    }

    #[tokio::test]
    async fn with_context_wraps_streams() {
        use futures_util::StreamExt;

        let segment = test_segment("stream");
        let cx = Context::new().with_segment(segment.clone());

        let ids: Vec<_> = futures_util::stream::iter([(), ()])
            .map(|()| current_segment().map(|s| s.id()))
            .with_context(cx)
            .collect()
            .await;

        assert_eq!(ids, vec![Some(segment.id()), Some(segment.id())]);
    }
}
