use std::fmt;

use crate::id::TraceId;

/// The local sampling strategy interface.
///
/// The decision is made once, at segment creation, from information available
/// before any request handling runs. A propagated upstream decision takes
/// precedence and never reaches the local sampler; see
/// [`Recorder::begin_segment`](crate::Recorder::begin_segment).
pub trait ShouldSample: Send + Sync + fmt::Debug {
    /// Returns whether a segment with the given trace id and name should be
    /// recorded and emitted.
    fn should_sample(&self, trace_id: TraceId, name: &str) -> bool;
}

/// Built-in sampling strategies.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Sampler {
    /// Record every segment.
    AlwaysOn,
    /// Record no segments.
    AlwaysOff,
    /// Record a given fraction of traces. Fractions >= 1 always sample,
    /// fractions <= 0 never do. The decision is derived from the trace id, so
    /// every segment of a trace lands on the same side.
    TraceIdRatio(f64),
}

impl ShouldSample for Sampler {
    fn should_sample(&self, trace_id: TraceId, _name: &str) -> bool {
        match self {
            Sampler::AlwaysOn => true,
            Sampler::AlwaysOff => false,
            Sampler::TraceIdRatio(fraction) => sample_based_on_fraction(*fraction, trace_id),
        }
    }
}

fn sample_based_on_fraction(fraction: f64, trace_id: TraceId) -> bool {
    if fraction >= 1.0 {
        return true;
    }
    if fraction <= 0.0 {
        return false;
    }
    let threshold = (fraction * u64::MAX as f64) as u64;
    (trace_id.to_u128() as u64) < threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_samplers() {
        let id = TraceId::from(7);
        assert!(Sampler::AlwaysOn.should_sample(id, "test"));
        assert!(!Sampler::AlwaysOff.should_sample(id, "test"));
    }

    #[test]
    fn ratio_bounds() {
        let id = TraceId::from(u128::MAX);
        assert!(Sampler::TraceIdRatio(1.0).should_sample(id, "test"));
        assert!(Sampler::TraceIdRatio(1.5).should_sample(id, "test"));
        assert!(!Sampler::TraceIdRatio(0.0).should_sample(id, "test"));
        assert!(!Sampler::TraceIdRatio(-1.0).should_sample(id, "test"));
    }

    #[test]
    fn ratio_decision_is_stable_per_trace() {
        let sampler = Sampler::TraceIdRatio(0.5);
        let id = TraceId::from(42);
        let first = sampler.should_sample(id, "test");
        for _ in 0..10 {
            assert_eq!(sampler.should_sample(id, "test"), first);
        }
    }

    #[test]
    fn ratio_roughly_follows_fraction() {
        let sampler = Sampler::TraceIdRatio(0.25);
        let sampled = (0..1000u64)
            .filter(|n| {
                // spread values across the full u64 range
                let id = TraceId::from((n.wrapping_mul(0x9e3779b97f4a7c15)) as u128);
                sampler.should_sample(id, "test")
            })
            .count();
        assert!((150..350).contains(&sampled), "sampled {sampled} of 1000");
    }
}
