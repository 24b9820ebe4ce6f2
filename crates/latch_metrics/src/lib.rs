//! Latch Metrics - event counters for the database
//!
//! Counters vanish in production builds via feature flags.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable metrics collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use latch_metrics::Counter;
//!
//! let mut counter = Counter::new();
//! counter.increment("entities_created", 1);
//! assert_eq!(counter.get("entities_created"), 1);
//! ```
//!
//! Without the `metrics` feature, [`Counter`] is a zero-sized stub whose
//! methods do nothing and whose reads return zero.

#[cfg(feature = "metrics")]
mod counter;

#[cfg(feature = "metrics")]
pub use counter::Counter;

// ============================================================================
// No-op stub when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default, Clone)]
pub struct Counter;

#[cfg(not(feature = "metrics"))]
impl Counter {
    pub fn new() -> Self { Self }
    pub fn increment(&mut self, _name: &'static str, _value: usize) {}
    pub fn get(&self, _name: &str) -> usize { 0 }
    pub fn reset_all(&mut self) {}
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, usize)> + '_ { std::iter::empty() }
}

#[cfg(test)]
mod tests {
    #[test]
    fn counter_is_available_with_or_without_metrics() {
        let mut counter = super::Counter::new();
        counter.increment("visits", 1);
        #[cfg(feature = "metrics")]
        assert_eq!(counter.get("visits"), 1);
        #[cfg(not(feature = "metrics"))]
        assert_eq!(counter.get("visits"), 0);
    }
}
