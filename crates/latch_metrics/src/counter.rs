//! Named event counters

use std::collections::BTreeMap;

/// Running totals keyed by event name, e.g. `"entities_created"`.
#[derive(Debug, Default, Clone)]
pub struct Counter {
    counters: BTreeMap<&'static str, usize>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, name: &'static str, value: usize) {
        *self.counters.entry(name).or_insert(0) += value;
    }

    pub fn get(&self, name: &str) -> usize {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn reset_all(&mut self) {
        self.counters.clear();
    }

    /// Totals in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, usize)> + '_ {
        self.counters.iter().map(|(&name, &value)| (name, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_per_name() {
        let mut counter = Counter::new();
        counter.increment("visits", 1);
        counter.increment("visits", 2);
        counter.increment("entities_created", 5);

        assert_eq!(counter.get("visits"), 3);
        assert_eq!(counter.get("missing"), 0);
        assert_eq!(
            counter.iter().collect::<Vec<_>>(),
            vec![("entities_created", 5), ("visits", 3)]
        );

        counter.reset_all();
        assert_eq!(counter.get("visits"), 0);
    }
}
