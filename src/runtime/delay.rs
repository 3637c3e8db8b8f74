use std::collections::BTreeMap;

use tracing::trace;

use crate::lang::value::Value;
use crate::runtime::completion::Completion;

/// Timers for `sleep`, counted in scheduler ticks.
#[derive(Debug, Default)]
pub struct DelayQueue {
    now: u64,
    timers: BTreeMap<u64, Vec<Completion>>,
    /// Zero-tick sleeps; they fire once the ready queue drains, in the
    /// current tick.
    immediate: Vec<Completion>,
}

impl DelayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn schedule(&mut self, ticks: u64) -> Completion {
        let completion = Completion::new();
        if ticks == 0 {
            self.immediate.push(completion.clone());
        } else {
            self.timers
                .entry(self.now + ticks)
                .or_default()
                .push(completion.clone());
        }
        completion
    }

    /// Fire zero-tick sleeps. Returns how many woke.
    pub fn fire_immediate(&mut self) -> usize {
        let due = std::mem::take(&mut self.immediate);
        due.iter().filter(|c| c.complete(Value::Null)).count()
    }

    /// Move time forward one tick and fire every timer that is due.
    pub fn advance(&mut self) -> usize {
        self.now += 1;
        let later = self.timers.split_off(&(self.now + 1));
        let due = std::mem::replace(&mut self.timers, later);
        let fired = due
            .into_values()
            .flatten()
            .filter(|c| c.complete(Value::Null))
            .count();
        trace!(tick = self.now, fired, "delays advanced");
        fired
    }

    pub fn has_immediate(&self) -> bool {
        !self.immediate.is_empty()
    }

    /// Timers still waiting, cancelled ones included.
    pub fn pending(&self) -> usize {
        self.immediate.len() + self.timers.values().map(Vec::len).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_fires_on_its_tick() {
        let mut delays = DelayQueue::new();
        let c = delays.schedule(2);
        assert_eq!(delays.advance(), 0);
        assert!(c.is_pending());
        assert_eq!(delays.advance(), 1);
        assert!(c.is_ready());
        assert_eq!(delays.pending(), 0);
    }

    #[test]
    fn test_zero_delay_is_immediate() {
        let mut delays = DelayQueue::new();
        let c = delays.schedule(0);
        assert!(c.is_pending());
        assert!(delays.has_immediate());
        assert_eq!(delays.fire_immediate(), 1);
        assert!(c.is_ready());
    }

    #[test]
    fn test_cancelled_timer_does_not_count() {
        let mut delays = DelayQueue::new();
        let c = delays.schedule(1);
        c.cancel();
        assert_eq!(delays.advance(), 0);
    }
}
