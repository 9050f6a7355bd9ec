use super::GameEvent;
use std::collections::VecDeque;

/// Bounded FIFO of recent events. Once full, every push evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct EventRing {
    events: VecDeque<GameEvent>,
    capacity: usize,
}

impl EventRing {
    /// A zero capacity is bumped to one so the most recent event is always retained.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { events: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, event: GameEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Up to `max` most recent events, oldest first.
    pub fn recent(&self, max: usize) -> Vec<GameEvent> {
        let skip = self.events.len().saturating_sub(max);
        self.events.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
