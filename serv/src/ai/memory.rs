use std::collections::VecDeque;

use rand::{seq::index, Rng};

use comn::{
    entities::{BotAction, Observation},
    EntityId,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub agent: EntityId,
    pub state: Observation,
    pub action: BotAction,
    pub reward: f32,
    pub next_state: Observation,
}

/// Replay buffer with FIFO eviction.
#[derive(Debug, Clone)]
pub struct Memory {
    capacity: usize,
    entries: VecDeque<Transition>,
}

impl Memory {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "replay memory needs room for one transition");

        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add(&mut self, transition: Transition) {
        self.entries.push_back(transition);

        if self.entries.len() > self.capacity {
            self.entries.pop_front();
        }

        debug_assert!(self.entries.len() <= self.capacity);
    }

    /// Up to `k` distinct transitions chosen uniformly without replacement.
    /// Asking for more than is stored yields everything, in random order.
    pub fn sample<R: Rng>(&self, k: usize, rng: &mut R) -> Vec<&Transition> {
        let amount = k.min(self.entries.len());

        index::sample(rng, self.entries.len(), amount)
            .into_iter()
            .map(|i| &self.entries[i])
            .collect()
    }

    pub fn retain<F>(&mut self, f: F)
    where
        F: FnMut(&Transition) -> bool,
    {
        self.entries.retain(f);
    }

    pub fn purge_agent(&mut self, agent: EntityId) {
        self.retain(|transition| transition.agent != agent);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.entries.iter()
    }
}
