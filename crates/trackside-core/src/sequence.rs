//! Latest-call-wins gate for independent background fetches.
//!
//! Every call takes a [`Ticket`] with a globally increasing sequence. A
//! completion is admitted only if no newer call for the same key has
//! already been delivered, so a slow stale reply can never overwrite a
//! fresher one.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket<K> {
    pub key: K,
    pub seq: u64,
}

#[derive(Debug)]
pub struct SequenceGate<K> {
    next_seq: u64,
    delivered: HashMap<K, u64>,
}

impl<K> Default for SequenceGate<K> {
    fn default() -> Self {
        Self {
            next_seq: 1,
            delivered: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> SequenceGate<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self, key: K) -> Ticket<K> {
        let seq = self.next_seq;
        self.next_seq += 1;
        Ticket { key, seq }
    }

    /// `true` if this completion should be delivered.
    pub fn admit(&mut self, ticket: &Ticket<K>) -> bool {
        match self.delivered.get(&ticket.key) {
            Some(&last) if last >= ticket.seq => false,
            _ => {
                self.delivered.insert(ticket.key.clone(), ticket.seq);
                true
            }
        }
    }

    /// Sequence of the newest delivered completion for `key`.
    pub fn last_delivered(&self, key: &K) -> Option<u64> {
        self.delivered.get(key).copied()
    }
}
