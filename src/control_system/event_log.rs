use chrono::{DateTime, Local};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One human-readable state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Monotonic sequence number, never reused within an engine instance.
    pub seq: u64,
    pub time: DateTime<Local>,
    pub message: String,
}

/// Keeps the most recent `capacity` events, oldest evicted first.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<EventRecord>,
    capacity: usize,
    next_seq: u64,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            next_seq: 0,
        }
    }

    pub fn append(&mut self, message: impl Into<String>) {
        let record = EventRecord {
            seq: self.next_seq,
            time: Local::now(),
            message: message.into(),
        };
        self.next_seq += 1;
        debug!("[event {}] {}", record.seq, record.message);
        self.entries.push_back(record);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copies the retained events, oldest first.
    pub fn to_vec(&self) -> Vec<EventRecord> {
        self.entries.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.entries.iter()
    }

    /// Drops retained entries. Sequence numbers keep counting.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
