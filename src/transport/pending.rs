//! In-flight probe tracking.
//!
//! The transport worker inserts an entry before it sends a probe and removes
//! it when the reply arrives or the deadline passes. Only the worker thread
//! touches the table, so it needs no lock.

use rand::Rng;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Instant;
use tokio::sync::oneshot;

use crate::state::ProbeReport;

/// Size of the ICMP sequence number space
pub const SEQUENCE_SPACE: usize = 1 << 16;

/// A probe that has been sent and is awaiting a response
#[derive(Debug)]
pub struct PendingProbe {
    /// Host name, for logging
    pub host: String,
    /// Address the reply must come from
    pub target: IpAddr,
    pub sent_at: Instant,
    pub deadline: Instant,
    /// Completion channel of the waiting caller
    pub reply: oneshot::Sender<ProbeReport>,
}

/// Result of looking up an echo reply in the table
#[derive(Debug)]
pub enum Correlation {
    /// Reply resolves this probe; the entry has been released
    Matched(PendingProbe),
    /// Sequence is in flight but the reply came from another address
    ForeignPeer,
    /// Nothing in flight under this sequence
    Unknown,
}

/// Map of pending probes keyed by ICMP sequence number
#[derive(Debug, Default)]
pub struct CorrelationTable {
    entries: HashMap<u16, PendingProbe>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, sequence: u16) -> bool {
        self.entries.contains_key(&sequence)
    }

    /// Pick a random sequence number that is not in flight
    ///
    /// Returns None only when the whole sequence space is outstanding.
    pub fn allocate<R: Rng>(&self, rng: &mut R) -> Option<u16> {
        if self.entries.len() >= SEQUENCE_SPACE {
            return None;
        }
        loop {
            let sequence: u16 = rng.r#gen();
            if !self.entries.contains_key(&sequence) {
                return Some(sequence);
            }
        }
    }

    /// Register a probe under a sequence obtained from [`allocate`](Self::allocate)
    pub fn insert(&mut self, sequence: u16, probe: PendingProbe) {
        let previous = self.entries.insert(sequence, probe);
        debug_assert!(previous.is_none(), "sequence {} already in flight", sequence);
    }

    /// Remove a probe, making its sequence available again
    pub fn release(&mut self, sequence: u16) -> Option<PendingProbe> {
        self.entries.remove(&sequence)
    }

    /// Match an echo reply against the table
    ///
    /// The entry is released only if the reply came from the probed address.
    pub fn correlate(&mut self, sequence: u16, peer: IpAddr) -> Correlation {
        match self.entries.get(&sequence) {
            None => Correlation::Unknown,
            Some(probe) if probe.target != peer => Correlation::ForeignPeer,
            Some(_) => match self.entries.remove(&sequence) {
                Some(probe) => Correlation::Matched(probe),
                None => Correlation::Unknown,
            },
        }
    }

    /// Earliest deadline among pending probes
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|p| p.deadline).min()
    }

    /// Release every probe whose deadline is at or before `now`
    pub fn take_expired(&mut self, now: Instant) -> Vec<(u16, PendingProbe)> {
        let expired: Vec<u16> = self
            .entries
            .iter()
            .filter(|(_, probe)| probe.deadline <= now)
            .map(|(sequence, _)| *sequence)
            .collect();

        expired
            .into_iter()
            .filter_map(|sequence| self.entries.remove(&sequence).map(|p| (sequence, p)))
            .collect()
    }
}
