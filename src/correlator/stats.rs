use std::sync::atomic::{AtomicU64, Ordering};

use super::observer::Outcome;

/// Running totals kept by a correlator.
#[derive(Debug, Default)]
pub(super) struct Counters {
    sent: AtomicU64,
    responses: AtomicU64,
    call_errors: AtomicU64,
    protocol_errors: AtomicU64,
    timeouts: AtomicU64,
    cancelled: AtomicU64,
    connection_closed: AtomicU64,
    not_sent: AtomicU64,
    orphans: AtomicU64,
}

impl Counters {
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_orphan(&self) {
        self.orphans.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record(&self, outcome: Outcome) {
        // ---
        let counter = match outcome {
            Outcome::Response => &self.responses,
            Outcome::CallError => &self.call_errors,
            Outcome::ProtocolError => &self.protocol_errors,
            Outcome::Timeout => &self.timeouts,
            Outcome::Cancelled => &self.cancelled,
            Outcome::ConnectionClosed => &self.connection_closed,
            Outcome::NotSent => &self.not_sent,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CorrelatorStats {
        // ---
        CorrelatorStats {
            sent: self.sent.load(Ordering::Relaxed),
            responses: self.responses.load(Ordering::Relaxed),
            call_errors: self.call_errors.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            connection_closed: self.connection_closed.load(Ordering::Relaxed),
            not_sent: self.not_sent.load(Ordering::Relaxed),
            orphans: self.orphans.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a correlator's counters.
///
/// Every sent request ends up in exactly one of `responses`, `call_errors`,
/// `protocol_errors`, `timeouts`, `cancelled`, `connection_closed` or
/// `not_sent`, or is still pending. `orphans` counts responses that matched nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelatorStats {
    pub sent: u64,
    pub responses: u64,
    pub call_errors: u64,
    pub protocol_errors: u64,
    pub timeouts: u64,
    pub cancelled: u64,
    pub connection_closed: u64,
    pub not_sent: u64,
    pub orphans: u64,
}

impl CorrelatorStats {
    /// Requests that reached a resolution of any kind.
    pub fn resolved(&self) -> u64 {
        self.responses
            + self.call_errors
            + self.protocol_errors
            + self.timeouts
            + self.cancelled
            + self.connection_closed
            + self.not_sent
    }
}
