//! Run-level metrics.
//!
//! The aggregator folds finalized outcome counts, matched delays and
//! anomalies for one run. Ratios whose denominator is zero are reported as
//! `f64::NAN` rather than zero so that they cannot silently drag an average
//! down.

use log::warn;

use crate::ld_interface::{OutcomeKind, SimTime, TrackingError};
use crate::ld_tracker::{FinalizedMessage, OutcomeCounters};

/// Tracker and correlator faults seen during one run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AnomalyCounts {
    pub duplicate_message: u64,
    pub unknown_message: u64,
    pub slot_already_set: u64,
    pub receiver_out_of_range: u64,
    pub clock_regression: u64,
}

impl AnomalyCounts {
    pub fn record(&mut self, error: &TrackingError) {
        match error {
            TrackingError::DuplicateMessage(_) => self.duplicate_message += 1,
            TrackingError::UnknownMessage(_) => self.unknown_message += 1,
            TrackingError::SlotAlreadySet { .. } => self.slot_already_set += 1,
            TrackingError::ReceiverOutOfRange { .. } => self.receiver_out_of_range += 1,
            TrackingError::ClockRegression { .. } => self.clock_regression += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.duplicate_message
            + self.unknown_message
            + self.slot_already_set
            + self.receiver_out_of_range
            + self.clock_regression
    }
}

/// State left behind when the run stopped
#[derive(Debug, Default, Clone, Copy)]
pub struct RunEnd {
    /// Reception records still waiting for receivers
    pub incomplete: usize,
    /// Delay entries never matched by a delivery
    pub undelivered: usize,
}

/// Final, read-only summary of one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunMetrics {
    pub transmitted: u64,
    pub tx_blocked: u64,
    pub counts: OutcomeCounters,

    // over all transmitted messages
    pub prob_received: f64,
    pub prob_interfered: f64,
    pub prob_no_more_receivers: f64,
    pub prob_under_sensitivity: f64,

    // over transmitted minus under-sensitivity
    pub cond_received: f64,
    pub cond_interfered: f64,
    pub cond_no_more_receivers: f64,

    /// Sum of matched delays over the received tally (ms)
    pub mean_delay: f64,

    pub delivered: u64,
    pub delivery_ratio: f64,
    /// Sum of matched delays over delivered messages (ms)
    pub mean_delivery_delay: f64,

    pub incomplete_at_end: u64,
    pub undelivered_at_end: u64,
    pub anomalies: AnomalyCounts,
}

pub const METRIC_COUNT: usize = 20;

/// Column names in the order produced by [`RunMetrics::values`]
pub const METRIC_COLUMNS: [&str; METRIC_COUNT] = [
    "transmitted",
    "tx_blocked",
    "received",
    "interfered",
    "no_more_receivers",
    "under_sensitivity",
    "p_received",
    "p_interfered",
    "p_no_more_receivers",
    "p_under_sensitivity",
    "p_received_above_sens",
    "p_interfered_above_sens",
    "p_no_more_receivers_above_sens",
    "mean_delay_ms",
    "delivered",
    "delivery_ratio",
    "mean_delivery_delay_ms",
    "incomplete_at_end",
    "undelivered_at_end",
    "anomalies",
];

impl RunMetrics {
    pub fn probability(&self, kind: OutcomeKind) -> f64 {
        match kind {
            OutcomeKind::Received => self.prob_received,
            OutcomeKind::Interfered => self.prob_interfered,
            OutcomeKind::NoMoreReceivers => self.prob_no_more_receivers,
            OutcomeKind::UnderSensitivity => self.prob_under_sensitivity,
        }
    }

    /// Probability conditioned on the message being above sensitivity.
    /// Undefined for `UnderSensitivity` itself.
    pub fn conditional(&self, kind: OutcomeKind) -> f64 {
        match kind {
            OutcomeKind::Received => self.cond_received,
            OutcomeKind::Interfered => self.cond_interfered,
            OutcomeKind::NoMoreReceivers => self.cond_no_more_receivers,
            OutcomeKind::UnderSensitivity => f64::NAN,
        }
    }

    /// Packet delivery ratio
    pub fn pdr(&self) -> f64 {
        self.prob_received
    }

    /// Flattened values, aligned with [`METRIC_COLUMNS`]
    pub fn values(&self) -> [f64; METRIC_COUNT] {
        [
            self.transmitted as f64,
            self.tx_blocked as f64,
            self.counts.received as f64,
            self.counts.interfered as f64,
            self.counts.no_more_receivers as f64,
            self.counts.under_sensitivity as f64,
            self.prob_received,
            self.prob_interfered,
            self.prob_no_more_receivers,
            self.prob_under_sensitivity,
            self.cond_received,
            self.cond_interfered,
            self.cond_no_more_receivers,
            self.mean_delay,
            self.delivered as f64,
            self.delivery_ratio,
            self.mean_delivery_delay,
            self.incomplete_at_end as f64,
            self.undelivered_at_end as f64,
            self.anomalies.total() as f64,
        ]
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return f64::NAN;
    }
    numerator as f64 / denominator as f64
}

/// Accumulates one run; created zeroed at run start
#[derive(Debug, Default)]
pub struct RunAggregator {
    transmitted: u64,
    tx_blocked: u64,
    counts: OutcomeCounters,
    delay_sum: u64,
    delivered: u64,
    anomalies: AnomalyCounts,
}

impl RunAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_transmit(&mut self) {
        self.transmitted += 1;
    }

    pub fn record_blocked(&mut self) {
        self.tx_blocked += 1;
    }

    pub fn record_finalized(&mut self, finalized: &FinalizedMessage) {
        self.counts.merge(&finalized.counts);
    }

    pub fn record_delay(&mut self, delay: SimTime) {
        self.delay_sum += delay;
        self.delivered += 1;
    }

    pub fn record_anomaly(&mut self, error: &TrackingError) {
        warn!("tracking anomaly: {}", error);
        self.anomalies.record(error);
    }

    pub fn counts(&self) -> &OutcomeCounters {
        &self.counts
    }

    pub fn finish(self, end: RunEnd) -> RunMetrics {
        let total = self.transmitted;
        let counts = self.counts;

        // transmitted - under_sensitivity; the latter is a per-receiver tally
        // and may exceed the per-message total on multi-gateway topologies
        let above_sensitivity = total.saturating_sub(counts.under_sensitivity);
        let conditional = |n: u64| ratio(n, above_sensitivity);

        RunMetrics {
            transmitted: total,
            tx_blocked: self.tx_blocked,
            counts,
            prob_received: ratio(counts.received, total),
            prob_interfered: ratio(counts.interfered, total),
            prob_no_more_receivers: ratio(counts.no_more_receivers, total),
            prob_under_sensitivity: ratio(counts.under_sensitivity, total),
            cond_received: conditional(counts.received),
            cond_interfered: conditional(counts.interfered),
            cond_no_more_receivers: conditional(counts.no_more_receivers),
            mean_delay: ratio(self.delay_sum, counts.received),
            delivered: self.delivered,
            delivery_ratio: ratio(self.delivered, total),
            mean_delivery_delay: ratio(self.delay_sum, self.delivered),
            incomplete_at_end: end.incomplete as u64,
            undelivered_at_end: end.undelivered as u64,
            anomalies: self.anomalies,
        }
    }
}
