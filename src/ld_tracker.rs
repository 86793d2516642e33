// reconcile per-receiver reports into per-message outcomes

use hashbrown::HashMap;
use log::debug;

use crate::ld_interface::{DeviceId, MessageId, OutcomeKind, ReceiverIndex, TrackingError};

/// Per-receiver tallies folded from completed records
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeCounters {
    pub received: u64,
    pub interfered: u64,
    pub no_more_receivers: u64,
    pub under_sensitivity: u64,
}

impl OutcomeCounters {
    pub fn add(&mut self, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Received => self.received += 1,
            OutcomeKind::Interfered => self.interfered += 1,
            OutcomeKind::NoMoreReceivers => self.no_more_receivers += 1,
            OutcomeKind::UnderSensitivity => self.under_sensitivity += 1,
        }
    }

    pub fn get(&self, kind: OutcomeKind) -> u64 {
        match kind {
            OutcomeKind::Received => self.received,
            OutcomeKind::Interfered => self.interfered,
            OutcomeKind::NoMoreReceivers => self.no_more_receivers,
            OutcomeKind::UnderSensitivity => self.under_sensitivity,
        }
    }

    pub fn total(&self) -> u64 {
        self.received + self.interfered + self.no_more_receivers + self.under_sensitivity
    }

    pub fn merge(&mut self, other: &OutcomeCounters) {
        self.received += other.received;
        self.interfered += other.interfered;
        self.no_more_receivers += other.no_more_receivers;
        self.under_sensitivity += other.under_sensitivity;
    }
}

/// Live state of one in-flight message
#[derive(Debug, Clone)]
pub struct ReceptionRecord {
    pub sender: DeviceId,
    // indexed by receiver, None = not reported yet
    outcomes: Vec<Option<OutcomeKind>>,
    reported: usize,
}

impl ReceptionRecord {
    fn new(sender: DeviceId, receivers: usize) -> Self {
        Self {
            sender,
            outcomes: vec![None; receivers],
            reported: 0,
        }
    }

    pub fn outcomes(&self) -> &[Option<OutcomeKind>] {
        &self.outcomes
    }

    pub fn reported(&self) -> usize {
        self.reported
    }

    pub fn is_complete(&self) -> bool {
        self.reported == self.outcomes.len()
    }

    fn set(
        &mut self,
        message: MessageId,
        receiver: ReceiverIndex,
        kind: OutcomeKind,
    ) -> Result<(), TrackingError> {
        let receivers = self.outcomes.len();
        let slot = self
            .outcomes
            .get_mut(receiver)
            .ok_or(TrackingError::ReceiverOutOfRange {
                message,
                receiver,
                receivers,
            })?;

        if slot.is_some() {
            return Err(TrackingError::SlotAlreadySet { message, receiver });
        }

        *slot = Some(kind);
        self.reported += 1;
        Ok(())
    }
}

/// Summary of a record that just completed and was folded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedMessage {
    pub message: MessageId,
    pub sender: DeviceId,
    pub counts: OutcomeCounters,
}

/// Outcome tracker for one run.
///
/// A record lives from transmit until every receiver has reported. The last
/// report removes the record and folds all of its slots into the counters in
/// the same step, so a message is counted exactly once or not at all.
#[derive(Default)]
pub struct OutcomeTracker {
    records: HashMap<MessageId, ReceptionRecord>,
    counters: OutcomeCounters,
    finalized: u64,
}

impl OutcomeTracker {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            counters: OutcomeCounters::default(),
            finalized: 0,
        }
    }

    pub fn on_transmit(
        &mut self,
        message: MessageId,
        sender: DeviceId,
        receivers: usize,
    ) -> Result<(), TrackingError> {
        if self.records.contains_key(&message) {
            return Err(TrackingError::DuplicateMessage(message));
        }

        // nobody can hear it: complete on creation, nothing to fold
        if receivers == 0 {
            return Ok(());
        }

        self.records
            .insert(message, ReceptionRecord::new(sender, receivers));
        Ok(())
    }

    /// Record one receiver's outcome. Returns the folded summary when this
    /// report completed the message.
    pub fn on_receiver_report(
        &mut self,
        message: MessageId,
        receiver: ReceiverIndex,
        kind: OutcomeKind,
    ) -> Result<Option<FinalizedMessage>, TrackingError> {
        let record = self
            .records
            .get_mut(&message)
            .ok_or(TrackingError::UnknownMessage(message))?;

        record.set(message, receiver, kind)?;

        if !record.is_complete() {
            return Ok(None);
        }

        let record = self
            .records
            .remove(&message)
            .ok_or(TrackingError::UnknownMessage(message))?;
        Ok(Some(self.finalize(message, record)))
    }

    fn finalize(&mut self, message: MessageId, record: ReceptionRecord) -> FinalizedMessage {
        let mut counts = OutcomeCounters::default();
        for kind in record.outcomes.iter().flatten() {
            counts.add(*kind);
        }

        self.counters.merge(&counts);
        self.finalized += 1;

        debug!(
            "message {} from {} finalized: {} received of {}",
            message,
            record.sender,
            counts.received,
            record.outcomes.len()
        );

        FinalizedMessage {
            message,
            sender: record.sender,
            counts,
        }
    }

    pub fn counters(&self) -> &OutcomeCounters {
        &self.counters
    }

    /// Number of messages folded so far
    pub fn finalized(&self) -> u64 {
        self.finalized
    }

    /// Records still waiting for at least one receiver
    pub fn live_records(&self) -> usize {
        self.records.len()
    }

    pub fn lookup(&self, message: &MessageId) -> Option<&ReceptionRecord> {
        self.records.get(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    use OutcomeKind::*;

    #[test]
    fn test_three_receivers_mixed() {
        let mut tracker = OutcomeTracker::new();
        tracker.on_transmit(1, 10, 3).unwrap();

        // arrival order differs from receiver order
        assert_eq!(tracker.on_receiver_report(1, 2, Received).unwrap(), None);
        assert_eq!(tracker.on_receiver_report(1, 0, Received).unwrap(), None);
        assert_eq!(tracker.counters().total(), 0);

        let done = tracker.on_receiver_report(1, 1, Interfered).unwrap().unwrap();
        assert_eq!(done.sender, 10);
        assert_eq!(done.counts.received, 2);
        assert_eq!(done.counts.interfered, 1);

        assert_eq!(tracker.counters().received, 2);
        assert_eq!(tracker.counters().interfered, 1);
        assert_eq!(tracker.counters().total(), 3);
        assert_eq!(tracker.live_records(), 0);
        assert!(tracker.lookup(&1).is_none());
    }

    #[test]
    fn test_report_after_completion_is_unknown() {
        let mut tracker = OutcomeTracker::new();
        tracker.on_transmit(5, 1, 1).unwrap();
        tracker.on_receiver_report(5, 0, Received).unwrap();

        assert_eq!(
            tracker.on_receiver_report(5, 0, Received),
            Err(TrackingError::UnknownMessage(5))
        );
        assert_eq!(tracker.counters().received, 1);
    }

    #[test]
    fn test_duplicate_transmit() {
        let mut tracker = OutcomeTracker::new();
        tracker.on_transmit(1, 1, 2).unwrap();
        assert_eq!(
            tracker.on_transmit(1, 2, 2),
            Err(TrackingError::DuplicateMessage(1))
        );
        // first record untouched
        assert_eq!(tracker.lookup(&1).unwrap().sender, 1);
    }

    #[test]
    fn test_slot_already_set() {
        let mut tracker = OutcomeTracker::new();
        tracker.on_transmit(1, 1, 2).unwrap();
        tracker.on_receiver_report(1, 0, Interfered).unwrap();

        assert_eq!(
            tracker.on_receiver_report(1, 0, Received),
            Err(TrackingError::SlotAlreadySet {
                message: 1,
                receiver: 0
            })
        );
        let record = tracker.lookup(&1).unwrap();
        assert_eq!(record.reported(), 1);
        assert_eq!(record.outcomes()[0], Some(Interfered));
    }

    #[test]
    fn test_receiver_out_of_range() {
        let mut tracker = OutcomeTracker::new();
        tracker.on_transmit(1, 1, 2).unwrap();
        assert_eq!(
            tracker.on_receiver_report(1, 2, Received),
            Err(TrackingError::ReceiverOutOfRange {
                message: 1,
                receiver: 2,
                receivers: 2
            })
        );
        assert_eq!(tracker.lookup(&1).unwrap().reported(), 0);
    }

    #[test]
    fn test_zero_receivers_is_noop() {
        let mut tracker = OutcomeTracker::new();
        tracker.on_transmit(1, 1, 0).unwrap();
        assert_eq!(tracker.live_records(), 0);
        assert_eq!(tracker.counters().total(), 0);
        assert_eq!(
            tracker.on_receiver_report(1, 0, Received),
            Err(TrackingError::UnknownMessage(1))
        );
    }

    #[test]
    fn test_incomplete_record_not_counted() {
        let mut tracker = OutcomeTracker::new();
        tracker.on_transmit(1, 1, 2).unwrap();
        tracker.on_receiver_report(1, 0, Received).unwrap();

        assert_eq!(tracker.counters().total(), 0);
        assert_eq!(tracker.finalized(), 0);
        assert_eq!(tracker.live_records(), 1);
    }

    #[test]
    fn test_shuffled_reports_fold_exactly_once() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut tracker = OutcomeTracker::new();
        let receivers = 4;
        let messages = 200u64;

        let mut expected = OutcomeCounters::default();
        let mut reports = Vec::new();
        for message in 0..messages {
            tracker.on_transmit(message, message as DeviceId, receivers).unwrap();
            for receiver in 0..receivers {
                let kind = OutcomeKind::ALL[rng.gen_range(0..4)];
                expected.add(kind);
                reports.push((message, receiver, kind));
            }
        }

        // interleave reports of different messages arbitrarily
        reports.shuffle(&mut rng);

        let mut completions = 0;
        for (message, receiver, kind) in reports {
            if tracker.on_receiver_report(message, receiver, kind).unwrap().is_some() {
                completions += 1;
            }
        }

        assert_eq!(completions, messages);
        assert_eq!(tracker.finalized(), messages);
        assert_eq!(tracker.live_records(), 0);
        assert_eq!(*tracker.counters(), expected);
        assert_eq!(tracker.counters().total(), messages * receivers as u64);
    }
}
