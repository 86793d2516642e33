// correlate transmit time with delivery time at the collection point

use hashbrown::HashMap;

use crate::ld_interface::{MessageId, SimTime, TrackingError};

/// One entry per message that left a device and has not been delivered yet.
///
/// Keyed by the same identity space as the outcome tracker but with a
/// different cardinality: one delivery per message instead of one report
/// per (message, receiver) pair.
#[derive(Default)]
pub struct DelayCorrelator {
    pending: HashMap<MessageId, SimTime>,
}

impl DelayCorrelator {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    pub fn on_transmit(&mut self, message: MessageId, timestamp: SimTime) -> Result<(), TrackingError> {
        if self.pending.contains_key(&message) {
            return Err(TrackingError::DuplicateMessage(message));
        }
        self.pending.insert(message, timestamp);
        Ok(())
    }

    /// Consume the entry and return the end-to-end delay.
    ///
    /// The entry is removed even when the clock ran backwards, so a second
    /// delivery for the same message always reports `UnknownMessage`.
    pub fn on_delivered(&mut self, message: MessageId, now: SimTime) -> Result<SimTime, TrackingError> {
        let sent_at = self
            .pending
            .remove(&message)
            .ok_or(TrackingError::UnknownMessage(message))?;

        now.checked_sub(sent_at).ok_or(TrackingError::ClockRegression {
            message,
            sent_at,
            now,
        })
    }

    /// Messages sent but never delivered
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_round_trip() {
        let mut correlator = DelayCorrelator::new();
        correlator.on_transmit(1, 1_000).unwrap();
        assert_eq!(correlator.on_delivered(1, 1_250), Ok(250));
        assert_eq!(correlator.pending(), 0);
    }

    #[test]
    fn test_zero_delay() {
        let mut correlator = DelayCorrelator::new();
        correlator.on_transmit(1, 40).unwrap();
        assert_eq!(correlator.on_delivered(1, 40), Ok(0));
    }

    #[test]
    fn test_double_delivery() {
        let mut correlator = DelayCorrelator::new();
        correlator.on_transmit(3, 0).unwrap();
        correlator.on_delivered(3, 10).unwrap();
        assert_eq!(
            correlator.on_delivered(3, 20),
            Err(TrackingError::UnknownMessage(3))
        );
    }

    #[test]
    fn test_delivery_without_transmit() {
        let mut correlator = DelayCorrelator::new();
        assert_eq!(
            correlator.on_delivered(8, 20),
            Err(TrackingError::UnknownMessage(8))
        );
    }

    #[test]
    fn test_duplicate_transmit() {
        let mut correlator = DelayCorrelator::new();
        correlator.on_transmit(2, 5).unwrap();
        assert_eq!(
            correlator.on_transmit(2, 6),
            Err(TrackingError::DuplicateMessage(2))
        );
        // first timestamp kept
        assert_eq!(correlator.on_delivered(2, 9), Ok(4));
    }

    #[test]
    fn test_clock_regression_surfaced() {
        let mut correlator = DelayCorrelator::new();
        correlator.on_transmit(4, 100).unwrap();
        assert_eq!(
            correlator.on_delivered(4, 90),
            Err(TrackingError::ClockRegression {
                message: 4,
                sent_at: 100,
                now: 90
            })
        );
        assert_eq!(correlator.pending(), 0);
    }
}
