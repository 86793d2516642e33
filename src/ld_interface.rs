// all identifiers are plain integers to keep records compact and hashable
pub type MessageId = u64;
pub type DeviceId = u32;
pub type ReceiverIndex = usize;

// milliseconds since run start
pub type SimTime = u64;

pub const MILLIS_PER_SECOND: SimTime = 1_000;

/// Hands out message identities for a single run.
///
/// Identities increase monotonically and are never reused within the run;
/// a fresh allocator per run makes numeric reuse across runs harmless.
#[derive(Debug, Default)]
pub struct MessageIdAllocator {
    next: MessageId,
}

impl MessageIdAllocator {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn next_id(&mut self) -> MessageId {
        let id = self.next;
        self.next += 1;
        id
    }

    pub fn allocated(&self) -> u64 {
        self.next
    }
}

/// Per-receiver fate of one transmission
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum OutcomeKind {
    Received,
    Interfered,
    NoMoreReceivers,
    UnderSensitivity,
}

impl OutcomeKind {
    pub const ALL: [OutcomeKind; 4] = [
        OutcomeKind::Received,
        OutcomeKind::Interfered,
        OutcomeKind::NoMoreReceivers,
        OutcomeKind::UnderSensitivity,
    ];
}

/// Faults raised by the outcome tracker and the delay correlator.
///
/// None of these stop a run: the run executor counts them per kind so that
/// anomalous runs stay visible in the output tables.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackingError {
    /// Transmit issued for an identity that is still tracked
    #[error("message {0} is already tracked")]
    DuplicateMessage(MessageId),

    /// Report or delivery for an identity without a live record
    #[error("message {0} has no live record")]
    UnknownMessage(MessageId),

    /// Same receiver reported twice for one message
    #[error("receiver {receiver} already reported for message {message}")]
    SlotAlreadySet {
        message: MessageId,
        receiver: ReceiverIndex,
    },

    /// Receiver index outside of the record
    #[error("receiver {receiver} out of range for message {message} ({receivers} receivers)")]
    ReceiverOutOfRange {
        message: MessageId,
        receiver: ReceiverIndex,
        receivers: usize,
    },

    /// Delivery timestamp earlier than the transmit timestamp
    #[error("message {message} delivered at {now} before it was sent at {sent_at}")]
    ClockRegression {
        message: MessageId,
        sent_at: SimTime,
        now: SimTime,
    },
}

// ============================================================================
// Collaborator inputs
// ============================================================================

/// Callbacks emitted by the simulation substrate, in time order.
///
/// Transmit always precedes any report or delivery for the same identity;
/// nothing else about the interleaving is guaranteed.
pub trait DeliveryObserver {
    fn transmit(
        &mut self,
        message: MessageId,
        sender: DeviceId,
        receivers: usize,
        timestamp: SimTime,
    );

    fn receiver_report(&mut self, message: MessageId, receiver: ReceiverIndex, kind: OutcomeKind);

    fn delivered(&mut self, message: MessageId, timestamp: SimTime);

    /// A device wanted to send but its MAC refused (duty cycle)
    fn transmit_blocked(&mut self, _sender: DeviceId, _timestamp: SimTime) {}
}

// ============================================================================
// Event Logging System
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Message entered the tracker
    Transmitted {
        message: MessageId,
        sender: DeviceId,
        receivers: usize,
    },
    /// One receiver reported its outcome
    Reported {
        message: MessageId,
        receiver: ReceiverIndex,
        kind: OutcomeKind,
    },
    /// All receivers reported, record folded into the counters
    Finalized {
        message: MessageId,
        received: usize,
    },
    /// Message reached the collection point
    Delivered {
        message: MessageId,
        delay: SimTime,
    },
    /// Transmission refused by the device MAC
    Blocked { sender: DeviceId },
    /// Tracker or correlator rejected an input
    Anomaly { error: TrackingError },
}

pub trait EventSink {
    fn log(&mut self, time: SimTime, event: Event);
}

pub struct NoOpSink;

impl EventSink for NoOpSink {
    #[inline(always)]
    fn log(&mut self, _time: SimTime, _event: Event) {}
}

/// Keeps every event in memory for later inspection
#[derive(Default)]
pub struct CollectorSink {
    pub events: Vec<(SimTime, Event)>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn anomalies(&self) -> impl Iterator<Item = &TrackingError> {
        self.events.iter().filter_map(|(_, e)| match e {
            Event::Anomaly { error } => Some(error),
            _ => None,
        })
    }

    pub fn finalized(&self) -> usize {
        self.events
            .iter()
            .filter(|(_, e)| matches!(e, Event::Finalized { .. }))
            .count()
    }
}

impl EventSink for CollectorSink {
    fn log(&mut self, time: SimTime, event: Event) {
        self.events.push((time, event));
    }
}

/// Returns false for the not-a-number sentinel used for undefined metrics
pub fn is_defined(value: f64) -> bool {
    !value.is_nan()
}
