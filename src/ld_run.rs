//! Single run execution
//!
//! Binds the callbacks of a simulation substrate to a fresh outcome tracker,
//! delay correlator and run aggregator. Nothing here is shared between runs.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::ld_aggregator::{RunAggregator, RunEnd, RunMetrics};
use crate::ld_delay::DelayCorrelator;
use crate::ld_interface::{
    DeliveryObserver, DeviceId, Event, EventSink, MessageId, OutcomeKind, ReceiverIndex, SimTime,
    TrackingError, MILLIS_PER_SECOND,
};
use crate::ld_topology::{Layout, TopologySpec};
use crate::ld_tracker::OutcomeTracker;

/// Parameters of one run: a grid point plus a seed
#[derive(Debug, Clone, PartialEq)]
pub struct RunSetup {
    pub devices: usize,
    pub topology: TopologySpec,
    pub period_ms: SimTime,
    pub stop_time_ms: SimTime,
    pub seed: u64,
}

impl RunSetup {
    pub fn gateways(&self) -> usize {
        self.topology.build().gateway_count()
    }

    /// Devices per simulated second
    pub fn offered_load(&self) -> f64 {
        if self.stop_time_ms == 0 {
            return f64::NAN;
        }
        self.devices as f64 / (self.stop_time_ms as f64 / MILLIS_PER_SECOND as f64)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SubstrateError {
    #[error("invalid run setup: {0}")]
    InvalidSetup(String),

    #[error("substrate failed: {0}")]
    Failed(String),
}

/// Why a run produced no metrics
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error(transparent)]
    Substrate(#[from] SubstrateError),

    #[error("run panicked: {0}")]
    Panicked(String),
}

/// The external simulation: radio, MAC and scheduler.
///
/// Implementations emit callbacks on `observer` in time order and return
/// once the run's stop time is reached.
pub trait Substrate {
    fn execute(
        &mut self,
        setup: &RunSetup,
        layout: &Layout,
        rng: &mut StdRng,
        observer: &mut dyn DeliveryObserver,
    ) -> Result<(), SubstrateError>;

    /// Per-device class written to topology maps (e.g. spreading factor)
    fn device_classes(&self, layout: &Layout) -> Vec<u8> {
        vec![0; layout.devices.len()]
    }
}

// ============================================================================
// Recorder
// ============================================================================

/// Owns all per-run statistics state and implements the collaborator inputs.
///
/// Tracker and correlator faults never abort the run: they are logged to the
/// sink and counted by the aggregator.
pub struct RunRecorder<'a> {
    tracker: OutcomeTracker,
    correlator: DelayCorrelator,
    aggregator: RunAggregator,
    sink: &'a mut dyn EventSink,
    now: SimTime,
}

impl<'a> RunRecorder<'a> {
    pub fn new(sink: &'a mut dyn EventSink) -> Self {
        Self {
            tracker: OutcomeTracker::new(),
            correlator: DelayCorrelator::new(),
            aggregator: RunAggregator::new(),
            sink,
            now: 0,
        }
    }

    fn anomaly(&mut self, error: TrackingError) {
        self.aggregator.record_anomaly(&error);
        self.sink.log(self.now, Event::Anomaly { error });
    }

    pub fn finish(self) -> RunMetrics {
        debug_assert_eq!(self.tracker.counters(), self.aggregator.counts());

        let end = RunEnd {
            incomplete: self.tracker.live_records(),
            undelivered: self.correlator.pending(),
        };
        if end.incomplete > 0 {
            debug!("{} messages incomplete at run end", end.incomplete);
        }
        self.aggregator.finish(end)
    }
}

impl DeliveryObserver for RunRecorder<'_> {
    fn transmit(
        &mut self,
        message: MessageId,
        sender: DeviceId,
        receivers: usize,
        timestamp: SimTime,
    ) {
        self.now = timestamp;

        if let Err(e) = self.tracker.on_transmit(message, sender, receivers) {
            self.anomaly(e);
            return;
        }
        self.aggregator.record_transmit();

        if let Err(e) = self.correlator.on_transmit(message, timestamp) {
            self.anomaly(e);
        }

        self.sink.log(
            timestamp,
            Event::Transmitted {
                message,
                sender,
                receivers,
            },
        );
    }

    fn receiver_report(&mut self, message: MessageId, receiver: ReceiverIndex, kind: OutcomeKind) {
        match self.tracker.on_receiver_report(message, receiver, kind) {
            Ok(finalized) => {
                self.sink.log(
                    self.now,
                    Event::Reported {
                        message,
                        receiver,
                        kind,
                    },
                );
                if let Some(finalized) = finalized {
                    self.aggregator.record_finalized(&finalized);
                    self.sink.log(
                        self.now,
                        Event::Finalized {
                            message,
                            received: finalized.counts.received as usize,
                        },
                    );
                }
            }
            Err(e) => self.anomaly(e),
        }
    }

    fn delivered(&mut self, message: MessageId, timestamp: SimTime) {
        self.now = timestamp;
        match self.correlator.on_delivered(message, timestamp) {
            Ok(delay) => {
                self.aggregator.record_delay(delay);
                self.sink.log(timestamp, Event::Delivered { message, delay });
            }
            Err(e) => self.anomaly(e),
        }
    }

    fn transmit_blocked(&mut self, sender: DeviceId, timestamp: SimTime) {
        self.now = timestamp;
        self.aggregator.record_blocked();
        self.sink.log(timestamp, Event::Blocked { sender });
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Everything a finished run leaves behind
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub metrics: RunMetrics,
    pub layout: Layout,
    pub device_classes: Vec<u8>,
}

/// Build the seeded RNG and the topology for a run.
///
/// Device placement consumes the RNG first, so the substrate always sees the
/// same stream for the same seed.
pub fn prepare(setup: &RunSetup) -> (StdRng, Layout) {
    let mut rng = StdRng::seed_from_u64(setup.seed);
    let strategy = setup.topology.build();
    let layout = Layout::generate(strategy.as_ref(), setup.devices, &mut rng);
    (rng, layout)
}

pub fn execute_run<S: Substrate + ?Sized>(
    setup: &RunSetup,
    substrate: &mut S,
    sink: &mut dyn EventSink,
) -> Result<CompletedRun, RunError> {
    let (mut rng, layout) = prepare(setup);

    info!(
        "run seed={} devices={} gateways={} period={}ms",
        setup.seed,
        setup.devices,
        layout.gateways.len(),
        setup.period_ms
    );

    let mut recorder = RunRecorder::new(sink);
    substrate.execute(setup, &layout, &mut rng, &mut recorder)?;
    let metrics = recorder.finish();

    debug!(
        "run seed={} done: transmitted={} pdr={:.4} anomalies={}",
        setup.seed,
        metrics.transmitted,
        metrics.pdr(),
        metrics.anomalies.total()
    );

    let device_classes = substrate.device_classes(&layout);
    Ok(CompletedRun {
        metrics,
        layout,
        device_classes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ld_interface::{CollectorSink, NoOpSink, is_defined};

    use OutcomeKind::*;

    /// Replays a fixed list of callbacks
    enum Step {
        Tx(MessageId, usize, SimTime),
        Report(MessageId, ReceiverIndex, OutcomeKind),
        Deliver(MessageId, SimTime),
        Blocked(SimTime),
    }

    struct Script {
        steps: Vec<Step>,
    }

    impl Substrate for Script {
        fn execute(
            &mut self,
            _setup: &RunSetup,
            _layout: &Layout,
            _rng: &mut StdRng,
            observer: &mut dyn DeliveryObserver,
        ) -> Result<(), SubstrateError> {
            for step in &self.steps {
                match *step {
                    Step::Tx(m, n, t) => observer.transmit(m, 0, n, t),
                    Step::Report(m, r, k) => observer.receiver_report(m, r, k),
                    Step::Deliver(m, t) => observer.delivered(m, t),
                    Step::Blocked(t) => observer.transmit_blocked(0, t),
                }
            }
            Ok(())
        }
    }

    struct Broken;

    impl Substrate for Broken {
        fn execute(
            &mut self,
            _setup: &RunSetup,
            _layout: &Layout,
            _rng: &mut StdRng,
            _observer: &mut dyn DeliveryObserver,
        ) -> Result<(), SubstrateError> {
            Err(SubstrateError::Failed("no channel".to_string()))
        }
    }

    fn setup() -> RunSetup {
        RunSetup {
            devices: 2,
            topology: TopologySpec::Fixed {
                gateways: vec![(0.0, 0.0), (100.0, 0.0), (200.0, 0.0)],
                radius: 100.0,
            },
            period_ms: 10_000,
            stop_time_ms: 100_000,
            seed: 1,
        }
    }

    #[test]
    fn test_scripted_run() {
        let mut script = Script {
            steps: vec![
                Step::Tx(0, 3, 0),
                Step::Tx(1, 3, 5),
                Step::Report(1, 0, UnderSensitivity),
                Step::Report(0, 2, Received),
                Step::Report(0, 0, Received),
                Step::Report(1, 1, NoMoreReceivers),
                Step::Report(0, 1, Interfered),
                Step::Deliver(0, 40),
                Step::Blocked(50),
            ],
        };

        let mut sink = CollectorSink::new();
        let run = execute_run(&setup(), &mut script, &mut sink).unwrap();
        let metrics = run.metrics;

        assert_eq!(metrics.transmitted, 2);
        assert_eq!(metrics.tx_blocked, 1);
        assert_eq!(metrics.counts.received, 2);
        assert_eq!(metrics.counts.interfered, 1);
        // message 1 is still waiting for receiver 2
        assert_eq!(metrics.counts.under_sensitivity, 0);
        assert_eq!(metrics.incomplete_at_end, 1);
        assert_eq!(metrics.undelivered_at_end, 1);
        assert_eq!(metrics.prob_received, 1.0);
        assert_eq!(metrics.mean_delay, 20.0);
        assert_eq!(metrics.mean_delivery_delay, 40.0);
        assert_eq!(metrics.anomalies.total(), 0);

        assert_eq!(sink.finalized(), 1);
        assert_eq!(run.layout.gateways.len(), 3);
        assert_eq!(run.device_classes, vec![0, 0]);
    }

    #[test]
    fn test_anomalies_do_not_stop_run() {
        let mut script = Script {
            steps: vec![
                Step::Tx(0, 1, 0),
                Step::Tx(0, 1, 1),
                Step::Report(0, 0, Received),
                Step::Report(0, 0, Received),
                Step::Report(9, 0, Received),
                Step::Deliver(0, 30),
                Step::Deliver(0, 31),
                Step::Tx(1, 1, 40),
                Step::Report(1, 0, Interfered),
            ],
        };

        let mut sink = CollectorSink::new();
        let metrics = execute_run(&setup(), &mut script, &mut sink).unwrap().metrics;

        assert_eq!(metrics.anomalies.duplicate_message, 1);
        assert_eq!(metrics.anomalies.unknown_message, 3);
        assert_eq!(sink.anomalies().count(), 4);

        // the run kept going after the faults
        assert_eq!(metrics.transmitted, 2);
        assert_eq!(metrics.counts.received, 1);
        assert_eq!(metrics.counts.interfered, 1);
        assert_eq!(metrics.delivered, 1);
    }

    #[test]
    fn test_empty_run() {
        let mut script = Script { steps: Vec::new() };
        let metrics = execute_run(&setup(), &mut script, &mut NoOpSink).unwrap().metrics;
        assert_eq!(metrics.transmitted, 0);
        assert!(!is_defined(metrics.pdr()));
        assert!(!is_defined(metrics.mean_delay));
    }

    #[test]
    fn test_substrate_failure() {
        let result = execute_run(&setup(), &mut Broken, &mut NoOpSink);
        assert_eq!(
            result.unwrap_err(),
            RunError::Substrate(SubstrateError::Failed("no channel".to_string()))
        );
    }

    #[test]
    fn test_offered_load() {
        let s = setup();
        assert_eq!(s.offered_load(), 0.02);
        assert_eq!(s.gateways(), 3);
    }
}
