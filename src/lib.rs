//! # ld_rust - LoRa multi-gateway delivery statistics
//!
//! Reconciles per-gateway reception reports of every transmitted message,
//! correlates transmit and delivery times at the collection point and
//! aggregates the results into per-run and per-experiment metrics over a
//! swept parameter grid.
//!
//! ## Core Components
//!
//! - **OutcomeTracker**: per-message record of receiver outcomes, folded into
//!   the counters exactly once when every receiver has reported
//! - **DelayCorrelator**: transmit timestamp table matched by deliveries
//! - **RunAggregator**: probabilities and mean delays of one run
//! - **SweepDriver**: seeded replications over a parameter grid, averaged per
//!   grid point
//!
//! ## Usage
//!
//! The radio simulation is a collaborator behind the [`Substrate`] trait; it
//! drives a [`DeliveryObserver`]. [`AlohaChannel`] is a small reference
//! implementation.
//!
//! ```no_run
//! use ld_rust::{AlohaChannel, ParameterGrid, RunSetup, SweepDriver, SweepOptions, TopologySpec};
//! use ld_rust::ld_sweep::{default_axis_order, squared_seeds};
//!
//! let grid = ParameterGrid {
//!     devices: vec![100, 200, 400],
//!     topologies: vec![TopologySpec::SquareGrid { spacing: 2500.0, width: 10000.0 }],
//!     periods_ms: vec![15_000],
//!     seeds: squared_seeds(5),
//!     axis_order: default_axis_order(),
//! };
//!
//! let driver = SweepDriver::new(grid, SweepOptions::default(), |_: &RunSetup| AlohaChannel::default());
//! for row in driver.run() {
//!     println!("{} devices: pdr {:.3}", row.point.devices, row.pdr());
//! }
//! ```
//!
//! ## Simulation
//!
//! The `sweep_runner` binary in `simulator/` runs YAML sweep files from
//! `scenarios/` and writes the result tables to disk.

// Statistics core
pub mod ld_interface;
pub mod ld_tracker;
pub mod ld_delay;
pub mod ld_aggregator;

// Runs and sweeps
pub mod ld_topology;
pub mod ld_run;
pub mod ld_sweep;

// Reference substrate
pub mod ld_channel;

// Output and configuration
pub mod ld_export;
pub mod ld_config;

// Re-export commonly used types
pub use ld_aggregator::{AnomalyCounts, RunAggregator, RunMetrics, METRIC_COLUMNS};
pub use ld_channel::{AlohaChannel, ChannelConfig};
pub use ld_config::{ConfigError, SweepConfig};
pub use ld_delay::DelayCorrelator;
pub use ld_interface::{
    DeliveryObserver, DeviceId, Event, EventSink, MessageId, NoOpSink, OutcomeKind, ReceiverIndex,
    SimTime, TrackingError,
};
pub use ld_run::{execute_run, CompletedRun, RunError, RunSetup, Substrate, SubstrateError};
pub use ld_sweep::{ExperimentResult, ParameterGrid, SweepDriver, SweepOptions};
pub use ld_topology::{Layout, TopologySpec, TopologyStrategy};
pub use ld_tracker::OutcomeTracker;
