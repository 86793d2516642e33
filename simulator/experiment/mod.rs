// Experiment Module - runs sweep configs to disk and reports them

pub mod runner;
pub mod stats;

pub use runner::ExperimentRunner;
pub use stats::SweepSummary;
