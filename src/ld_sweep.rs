//! Experiment sweep driver
//!
//! Runs every (grid point, seed) pair with fresh per-run state and folds the
//! run metrics of each grid point into one [`ExperimentResult`]. Rows come
//! out in declared grid order whether runs execute sequentially or on the
//! rayon pool.

use std::panic::{self, AssertUnwindSafe};

use indexmap::IndexMap;
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ld_aggregator::{RunMetrics, METRIC_COLUMNS, METRIC_COUNT};
use crate::ld_interface::{NoOpSink, SimTime};
use crate::ld_run::{execute_run, CompletedRun, RunError, RunSetup, Substrate};
use crate::ld_topology::TopologySpec;

/// One swept dimension of the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Topology,
    Devices,
    Period,
}

impl Axis {
    fn slot(&self) -> usize {
        match self {
            Axis::Topology => 0,
            Axis::Devices => 1,
            Axis::Period => 2,
        }
    }
}

pub const DEFAULT_AXIS_ORDER: [Axis; 3] = [Axis::Topology, Axis::Devices, Axis::Period];

pub fn default_axis_order() -> Vec<Axis> {
    DEFAULT_AXIS_ORDER.to_vec()
}

/// Seeds `1, 4, 9, ..., r²` for `r` replications
pub fn squared_seeds(replications: u64) -> Vec<u64> {
    (1..=replications).map(|j| j * j).collect()
}

/// Cartesian parameter space; `axis_order` lists axes outermost first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterGrid {
    pub devices: Vec<usize>,
    pub topologies: Vec<TopologySpec>,
    pub periods_ms: Vec<SimTime>,
    #[serde(default)]
    pub seeds: Vec<u64>,
    #[serde(default = "default_axis_order")]
    pub axis_order: Vec<Axis>,
}

impl ParameterGrid {
    /// True when `axis_order` names each axis exactly once
    pub fn axis_order_is_valid(&self) -> bool {
        self.axis_order.len() == 3
            && DEFAULT_AXIS_ORDER
                .iter()
                .all(|axis| self.axis_order.contains(axis))
    }

    fn axis_len(&self, axis: Axis) -> usize {
        match axis {
            Axis::Topology => self.topologies.len(),
            Axis::Devices => self.devices.len(),
            Axis::Period => self.periods_ms.len(),
        }
    }

    pub fn point_count(&self) -> usize {
        DEFAULT_AXIS_ORDER.iter().map(|a| self.axis_len(*a)).product()
    }

    /// Grid points in iteration order, the last axis varying fastest
    pub fn points(&self) -> Vec<GridPoint> {
        let order: Vec<Axis> = if self.axis_order_is_valid() {
            self.axis_order.clone()
        } else {
            warn!(
                "axis_order {:?} does not name each axis once, using {:?}",
                self.axis_order, DEFAULT_AXIS_ORDER
            );
            default_axis_order()
        };
        let sizes: Vec<usize> = order.iter().map(|a| self.axis_len(*a)).collect();
        let total = self.point_count();

        let mut points = Vec::with_capacity(total);
        for index in 0..total {
            let mut rest = index;
            let mut picks = [0usize; 3];
            for (axis, size) in order.iter().zip(&sizes).rev() {
                picks[axis.slot()] = rest % size;
                rest /= size;
            }

            points.push(GridPoint {
                index,
                topology: self.topologies[picks[0]].clone(),
                devices: self.devices[picks[1]],
                period_ms: self.periods_ms[picks[2]],
            });
        }
        points
    }
}

/// One combination of swept values
#[derive(Debug, Clone, PartialEq)]
pub struct GridPoint {
    pub index: usize,
    pub devices: usize,
    pub topology: TopologySpec,
    pub period_ms: SimTime,
}

impl GridPoint {
    pub fn setup(&self, seed: u64, stop_time_ms: SimTime) -> RunSetup {
        RunSetup {
            devices: self.devices,
            topology: self.topology.clone(),
            period_ms: self.period_ms,
            stop_time_ms,
            seed,
        }
    }

    pub fn gateways(&self) -> usize {
        self.topology.build().gateway_count()
    }
}

/// Outcome of a single (grid point, seed) job
#[derive(Debug)]
pub struct SeedRun {
    pub point: usize,
    pub setup: RunSetup,
    pub outcome: Result<CompletedRun, RunError>,
}

/// Arithmetic mean over the runs actually folded in
#[derive(Debug, Clone)]
pub struct MetricsAccumulator {
    sums: [f64; METRIC_COUNT],
    executed: usize,
}

impl Default for MetricsAccumulator {
    fn default() -> Self {
        Self {
            sums: [0.0; METRIC_COUNT],
            executed: 0,
        }
    }
}

impl MetricsAccumulator {
    pub fn add(&mut self, metrics: &RunMetrics) {
        for (sum, value) in self.sums.iter_mut().zip(metrics.values()) {
            *sum += value;
        }
        self.executed += 1;
    }

    pub fn executed(&self) -> usize {
        self.executed
    }

    /// NaN in any run keeps that metric undefined for the point
    pub fn means(&self) -> [f64; METRIC_COUNT] {
        if self.executed == 0 {
            return [f64::NAN; METRIC_COUNT];
        }
        let n = self.executed as f64;
        self.sums.map(|sum| sum / n)
    }
}

/// One output row per grid point
#[derive(Debug, Clone)]
pub struct ExperimentResult {
    pub point: GridPoint,
    pub gateways: usize,
    pub seeds_configured: usize,
    pub seeds_executed: usize,
    pub failed_seeds: Vec<u64>,
    /// Averaged metrics aligned with [`METRIC_COLUMNS`]
    pub means: [f64; METRIC_COUNT],
}

impl ExperimentResult {
    pub fn mean(&self, column: &str) -> Option<f64> {
        METRIC_COLUMNS
            .iter()
            .position(|c| *c == column)
            .map(|i| self.means[i])
    }

    pub fn pdr(&self) -> f64 {
        self.mean("p_received").unwrap_or(f64::NAN)
    }
}

#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub stop_time_ms: SimTime,
    pub parallel: bool,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            stop_time_ms: 120_000,
            parallel: false,
        }
    }
}

/// Drives a grid; `factory` builds a fresh substrate for every run
pub struct SweepDriver<F> {
    grid: ParameterGrid,
    options: SweepOptions,
    factory: F,
}

impl<F, S> SweepDriver<F>
where
    F: Fn(&RunSetup) -> S + Sync,
    S: Substrate,
{
    pub fn new(grid: ParameterGrid, options: SweepOptions, factory: F) -> Self {
        Self {
            grid,
            options,
            factory,
        }
    }

    pub fn run(&self) -> Vec<ExperimentResult> {
        self.run_with(|_| {})
    }

    /// Like [`run`](Self::run), handing every finished job to `on_run` in
    /// grid order before it is folded
    pub fn run_with<C: FnMut(&SeedRun)>(&self, mut on_run: C) -> Vec<ExperimentResult> {
        let points = self.grid.points();
        let jobs: Vec<(usize, RunSetup)> = points
            .iter()
            .flat_map(|point| {
                self.grid
                    .seeds
                    .iter()
                    .map(move |&seed| (point.index, point.setup(seed, self.options.stop_time_ms)))
            })
            .collect();

        info!(
            "sweep: {} grid points x {} seeds = {} runs{}",
            points.len(),
            self.grid.seeds.len(),
            jobs.len(),
            if self.options.parallel { " (parallel)" } else { "" }
        );

        // indexed collect keeps job order
        let outcomes: Vec<Result<CompletedRun, RunError>> = if self.options.parallel {
            jobs.par_iter().map(|(_, setup)| self.execute_job(setup)).collect()
        } else {
            jobs.iter().map(|(_, setup)| self.execute_job(setup)).collect()
        };

        let mut folds: IndexMap<usize, (MetricsAccumulator, Vec<u64>)> = points
            .iter()
            .map(|p| (p.index, (MetricsAccumulator::default(), Vec::new())))
            .collect();

        for ((point, setup), outcome) in jobs.into_iter().zip(outcomes) {
            let run = SeedRun {
                point,
                setup,
                outcome,
            };
            on_run(&run);

            if let Some((acc, failed)) = folds.get_mut(&run.point) {
                match &run.outcome {
                    Ok(completed) => acc.add(&completed.metrics),
                    Err(e) => {
                        warn!("run seed={} at point {} failed: {}", run.setup.seed, point, e);
                        failed.push(run.setup.seed);
                    }
                }
            }
        }

        points
            .into_iter()
            .zip(folds.into_values())
            .map(|(point, (acc, failed_seeds))| {
                let result = ExperimentResult {
                    gateways: point.gateways(),
                    seeds_configured: self.grid.seeds.len(),
                    seeds_executed: acc.executed(),
                    failed_seeds,
                    means: acc.means(),
                    point,
                };
                info!(
                    "point {}: {} devices, {}, period {}ms, {}/{} seeds, pdr {:.4}",
                    result.point.index,
                    result.point.devices,
                    result.point.topology.label(),
                    result.point.period_ms,
                    result.seeds_executed,
                    result.seeds_configured,
                    result.pdr()
                );
                result
            })
            .collect()
    }

    fn execute_job(&self, setup: &RunSetup) -> Result<CompletedRun, RunError> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut substrate = (self.factory)(setup);
            execute_run(setup, &mut substrate, &mut NoOpSink)
        }));

        match outcome {
            Ok(result) => result,
            Err(payload) => Err(RunError::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ld_channel::AlohaChannel;
    use crate::ld_interface::{DeliveryObserver, OutcomeKind};
    use crate::ld_run::SubstrateError;
    use crate::ld_topology::Layout;
    use rand::rngs::StdRng;

    /// Sends `seed` messages, each received by every gateway.
    /// Seed 2 fails, seed 3 panics.
    struct Seeded;

    impl Substrate for Seeded {
        fn execute(
            &mut self,
            setup: &RunSetup,
            layout: &Layout,
            _rng: &mut StdRng,
            observer: &mut dyn DeliveryObserver,
        ) -> Result<(), SubstrateError> {
            match setup.seed {
                2 => return Err(SubstrateError::Failed("seed 2".to_string())),
                3 => panic!("seed 3"),
                _ => {}
            }
            let receivers = layout.gateways.len();
            for m in 0..setup.seed {
                observer.transmit(m, 0, receivers, m * 10);
                for r in 0..receivers {
                    observer.receiver_report(m, r, OutcomeKind::Received);
                }
                observer.delivered(m, m * 10 + 5);
            }
            Ok(())
        }
    }

    fn one_gateway() -> TopologySpec {
        TopologySpec::Fixed {
            gateways: vec![(0.0, 0.0)],
            radius: 1000.0,
        }
    }

    fn grid(seeds: Vec<u64>) -> ParameterGrid {
        ParameterGrid {
            devices: vec![10],
            topologies: vec![one_gateway()],
            periods_ms: vec![1000],
            seeds,
            axis_order: default_axis_order(),
        }
    }

    #[test]
    fn test_squared_seeds() {
        assert_eq!(squared_seeds(3), vec![1, 4, 9]);
        assert!(squared_seeds(0).is_empty());
    }

    #[test]
    fn test_divisor_counts_executed_seeds() {
        let driver = SweepDriver::new(grid(vec![1, 2, 3]), SweepOptions::default(), |_: &RunSetup| Seeded);
        let results = driver.run();

        assert_eq!(results.len(), 1);
        let row = &results[0];
        assert_eq!(row.seeds_configured, 3);
        assert_eq!(row.seeds_executed, 1);
        assert_eq!(row.failed_seeds, vec![2, 3]);
        // only seed 1 contributes: divided by 1, not 3
        assert_eq!(row.mean("transmitted"), Some(1.0));
        assert_eq!(row.pdr(), 1.0);
        assert_eq!(row.mean("mean_delay_ms"), Some(5.0));
    }

    #[test]
    fn test_means_across_seeds() {
        let driver = SweepDriver::new(grid(vec![4, 6]), SweepOptions::default(), |_: &RunSetup| Seeded);
        let results = driver.run();
        assert_eq!(results[0].seeds_executed, 2);
        assert_eq!(results[0].mean("transmitted"), Some(5.0));
        assert!(results[0].failed_seeds.is_empty());
    }

    #[test]
    fn test_all_seeds_failed_is_undefined() {
        let driver = SweepDriver::new(grid(vec![2]), SweepOptions::default(), |_: &RunSetup| Seeded);
        let results = driver.run();
        assert_eq!(results[0].seeds_executed, 0);
        assert!(results[0].means.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_row_order_follows_axis_order() {
        let a = one_gateway();
        let b = TopologySpec::HexRings {
            rings: 2,
            radius: 1000.0,
        };
        let mut g = ParameterGrid {
            devices: vec![10, 20],
            topologies: vec![a.clone(), b.clone()],
            periods_ms: vec![1000],
            seeds: vec![1],
            axis_order: default_axis_order(),
        };

        let order = |g: &ParameterGrid| -> Vec<(usize, TopologySpec)> {
            g.points()
                .into_iter()
                .map(|p| (p.devices, p.topology))
                .collect()
        };

        assert_eq!(
            order(&g),
            vec![(10, a.clone()), (20, a.clone()), (10, b.clone()), (20, b.clone())]
        );

        g.axis_order = vec![Axis::Devices, Axis::Topology, Axis::Period];
        assert_eq!(
            order(&g),
            vec![(10, a.clone()), (10, b.clone()), (20, a.clone()), (20, b.clone())]
        );

        let results = SweepDriver::new(g, SweepOptions::default(), |_: &RunSetup| Seeded).run();
        let indices: Vec<usize> = results.iter().map(|r| r.point.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(results[1].gateways, 7);
    }

    #[test]
    fn test_invalid_axis_order_uses_default() {
        let a = one_gateway();
        let b = TopologySpec::HexRings {
            rings: 2,
            radius: 1000.0,
        };
        let g = ParameterGrid {
            devices: vec![10, 20],
            topologies: vec![a.clone(), b.clone()],
            periods_ms: vec![1000],
            seeds: vec![1],
            axis_order: vec![Axis::Devices, Axis::Devices, Axis::Period],
        };
        assert!(!g.axis_order_is_valid());

        let order: Vec<(usize, TopologySpec)> = g
            .points()
            .into_iter()
            .map(|p| (p.devices, p.topology))
            .collect();
        assert_eq!(order, vec![(10, a.clone()), (20, a), (10, b.clone()), (20, b)]);
    }

    #[test]
    fn test_empty_axis_yields_no_rows() {
        let mut g = grid(vec![1]);
        g.periods_ms.clear();
        assert!(g.points().is_empty());
        assert!(SweepDriver::new(g, SweepOptions::default(), |_: &RunSetup| Seeded)
            .run()
            .is_empty());
    }

    #[test]
    fn test_on_run_sees_every_job_in_order() {
        let mut g = grid(vec![1, 2, 4]);
        g.devices = vec![5, 6];
        let driver = SweepDriver::new(
            g,
            SweepOptions {
                parallel: true,
                ..Default::default()
            },
            |_: &RunSetup| Seeded,
        );

        let mut seen = Vec::new();
        driver.run_with(|run| seen.push((run.point, run.setup.seed, run.outcome.is_ok())));
        assert_eq!(
            seen,
            vec![
                (0, 1, true),
                (0, 2, false),
                (0, 4, true),
                (1, 1, true),
                (1, 2, false),
                (1, 4, true),
            ]
        );
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let g = ParameterGrid {
            devices: vec![20, 60],
            topologies: vec![
                TopologySpec::HexRings {
                    rings: 1,
                    radius: 3000.0,
                },
                TopologySpec::HexRings {
                    rings: 2,
                    radius: 3000.0,
                },
            ],
            periods_ms: vec![5_000],
            seeds: squared_seeds(3),
            axis_order: default_axis_order(),
        };
        let options = SweepOptions {
            stop_time_ms: 30_000,
            parallel: false,
        };

        let sequential = SweepDriver::new(g.clone(), options.clone(), |_: &RunSetup| AlohaChannel::default()).run();
        let parallel = SweepDriver::new(
            g,
            SweepOptions {
                parallel: true,
                ..options
            },
            |_: &RunSetup| AlohaChannel::default(),
        )
        .run();

        assert_eq!(sequential.len(), 4);
        for (s, p) in sequential.iter().zip(&parallel) {
            assert_eq!(s.point, p.point);
            assert_eq!(s.means.map(f64::to_bits), p.means.map(f64::to_bits));
        }
    }
}
