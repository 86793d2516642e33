// Experiment Statistics

use ld_rust::ExperimentResult;
use std::path::PathBuf;
use std::time::Duration;

/// Outcome of one sweep file
#[derive(Debug, Clone)]
pub struct SweepSummary {
    pub name: String,
    pub description: Option<String>,
    pub results: Vec<ExperimentResult>,

    /// Jobs executed, failed ones included
    pub runs: usize,
    pub failed_runs: usize,

    /// Per-experiment table on disk
    pub table: PathBuf,
    pub elapsed: Duration,
}

fn show(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) if !v.is_nan() => format!("{:.*}", precision, v),
        _ => "-".to_string(),
    }
}

impl SweepSummary {
    pub fn print_summary(&self) {
        println!("\n╔════════════════════════════════════════════════════════╗");
        println!("║    SWEEP RESULTS                                       ║");
        println!("╚════════════════════════════════════════════════════════╝\n");

        println!("Sweep: {}", self.name);
        if let Some(ref desc) = self.description {
            println!("  {}", desc);
        }
        println!(
            "Runs: {} ({} failed) in {:.2}s",
            self.runs,
            self.failed_runs,
            self.elapsed.as_secs_f64()
        );
        println!();

        println!("═══ Grid Points ═══");
        println!(
            "  {:>7} {:>4} {:>12} {:>8} {:>5} {:>7} {:>7} {:>7} {:>9}",
            "devices", "gw", "topology", "period", "seeds", "pdr", "intf", "nomore", "delay_ms"
        );
        for r in &self.results {
            println!(
                "  {:>7} {:>4} {:>12} {:>8} {:>5} {:>7} {:>7} {:>7} {:>9}",
                r.point.devices,
                r.gateways,
                r.point.topology.label(),
                r.point.period_ms,
                format!("{}/{}", r.seeds_executed, r.seeds_configured),
                show(r.mean("p_received"), 4),
                show(r.mean("p_interfered"), 4),
                show(r.mean("p_no_more_receivers"), 4),
                show(r.mean("mean_delay_ms"), 1),
            );
        }
        println!();

        let anomalous: Vec<&ExperimentResult> = self
            .results
            .iter()
            .filter(|r| r.mean("anomalies").map_or(false, |a| a > 0.0))
            .collect();
        if !anomalous.is_empty() {
            println!("═══ Anomalies ═══");
            for r in anomalous {
                println!(
                    "  point {}: {} per run",
                    r.point.index,
                    show(r.mean("anomalies"), 1)
                );
            }
            println!();
        }

        let degraded: Vec<&ExperimentResult> = self
            .results
            .iter()
            .filter(|r| !r.failed_seeds.is_empty())
            .collect();
        if !degraded.is_empty() {
            println!("═══ Failed Seeds ═══");
            for r in degraded {
                println!("  point {}: seeds {:?}", r.point.index, r.failed_seeds);
            }
            println!();
        }

        println!("Table: {}", self.table.display());
    }
}
