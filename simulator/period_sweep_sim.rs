// Period Sweep Simulator Example
//
// Transmission period x square-grid gateway spacing with 120 devices.

mod experiment;

use experiment::ExperimentRunner;
use ld_rust::ld_config::{OutputConfig, SweepMeta};
use ld_rust::ld_sweep::{squared_seeds, Axis};
use ld_rust::{ChannelConfig, ParameterGrid, SweepConfig, TopologySpec};
use simple_logger::SimpleLogger;
use std::path::PathBuf;

fn main() {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    println!("╔════════════════════════════════════════════════════════╗");
    println!("║    Period Sweep Simulator                              ║");
    println!("╚════════════════════════════════════════════════════════╝\n");

    let periods_s = [15, 20, 30, 45, 60];

    let config = SweepConfig {
        meta: SweepMeta {
            name: Some("period-sweep".to_string()),
            description: Some("PDR and delay vs. transmission period per gateway spacing".to_string()),
        },
        grid: ParameterGrid {
            devices: vec![120],
            topologies: [1250.0, 1500.0, 2000.0, 2500.0]
                .iter()
                .map(|&spacing| TopologySpec::SquareGrid {
                    spacing,
                    width: 10000.0,
                })
                .collect(),
            periods_ms: periods_s.iter().map(|s| s * 1000).collect(),
            seeds: squared_seeds(3),
            axis_order: vec![Axis::Topology, Axis::Period, Axis::Devices],
        },
        replications: None,
        stop_time_ms: 120_000,
        parallel: true,
        verbose: 1,
        output: OutputConfig {
            directory: PathBuf::from("dat/period-sweep"),
            write_maps: true,
            ..Default::default()
        },
        // 4 receive paths per gateway
        channel: ChannelConfig {
            receive_paths: 4,
            ..Default::default()
        },
    };

    println!("Starting sweep...");
    println!("  Periods (s): {:?}", periods_s);
    println!(
        "  Topologies: {:?}",
        config.grid.topologies.iter().map(|t| t.label()).collect::<Vec<_>>()
    );
    println!("  Seeds: {:?}\n", config.grid.seeds);

    let runner = ExperimentRunner::new(config);
    match runner.run() {
        Ok(summary) => summary.print_summary(),
        Err(e) => {
            eprintln!("Sweep failed: {}", e);
            std::process::exit(1);
        }
    }

    println!("\n✓ Simulation complete!");
}
