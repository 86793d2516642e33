// Gateway Density Simulator Example
//
// Device count x square-grid gateway spacing at a fixed 15 s period.

mod experiment;

use experiment::ExperimentRunner;
use ld_rust::ld_config::{OutputConfig, SweepMeta};
use ld_rust::ld_sweep::{default_axis_order, squared_seeds};
use ld_rust::{ChannelConfig, ParameterGrid, SweepConfig, TopologySpec};
use simple_logger::SimpleLogger;
use std::path::PathBuf;

fn main() {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    println!("╔════════════════════════════════════════════════════════╗");
    println!("║    Gateway Density Simulator                           ║");
    println!("╚════════════════════════════════════════════════════════╝\n");

    let spacings = [1250.0, 1400.0, 1500.0, 1750.0, 2000.0, 2500.0];

    let config = SweepConfig {
        meta: SweepMeta {
            name: Some("gateway-density".to_string()),
            description: Some("PDR and delay vs. device count for shrinking gateway spacing".to_string()),
        },
        grid: ParameterGrid {
            devices: (0..=4).map(|i| 200 + i * 100).collect(),
            topologies: spacings
                .iter()
                .map(|&spacing| TopologySpec::SquareGrid {
                    spacing,
                    width: 10000.0,
                })
                .collect(),
            periods_ms: vec![15_000],
            seeds: squared_seeds(3),
            axis_order: default_axis_order(),
        },
        replications: None,
        stop_time_ms: 120_000,
        parallel: true,
        verbose: 1,
        output: OutputConfig {
            directory: PathBuf::from("dat/gateway-density"),
            ..Default::default()
        },
        channel: ChannelConfig::default(),
    };

    println!("Starting sweep...");
    println!("  Devices: {:?}", config.grid.devices);
    println!("  Spacings: {:?}", spacings);
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
