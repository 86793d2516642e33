// Sweep Runner - Load and execute sweep YAML files
//
// Usage:
//   cargo run --bin sweep_runner scenarios/gateway_density.yaml
//   cargo run --bin sweep_runner scenarios/  (runs all .yaml files in directory)
//   cargo run --bin sweep_runner scenarios/period_sweep.yaml --verbose 2 --parallel

mod experiment;

use experiment::ExperimentRunner;
use ld_rust::ld_config::level_for;
use ld_rust::SweepConfig;
use simple_logger::SimpleLogger;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

struct Options {
    verbose: Option<u8>,
    parallel: bool,
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <sweep.yaml | directory/> [--verbose N] [--parallel]", args[0]);
        eprintln!("\nExamples:");
        eprintln!("  {} scenarios/gateway_density.yaml", args[0]);
        eprintln!("  {} scenarios/", args[0]);
        eprintln!("  {} scenarios/period_sweep.yaml --verbose 2 --parallel", args[0]);
        std::process::exit(1);
    }

    let options = parse_options(&args[2..]);
    let path = Path::new(&args[1]);

    let files = if path.is_file() {
        vec![path.to_path_buf()]
    } else if path.is_dir() {
        find_sweep_files(path)
    } else {
        eprintln!("Error: Path does not exist: {}", path.display());
        std::process::exit(1);
    };

    if files.is_empty() {
        eprintln!("No .yaml files found in {}", path.display());
        std::process::exit(1);
    }

    // parse every file before running any sweep
    let mut configs = Vec::with_capacity(files.len());
    for file in &files {
        match SweepConfig::load(file) {
            Ok(mut config) => {
                if options.parallel {
                    config.parallel = true;
                }
                configs.push((file.clone(), config));
            }
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        }
    }

    let verbose = options
        .verbose
        .unwrap_or_else(|| configs.iter().map(|(_, c)| c.verbose).max().unwrap_or(0));
    init_logging(verbose);

    if configs.len() > 1 {
        println!("\n╔════════════════════════════════════════════════════════╗");
        println!("║  SWEEP RUNNER - Multiple Sweeps                        ║");
        println!("╚════════════════════════════════════════════════════════╝\n");
        println!("Found {} sweep(s) to run\n", configs.len());
    }

    let total = configs.len();
    for (i, (file, config)) in configs.into_iter().enumerate() {
        println!("\n{}/{} Running: {}\n", i + 1, total, file.display());
        run_sweep(config);
    }

    if total > 1 {
        println!("\n╔════════════════════════════════════════════════════════╗");
        println!("║  All sweeps complete!                                  ║");
        println!("╚════════════════════════════════════════════════════════╝\n");
    }
}

fn parse_options(args: &[String]) -> Options {
    let mut options = Options {
        verbose: None,
        parallel: false,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--parallel" => options.parallel = true,
            "--verbose" | "-v" => {
                i += 1;
                options.verbose = args.get(i).and_then(|v| v.parse().ok());
                if options.verbose.is_none() {
                    eprintln!("--verbose expects a level between 0 and 3");
                    std::process::exit(1);
                }
            }
            other => {
                eprintln!("Unknown option: {}", other);
                std::process::exit(1);
            }
        }
        i += 1;
    }
    options
}

fn init_logging(verbose: u8) {
    if let Err(e) = SimpleLogger::new().with_level(level_for(verbose)).init() {
        eprintln!("Failed to initialise logger: {}", e);
    }
}

fn find_sweep_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let ext = path.extension().and_then(|s| s.to_str());
            if ext == Some("yaml") || ext == Some("yml") {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

fn run_sweep(config: SweepConfig) {
    println!("╔════════════════════════════════════════════════════════╗");
    let name = config.name();
    println!("║  {}{}║", name, " ".repeat(54_usize.saturating_sub(name.len())));
    println!("╚════════════════════════════════════════════════════════╝\n");

    let grid = &config.grid;
    println!("Grid:");
    println!("  Devices: {:?}", grid.devices);
    println!(
        "  Topologies: {:?}",
        grid.topologies.iter().map(|t| t.label()).collect::<Vec<_>>()
    );
    println!("  Periods (ms): {:?}", grid.periods_ms);
    println!("  Seeds: {:?}", grid.seeds);
    println!("  Axis order: {:?}", grid.axis_order);
    println!("  Stop time: {}ms, parallel: {}\n", config.stop_time_ms, config.parallel);

    let runner = ExperimentRunner::new(config);
    match runner.run() {
        Ok(summary) => summary.print_summary(),
        Err(e) => {
            eprintln!("Sweep failed: {}", e);
            std::process::exit(1);
        }
    }
}
