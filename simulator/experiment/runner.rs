// Experiment Runner

use super::stats::SweepSummary;
use ld_rust::ld_export::{
    experiment_header, experiment_table_name, run_header, run_table_name, write_topology_map,
    TableWriter,
};
use ld_rust::{AlohaChannel, CompletedRun, RunSetup, SweepConfig, SweepDriver};
use log::{info, warn};
use std::fs;
use std::io;
use std::time::Instant;

/// Runs one sweep config against the reference channel and writes its tables
pub struct ExperimentRunner {
    config: SweepConfig,
}

impl ExperimentRunner {
    pub fn new(config: SweepConfig) -> Self {
        Self { config }
    }

    pub fn run(&self) -> io::Result<SweepSummary> {
        let output = &self.config.output;
        fs::create_dir_all(&output.directory)?;

        let channel = self.config.channel.clone();
        let driver = SweepDriver::new(
            self.config.grid.clone(),
            self.config.options(),
            move |_: &RunSetup| AlohaChannel::new(channel.clone()),
        );

        let started = Instant::now();
        let mut runs = 0;
        let mut failed_runs = 0;
        let mut write_error: Option<io::Error> = None;

        let results = driver.run_with(|run| {
            runs += 1;
            match &run.outcome {
                Ok(completed) => {
                    if write_error.is_some() {
                        return;
                    }
                    if let Err(e) = self.record_run(&run.setup, completed) {
                        warn!("failed to write run seed={}: {}", run.setup.seed, e);
                        write_error = Some(e);
                    }
                }
                Err(_) => failed_runs += 1,
            }
        });

        if let Some(e) = write_error {
            return Err(e);
        }

        let table = output
            .directory
            .join(experiment_table_name(&self.config.name()));
        let mut writer = TableWriter::create(&table, &output.separator, &experiment_header())?;
        for result in &results {
            writer.write_experiment(result)?;
        }
        writer.flush()?;
        info!("wrote {} rows to {}", results.len(), table.display());

        Ok(SweepSummary {
            name: self.config.name(),
            description: self.config.meta.description.clone(),
            results,
            runs,
            failed_runs,
            table,
            elapsed: started.elapsed(),
        })
    }

    fn record_run(&self, setup: &RunSetup, completed: &CompletedRun) -> io::Result<()> {
        let output = &self.config.output;
        let gateways = completed.layout.gateways.len();

        if output.per_run_table {
            let path = output.directory.join(run_table_name(setup, gateways));
            let mut table = TableWriter::append(&path, &output.separator, &run_header())?;
            table.write_run(setup, gateways, &completed.metrics)?;
        }

        if output.write_maps {
            write_topology_map(
                &output.directory,
                setup,
                &completed.layout,
                &completed.device_classes,
            )?;
        }

        Ok(())
    }
}
