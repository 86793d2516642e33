//! Tabular output
//!
//! Per-run rows, per-experiment rows and topology maps. Column identity and
//! order are fixed by [`RUN_COLUMNS`], [`EXPERIMENT_COLUMNS`] and
//! [`METRIC_COLUMNS`]; the separator is configurable.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::ld_aggregator::{RunMetrics, METRIC_COLUMNS};
use crate::ld_interface::{SimTime, MILLIS_PER_SECOND};
use crate::ld_run::RunSetup;
use crate::ld_sweep::ExperimentResult;
use crate::ld_topology::Layout;

/// Leading columns of a per-run row, followed by the metric columns
pub const RUN_COLUMNS: [&str; 6] = [
    "seed",
    "devices",
    "gateways",
    "topology",
    "period_ms",
    "offered_load",
];

/// Leading columns of a per-experiment row, followed by the metric columns
pub const EXPERIMENT_COLUMNS: [&str; 7] = [
    "devices",
    "gateways",
    "topology",
    "topology_param",
    "period_ms",
    "seeds_executed",
    "seeds_failed",
];

pub const GATEWAY_MARKER: u8 = 2;
pub const SERVER_MARKER: u8 = 7;

/// Undefined metrics print as `nan`, whole numbers without decimals
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        format!("{}", value)
    }
}

fn seconds(ms: SimTime) -> String {
    format_value(ms as f64 / MILLIS_PER_SECOND as f64)
}

/// File holding the per-run rows of one (devices, topology, period) group
pub fn run_table_name(setup: &RunSetup, gateways: usize) -> String {
    format!(
        "dat-{}-{}-{}-r-{}-p{}.csv",
        setup.devices,
        seconds(setup.stop_time_ms),
        setup.topology.label(),
        gateways,
        seconds(setup.period_ms)
    )
}

pub fn experiment_table_name(sweep: &str) -> String {
    format!("exp-{}.csv", sweep)
}

fn map_name(role: &str, setup: &RunSetup, gateways: usize) -> String {
    format!(
        "{}-{}-{}-{}-r-{}-p{}.dat",
        role,
        setup.devices,
        setup.seed,
        setup.topology.label(),
        gateways,
        seconds(setup.period_ms)
    )
}

// ============================================================================
// Table writer
// ============================================================================

/// Separator-delimited table; the header goes out once, when the table is new
pub struct TableWriter<W: Write = BufWriter<File>> {
    writer: W,
    separator: String,
    columns: usize,
}

impl TableWriter {
    /// Open `path` for appending, writing the header only if the file is empty
    pub fn append<P: AsRef<Path>>(path: P, separator: &str, header: &[&str]) -> std::io::Result<Self> {
        let path = path.as_ref();
        let fresh = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        TableWriter::new(BufWriter::new(file), separator, header, fresh)
    }

    /// Truncate `path` and start a new table
    pub fn create<P: AsRef<Path>>(path: P, separator: &str, header: &[&str]) -> std::io::Result<Self> {
        let file = File::create(path)?;
        TableWriter::new(BufWriter::new(file), separator, header, true)
    }
}

impl<W: Write> TableWriter<W> {
    pub fn new(writer: W, separator: &str, header: &[&str], write_header: bool) -> std::io::Result<Self> {
        let mut table = Self {
            writer,
            separator: separator.to_string(),
            columns: header.len(),
        };
        if write_header {
            table.write_fields(header.iter().map(|h| h.to_string()))?;
        }
        Ok(table)
    }

    fn write_fields<I: IntoIterator<Item = String>>(&mut self, fields: I) -> std::io::Result<()> {
        let line: Vec<String> = fields.into_iter().collect();
        debug_assert_eq!(line.len(), self.columns);
        writeln!(self.writer, "{}", line.join(&self.separator))
    }

    pub fn write_run(&mut self, setup: &RunSetup, gateways: usize, metrics: &RunMetrics) -> std::io::Result<()> {
        let mut fields = vec![
            setup.seed.to_string(),
            setup.devices.to_string(),
            gateways.to_string(),
            setup.topology.label(),
            setup.period_ms.to_string(),
            format_value(setup.offered_load()),
        ];
        fields.extend(metrics.values().iter().map(|v| format_value(*v)));
        self.write_fields(fields)
    }

    pub fn write_experiment(&mut self, result: &ExperimentResult) -> std::io::Result<()> {
        let point = &result.point;
        let mut fields = vec![
            point.devices.to_string(),
            result.gateways.to_string(),
            point.topology.label(),
            format_value(point.topology.parameter()),
            point.period_ms.to_string(),
            result.seeds_executed.to_string(),
            result.failed_seeds.len().to_string(),
        ];
        fields.extend(result.means.iter().map(|v| format_value(*v)));
        self.write_fields(fields)
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl<W: Write> Drop for TableWriter<W> {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

pub fn run_header() -> Vec<&'static str> {
    RUN_COLUMNS.iter().chain(METRIC_COLUMNS.iter()).copied().collect()
}

pub fn experiment_header() -> Vec<&'static str> {
    EXPERIMENT_COLUMNS
        .iter()
        .chain(METRIC_COLUMNS.iter())
        .copied()
        .collect()
}

// ============================================================================
// Topology maps
// ============================================================================

/// Write device, gateway and server positions of one run to `dir`.
///
/// Devices carry their class (spreading factor), gateways marker 2 and the
/// server marker 7. Returns the three paths written.
pub fn write_topology_map(
    dir: &Path,
    setup: &RunSetup,
    layout: &Layout,
    device_classes: &[u8],
) -> std::io::Result<[PathBuf; 3]> {
    let gateways = layout.gateways.len();
    let paths = [
        dir.join(map_name("endDevices", setup, gateways)),
        dir.join(map_name("gw", setup, gateways)),
        dir.join(map_name("srv", setup, gateways)),
    ];

    let mut devices = BufWriter::new(File::create(&paths[0])?);
    for (i, p) in layout.devices.iter().enumerate() {
        let class = device_classes.get(i).copied().unwrap_or(0);
        writeln!(devices, "{} {} {}", p.x, p.y, class)?;
    }
    devices.flush()?;

    let mut gw = BufWriter::new(File::create(&paths[1])?);
    for p in &layout.gateways {
        writeln!(gw, "{} {} {}", p.x, p.y, GATEWAY_MARKER)?;
    }
    gw.flush()?;

    let mut srv = BufWriter::new(File::create(&paths[2])?);
    writeln!(srv, "{} {} {}", layout.server.x, layout.server.y, SERVER_MARKER)?;
    srv.flush()?;

    Ok(paths)
}
