//! Topology generation
//!
//! Places gateways deterministically and end devices randomly (seeded).
//! Every strategy keeps the collection point at the origin.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Strategy for laying out gateways and devices of one run
pub trait TopologyStrategy {
    fn gateway_positions(&self) -> Vec<Position>;

    fn device_positions(&self, count: usize, rng: &mut StdRng) -> Vec<Position>;

    fn server_position(&self) -> Position {
        Position::default()
    }

    fn gateway_count(&self) -> usize {
        self.gateway_positions().len()
    }
}

fn uniform_disc(count: usize, radius: f64, rng: &mut StdRng) -> Vec<Position> {
    (0..count)
        .map(|_| {
            // sqrt keeps the density uniform over the area
            let r = radius * rng.gen::<f64>().sqrt();
            let theta = 2.0 * PI * rng.gen::<f64>();
            Position::new(r * theta.cos(), r * theta.sin())
        })
        .collect()
}

fn uniform_square(count: usize, width: f64, rng: &mut StdRng) -> Vec<Position> {
    let half = width / 2.0;
    (0..count)
        .map(|_| Position::new(rng.gen_range(-half..=half), rng.gen_range(-half..=half)))
        .collect()
}

// ============================================================================
// Hexagonal rings
// ============================================================================

/// Gateways on concentric hexagonal rings around the origin.
///
/// Ring 1 is the single center gateway; ring k adds 6(k-1) gateways, so
/// `rings` rings hold `3r² - 3r + 1` gateways.
#[derive(Debug, Clone)]
pub struct HexRings {
    pub rings: u32,
    pub radius: f64,
}

impl HexRings {
    pub fn gateway_count_for(rings: u32) -> usize {
        if rings == 0 {
            return 0;
        }
        let r = rings as usize;
        3 * r * r - 3 * r + 1
    }

    /// Coverage radius of a single gateway cell
    pub fn gateway_radius(&self) -> f64 {
        if self.rings == 0 {
            return self.radius;
        }
        self.radius / ((self.rings as f64 - 1.0) * 2.0 + 1.0)
    }
}

impl TopologyStrategy for HexRings {
    fn gateway_positions(&self) -> Vec<Position> {
        let n = self.rings as i64;
        let spacing = 2.0 * self.gateway_radius();
        let mut positions = Vec::with_capacity(Self::gateway_count_for(self.rings));

        // axial coordinates, hex distance from center below `rings`
        for ring in 0..n {
            for q in -ring..=ring {
                for r in -ring..=ring {
                    let s = -q - r;
                    if q.abs().max(r.abs()).max(s.abs()) != ring {
                        continue;
                    }
                    let x = spacing * (q as f64 + r as f64 / 2.0);
                    let y = spacing * (3f64.sqrt() / 2.0) * r as f64;
                    positions.push(Position::new(x, y));
                }
            }
        }
        positions
    }

    fn device_positions(&self, count: usize, rng: &mut StdRng) -> Vec<Position> {
        uniform_disc(count, self.radius, rng)
    }

    fn gateway_count(&self) -> usize {
        Self::gateway_count_for(self.rings)
    }
}

// ============================================================================
// Square grid
// ============================================================================

/// Gateways on a row-first square grid inside a `width × width` area,
/// `spacing` apart, with the outer row/column left empty.
#[derive(Debug, Clone)]
pub struct SquareGrid {
    pub width: f64,
    pub spacing: f64,
}

impl SquareGrid {
    pub fn per_side(&self) -> usize {
        if self.spacing <= 0.0 {
            return 0;
        }
        let div = (self.width / self.spacing).floor() - 1.0;
        if div < 1.0 {
            0
        } else {
            div as usize
        }
    }
}

impl TopologyStrategy for SquareGrid {
    fn gateway_positions(&self) -> Vec<Position> {
        let side = self.per_side();
        let start = -self.width / 2.0 + self.spacing;
        let mut positions = Vec::with_capacity(side * side);
        for row in 0..side {
            for col in 0..side {
                positions.push(Position::new(
                    start + col as f64 * self.spacing,
                    start + row as f64 * self.spacing,
                ));
            }
        }
        positions
    }

    fn device_positions(&self, count: usize, rng: &mut StdRng) -> Vec<Position> {
        uniform_square(count, self.width, rng)
    }

    fn gateway_count(&self) -> usize {
        let side = self.per_side();
        side * side
    }
}

// ============================================================================
// Fixed list
// ============================================================================

#[derive(Debug, Clone)]
pub struct FixedGateways {
    pub gateways: Vec<Position>,
    pub radius: f64,
}

impl TopologyStrategy for FixedGateways {
    fn gateway_positions(&self) -> Vec<Position> {
        self.gateways.clone()
    }

    fn device_positions(&self, count: usize, rng: &mut StdRng) -> Vec<Position> {
        uniform_disc(count, self.radius, rng)
    }
}

// ============================================================================
// Declarative selection
// ============================================================================

/// Serializable topology parameter, one value of the swept topology axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopologySpec {
    HexRings {
        rings: u32,
        #[serde(default = "default_radius")]
        radius: f64,
    },
    SquareGrid {
        spacing: f64,
        #[serde(default = "default_width")]
        width: f64,
    },
    Fixed {
        gateways: Vec<(f64, f64)>,
        #[serde(default = "default_radius")]
        radius: f64,
    },
}

fn default_radius() -> f64 {
    7500.0
}

fn default_width() -> f64 {
    10000.0
}

impl TopologySpec {
    pub fn build(&self) -> Box<dyn TopologyStrategy + Send + Sync> {
        match self {
            TopologySpec::HexRings { rings, radius } => Box::new(HexRings {
                rings: *rings,
                radius: *radius,
            }),
            TopologySpec::SquareGrid { spacing, width } => Box::new(SquareGrid {
                width: *width,
                spacing: *spacing,
            }),
            TopologySpec::Fixed { gateways, radius } => Box::new(FixedGateways {
                gateways: gateways.iter().map(|&(x, y)| Position::new(x, y)).collect(),
                radius: *radius,
            }),
        }
    }

    /// Stable label used in output rows and file names
    pub fn label(&self) -> String {
        match self {
            TopologySpec::HexRings { rings, .. } => format!("rings-{}", rings),
            TopologySpec::SquareGrid { spacing, .. } => format!("grid-{}", spacing),
            TopologySpec::Fixed { gateways, .. } => format!("fixed-{}", gateways.len()),
        }
    }

    /// Numeric value of the swept parameter (rings, spacing or list size)
    pub fn parameter(&self) -> f64 {
        match self {
            TopologySpec::HexRings { rings, .. } => *rings as f64,
            TopologySpec::SquareGrid { spacing, .. } => *spacing,
            TopologySpec::Fixed { gateways, .. } => gateways.len() as f64,
        }
    }
}

/// Concrete placement of one run
#[derive(Debug, Clone)]
pub struct Layout {
    pub devices: Vec<Position>,
    pub gateways: Vec<Position>,
    pub server: Position,
}

impl Layout {
    pub fn generate(strategy: &dyn TopologyStrategy, devices: usize, rng: &mut StdRng) -> Self {
        Self {
            gateways: strategy.gateway_positions(),
            devices: strategy.device_positions(devices, rng),
            server: strategy.server_position(),
        }
    }
}
