//! Reference simulation substrate
//!
//! A compact pure-ALOHA LoRa uplink model: periodic senders, log-distance
//! path loss, per-SF gateway sensitivity, limited gateway reception paths,
//! same-SF capture and a per-device duty cycle. The statistics engine only
//! sees its callbacks.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use log::trace;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ld_interface::{
    DeliveryObserver, DeviceId, MessageId, MessageIdAllocator, OutcomeKind, SimTime,
};
use crate::ld_run::{RunSetup, Substrate, SubstrateError};
use crate::ld_topology::{Layout, Position};

pub const MIN_SF: u8 = 7;
pub const MAX_SF: u8 = 12;

// gateway sensitivity in dBm for SF7..SF12 at 125 kHz
const GATEWAY_SENSITIVITY: [f64; 6] = [-130.0, -132.5, -135.0, -137.5, -140.0, -142.5];

/// Radio and MAC parameters of the reference channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub tx_power_dbm: f64,
    pub path_loss_exponent: f64,
    /// Path loss at the 1 m reference distance
    pub reference_loss_db: f64,
    pub bandwidth_hz: u32,
    pub payload_bytes: usize,
    pub preamble_symbols: f64,
    /// Parallel demodulation paths per gateway
    pub receive_paths: usize,
    /// Power advantage needed to survive a same-SF collision
    pub capture_margin_db: f64,
    pub duty_cycle: f64,
    /// Gateway to collection point latency
    pub backhaul_delay_ms: SimTime,
    /// Extra link budget required when choosing a spreading factor
    pub sf_margin_db: f64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            tx_power_dbm: 14.0,
            path_loss_exponent: 3.76,
            reference_loss_db: 7.7,
            bandwidth_hz: 125_000,
            payload_bytes: 20,
            preamble_symbols: 8.0,
            receive_paths: 8,
            capture_margin_db: 6.0,
            duty_cycle: 0.01,
            backhaul_delay_ms: 10,
            sf_margin_db: 0.0,
        }
    }
}

impl ChannelConfig {
    pub fn path_loss(&self, distance: f64) -> f64 {
        if distance < 1.0 {
            return self.reference_loss_db;
        }
        self.reference_loss_db + 10.0 * self.path_loss_exponent * distance.log10()
    }

    pub fn rx_power(&self, from: &Position, to: &Position) -> f64 {
        self.tx_power_dbm - self.path_loss(from.distance(to))
    }

    pub fn sensitivity(sf: u8) -> f64 {
        let sf = sf.clamp(MIN_SF, MAX_SF);
        GATEWAY_SENSITIVITY[(sf - MIN_SF) as usize]
    }

    /// Smallest spreading factor whose sensitivity the best gateway clears
    pub fn spreading_factor(&self, device: &Position, gateways: &[Position]) -> u8 {
        let best = gateways
            .iter()
            .map(|g| self.rx_power(device, g))
            .fold(f64::NEG_INFINITY, f64::max);

        (MIN_SF..=MAX_SF)
            .find(|&sf| best - self.sf_margin_db >= Self::sensitivity(sf))
            .unwrap_or(MAX_SF)
    }

    /// LoRa time on air in milliseconds (explicit header, CRC on, CR 4/5)
    pub fn air_time_ms(&self, sf: u8) -> SimTime {
        let symbol = 2f64.powi(sf as i32) / self.bandwidth_hz as f64;
        let preamble = (self.preamble_symbols + 4.25) * symbol;

        // low data rate optimisation above 16 ms symbols
        let de = if symbol >= 0.016 { 1.0 } else { 0.0 };
        let sf = sf as f64;
        let numerator = 8.0 * self.payload_bytes as f64 - 4.0 * sf + 28.0 + 16.0;
        let base = (numerator / (4.0 * (sf - 2.0 * de))).ceil().max(0.0);
        let payload = 8.0 + base * 5.0;

        ((preamble + payload * symbol) * 1000.0).ceil() as SimTime
    }
}

// ============================================================================
// Event queue
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelEvent {
    Send { device: usize },
    TxEnd { tx: usize },
    Deliver { message: MessageId },
}

#[derive(Debug, PartialEq, Eq)]
struct Scheduled {
    time: SimTime,
    seq: u64,
    event: ChannelEvent,
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // min-heap on (time, insertion order)
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct EventQueue {
    heap: BinaryHeap<Scheduled>,
    seq: u64,
}

impl EventQueue {
    fn push(&mut self, time: SimTime, event: ChannelEvent) {
        self.seq += 1;
        self.heap.push(Scheduled {
            time,
            seq: self.seq,
            event,
        });
    }

    fn pop(&mut self) -> Option<Scheduled> {
        self.heap.pop()
    }
}

// ============================================================================
// Channel state
// ============================================================================

struct Transmission {
    message: MessageId,
    sf: u8,
    // UnderSensitivity or NoMoreReceivers, decided when the preamble arrives
    lost: Vec<Option<OutcomeKind>>,
    interfered: Vec<bool>,
    holds_path: Vec<bool>,
}

#[derive(Default)]
struct GatewayState {
    // above-sensitivity arrivals currently on air: (tx, sf, power)
    on_air: Vec<(usize, u8, f64)>,
    busy_paths: usize,
}

/// Reference substrate, see module docs
pub struct AlohaChannel {
    config: ChannelConfig,
}

impl AlohaChannel {
    pub fn new(config: ChannelConfig) -> Self {
        Self { config }
    }
}

impl Default for AlohaChannel {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}

impl Substrate for AlohaChannel {
    fn execute(
        &mut self,
        setup: &RunSetup,
        layout: &Layout,
        rng: &mut StdRng,
        observer: &mut dyn DeliveryObserver,
    ) -> Result<(), SubstrateError> {
        if setup.period_ms == 0 {
            return Err(SubstrateError::InvalidSetup("period must be positive".to_string()));
        }
        if !(self.config.duty_cycle > 0.0 && self.config.duty_cycle <= 1.0) {
            return Err(SubstrateError::InvalidSetup(format!(
                "duty cycle {} outside (0, 1]",
                self.config.duty_cycle
            )));
        }

        let config = &self.config;
        let n_gw = layout.gateways.len();
        let stop = setup.stop_time_ms;

        let sfs: Vec<u8> = layout
            .devices
            .iter()
            .map(|d| config.spreading_factor(d, &layout.gateways))
            .collect();

        let mut queue = EventQueue::default();
        let mut ids = MessageIdAllocator::new();
        let mut next_allowed: Vec<SimTime> = vec![0; layout.devices.len()];
        let mut gateways: Vec<GatewayState> = (0..n_gw).map(|_| GatewayState::default()).collect();
        let mut transmissions: Vec<Transmission> = Vec::new();

        for device in 0..layout.devices.len() {
            let phase = rng.gen_range(0..setup.period_ms);
            if phase < stop {
                queue.push(phase, ChannelEvent::Send { device });
            }
        }

        while let Some(Scheduled { time, event, .. }) = queue.pop() {
            if time > stop {
                break;
            }

            match event {
                ChannelEvent::Send { device } => {
                    let next = time + setup.period_ms;
                    if next < stop {
                        queue.push(next, ChannelEvent::Send { device });
                    }

                    if time < next_allowed[device] {
                        observer.transmit_blocked(device as DeviceId, time);
                        continue;
                    }

                    let sf = sfs[device];
                    let air_time = config.air_time_ms(sf);
                    next_allowed[device] = time + (air_time as f64 / config.duty_cycle) as SimTime;

                    let message = ids.next_id();
                    let tx = transmissions.len();
                    observer.transmit(message, device as DeviceId, n_gw, time);

                    let mut lost = vec![None; n_gw];
                    let mut interfered = vec![false; n_gw];
                    let mut holds_path = vec![false; n_gw];

                    for (g, gateway) in gateways.iter_mut().enumerate() {
                        let power = config.rx_power(&layout.devices[device], &layout.gateways[g]);
                        if power < ChannelConfig::sensitivity(sf) {
                            lost[g] = Some(OutcomeKind::UnderSensitivity);
                            continue;
                        }

                        // same-SF overlap: each side needs the capture margin
                        for &(other, other_sf, other_power) in &gateway.on_air {
                            if other_sf != sf {
                                continue;
                            }
                            if other_power > power - config.capture_margin_db {
                                interfered[g] = true;
                            }
                            if power > other_power - config.capture_margin_db {
                                transmissions[other].interfered[g] = true;
                            }
                        }
                        gateway.on_air.push((tx, sf, power));

                        if gateway.busy_paths >= config.receive_paths {
                            lost[g] = Some(OutcomeKind::NoMoreReceivers);
                        } else {
                            gateway.busy_paths += 1;
                            holds_path[g] = true;
                        }
                    }

                    transmissions.push(Transmission {
                        message,
                        sf,
                        lost,
                        interfered,
                        holds_path,
                    });
                    queue.push(time + air_time, ChannelEvent::TxEnd { tx });
                }

                ChannelEvent::TxEnd { tx } => {
                    let t = &transmissions[tx];
                    let mut reports: Vec<(usize, OutcomeKind)> = Vec::with_capacity(n_gw);

                    for (g, gateway) in gateways.iter_mut().enumerate() {
                        let kind = match t.lost[g] {
                            Some(kind) => kind,
                            None if t.interfered[g] => OutcomeKind::Interfered,
                            None => OutcomeKind::Received,
                        };
                        if t.holds_path[g] {
                            gateway.busy_paths -= 1;
                        }
                        gateway.on_air.retain(|&(other, _, _)| other != tx);
                        reports.push((g, kind));
                    }

                    // gateways report independently, in no particular order
                    reports.shuffle(rng);

                    let mut any_received = false;
                    for (g, kind) in reports {
                        any_received |= kind == OutcomeKind::Received;
                        observer.receiver_report(t.message, g, kind);
                    }

                    trace!("tx {} sf{} ended at {}", t.message, t.sf, time);

                    // the collection point keeps the first copy only
                    if any_received {
                        queue.push(
                            time + config.backhaul_delay_ms,
                            ChannelEvent::Deliver { message: t.message },
                        );
                    }
                }

                ChannelEvent::Deliver { message } => {
                    observer.delivered(message, time);
                }
            }
        }

        Ok(())
    }

    fn device_classes(&self, layout: &Layout) -> Vec<u8> {
        layout
            .devices
            .iter()
            .map(|d| self.config.spreading_factor(d, &layout.gateways))
            .collect()
    }
}
