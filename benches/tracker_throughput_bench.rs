use ld_rust::{OutcomeKind, OutcomeTracker};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::time::Instant;

/// Benchmark outcome tracker throughput with shuffled receiver reports
fn main() {
    let _ = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Error)
        .init();

    println!("\n=== Outcome Tracker Throughput Benchmark ===\n");

    let configs = vec![
        ("1 gateway", 1usize),
        ("9 gateways", 9),
        ("19 gateways", 19),
        ("49 gateways", 49),
    ];
    let messages: u64 = 100_000;
    // transmissions in flight before their reports are drained
    let window = 64usize;

    println!("{:<20} {:>12} {:>15} {:>15}",
             "Configuration", "Time (ms)", "Messages/s", "Reports/s");
    println!("{}", "-".repeat(66));

    for (name, receivers) in configs {
        let mut rng = StdRng::seed_from_u64(42);
        let mut tracker = OutcomeTracker::new();

        let start = Instant::now();
        let mut pending: Vec<(u64, usize)> = Vec::with_capacity(window * receivers);

        for m in 0..messages {
            tracker.on_transmit(m, (m % 1000) as u32, receivers).unwrap();
            pending.extend((0..receivers).map(|r| (m, r)));

            if pending.len() >= window * receivers {
                pending.shuffle(&mut rng);
                for (message, receiver) in pending.drain(..) {
                    let kind = OutcomeKind::ALL[rng.gen_range(0..4)];
                    tracker.on_receiver_report(message, receiver, kind).unwrap();
                }
            }
        }
        pending.shuffle(&mut rng);
        for (message, receiver) in pending.drain(..) {
            tracker.on_receiver_report(message, receiver, OutcomeKind::Received).unwrap();
        }

        let elapsed = start.elapsed().as_secs_f64();
        assert_eq!(tracker.finalized(), messages);
        assert_eq!(tracker.counters().total(), messages * receivers as u64);

        println!("{:<20} {:>12.2} {:>15.0} {:>15.0}",
                 name,
                 elapsed * 1000.0,
                 messages as f64 / elapsed,
                 (messages * receivers as u64) as f64 / elapsed);
    }

    println!("\n{}", "=".repeat(66));
}
