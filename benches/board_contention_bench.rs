//! Distance board under contention: the scanner-side writer publishes sector
//! readings on one thread while the control-side reader fetches snapshots on
//! another, for several bounded-wait timeouts. A zero timeout turns every
//! collision into a stale fetch or a missed swap instead of a wait.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use sector_control::scan::board::{DistanceBoard, Fetch, SectorReading};
use std::{hint::black_box, thread, time::Duration};

// Bounded waits to compare (µs)
const TIMEOUTS_US: &[u64] = &[0, 50, 500];

// Operations each side performs per iteration
const OPS_PER_THREAD: usize = 10_000;

const MOTORS: usize = 4;

fn bench_board_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("board_contention");

    for &timeout_us in TIMEOUTS_US {
        group.bench_with_input(
            BenchmarkId::new("publish_vs_read", timeout_us),
            &timeout_us,
            |b, &timeout_us| {
                b.iter(|| {
                    let (mut writer, mut reader) =
                        DistanceBoard::channel(MOTORS, Duration::from_micros(timeout_us));

                    let control = thread::spawn(move || {
                        let mut stale = 0usize;
                        for _ in 0..OPS_PER_THREAD {
                            let (snapshot, fetch) = reader.read();
                            black_box(snapshot.version());
                            if fetch == Fetch::Stale {
                                stale += 1;
                            }
                        }
                        stale
                    });

                    let mut missed = 0usize;
                    for i in 0..OPS_PER_THREAD {
                        let reading = SectorReading::new(10.0 + (i % 500) as f32, (i % 180) as u16);
                        if !writer.publish(i % MOTORS, reading) {
                            missed += 1;
                        }
                    }

                    let stale = control.join().unwrap_or(0);
                    black_box((stale, missed))
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_board_contention);
criterion_main!(benches);
