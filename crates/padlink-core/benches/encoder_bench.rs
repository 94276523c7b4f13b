//! Criterion benchmarks for the event encoder.
//!
//! Sensor streams produce events at up to 100 Hz per sensor, so encoding has
//! to stay far below a millisecond even on low-end hardware.
//!
//! Run with:
//! ```bash
//! cargo bench --package padlink-core --bench encoder_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use padlink_core::{
    decode_csv, decode_json, ButtonState, DataFormat, Event, EventEncoder, EventKind,
};

// ── Event fixtures ────────────────────────────────────────────────────────────

fn fixtures() -> Vec<(&'static str, Event)> {
    vec![
        (
            "button",
            Event::new(
                "fire",
                EventKind::Button {
                    state: ButtonState::Pressed,
                },
            ),
        ),
        (
            "joystick",
            Event::new("stick", EventKind::JoyStick { x: 0.7071, y: -0.7071 }),
        ),
        (
            "accelerometer",
            Event::new(
                "accel",
                EventKind::Accelerometer {
                    x: 0.0123,
                    y: 9.80665,
                    z: -0.4567,
                },
            ),
        ),
    ]
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for format in [DataFormat::Json, DataFormat::Csv] {
        let encoder = EventEncoder::new(format);
        for (name, event) in fixtures() {
            group.bench_with_input(
                BenchmarkId::new(format!("{format:?}"), name),
                &event,
                |b, event| b.iter(|| encoder.encode(black_box(event))),
            );
        }
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for (name, event) in fixtures() {
        let json = EventEncoder::new(DataFormat::Json).encode(&event).unwrap();
        let csv = EventEncoder::new(DataFormat::Csv).encode(&event).unwrap();
        let event_type = event.event_type();

        group.bench_with_input(BenchmarkId::new("Json", name), &json, |b, text| {
            b.iter(|| decode_json(black_box(text)))
        });
        group.bench_with_input(BenchmarkId::new("Csv", name), &csv, |b, text| {
            b.iter(|| decode_csv(black_box(text), event_type))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
