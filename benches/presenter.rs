//! Benchmark suite for the text presenter and the grip parser.
//!
//! Isolates rendering and payload parsing from async runtime overhead.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use gripscan::{AdvertPayload, MacAddress, Observation, Presenter, TextPresenter, parse_grip};
use std::collections::BTreeMap;
use std::time::SystemTime;

fn observation(i: usize) -> Observation {
    Observation {
        mac: MacAddress([0x00, 0x00, 0x00, 0x00, (i / 256) as u8, (i % 256) as u8]),
        name: (i % 3 != 0).then(|| format!("Device {i}")),
        rssi: -40 - (i % 60) as i16,
        observed_at: SystemTime::UNIX_EPOCH,
        is_target: i % 10 == 0,
        grip: (i % 10 == 0).then_some(30.0),
    }
}

fn bench_device_line(c: &mut Criterion) {
    let presenter = TextPresenter::new();
    let mut group = c.benchmark_group("device_line");
    group.throughput(Throughput::Elements(1));

    let plain = observation(1);
    group.bench_function("plain", |b| {
        b.iter(|| black_box(presenter.device_line(black_box(&plain))))
    });

    let target = observation(10);
    group.bench_function("target_with_grip", |b| {
        b.iter(|| black_box(presenter.device_line(black_box(&target))))
    });

    group.finish();
}

fn bench_device_list(c: &mut Criterion) {
    let presenter = TextPresenter::new();
    let mut group = c.benchmark_group("device_list");

    for count in [10usize, 100, 1000] {
        let observations: Vec<Observation> = (0..count).map(observation).collect();
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(
            BenchmarkId::new("devices", count),
            &observations,
            |b, observations| {
                b.iter(|| black_box(presenter.device_list(black_box(observations))))
            },
        );
    }

    group.finish();
}

fn bench_parse_grip(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_grip");
    group.throughput(Throughput::Elements(1));

    let manufacturer = AdvertPayload {
        manufacturer_data: Some(vec![0x00, 0x00, 0x01, 0x2C]),
        service_data: BTreeMap::new(),
    };
    group.bench_function("manufacturer_data", |b| {
        b.iter(|| black_box(parse_grip(black_box(&manufacturer))))
    });

    let service = AdvertPayload {
        manufacturer_data: None,
        service_data: BTreeMap::from([(
            "0000180a-0000-1000-8000-00805f9b34fb".to_string(),
            vec![0x00, 0x0A],
        )]),
    };
    group.bench_function("service_data", |b| {
        b.iter(|| black_box(parse_grip(black_box(&service))))
    });

    let empty = AdvertPayload::default();
    group.bench_function("empty", |b| {
        b.iter(|| black_box(parse_grip(black_box(&empty))))
    });

    group.finish();
}

criterion_group!(benches, bench_device_line, bench_device_list, bench_parse_grip);
criterion_main!(benches);
