use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use perimeter_node::collab::outbox;
use perimeter_node::{
    ConfigHandle, HistoryBuffer, IngestionParser, Ingestor, ManualClock, Node, NodeConfig,
    SensorReading, SystemState,
};
use std::sync::Arc;

fn filled_history(capacity: usize) -> HistoryBuffer {
    let mut history = HistoryBuffer::new(capacity);
    for i in 0..capacity {
        let distance = 5.0 + (i % 300) as f32;
        history.append(SensorReading::new(distance, i as u64 * 50).with_detection(distance < 40.0));
    }
    history
}

fn frame_stream(frames: usize) -> Vec<u8> {
    let mut bytes = Vec::new();
    for i in 0..frames {
        let line = match i % 3 {
            0 => format!("{{\"d\":{}.5,\"m\":0,\"a\":0,\"h\":[1,2,3,4,5]}}\n", 10 + i % 200),
            1 => format!("DISTANCE:{}.0\n", 20 + i % 100),
            _ => "HEARTBEAT:1\n".to_string(),
        };
        bytes.extend_from_slice(line.as_bytes());
    }
    bytes
}

/// Benchmark appends into a full ring
fn bench_history_append(c: &mut Criterion) {
    for capacity in [10, 100, 1000].iter() {
        c.bench_with_input(
            BenchmarkId::new("history_append", capacity),
            capacity,
            |b, &capacity| {
                let mut history = filled_history(capacity);
                let reading = SensorReading::new(42.0, 1_000);
                b.iter(|| history.append(black_box(reading.clone())))
            },
        );
    }
}

/// Benchmark the derived analytics over a full ring
fn bench_history_analytics(c: &mut Criterion) {
    let history = filled_history(100);
    let current = SensorReading::new(50.0, 5_000);

    c.bench_function("history_get", |b| {
        b.iter(|| {
            for k in 0..history.count() {
                black_box(history.get(k));
            }
        })
    });

    c.bench_function("history_average_10", |b| {
        b.iter(|| history.average_distance(black_box(10), &current))
    });

    c.bench_function("history_detection_count_60s", |b| {
        b.iter(|| history.detection_count(black_box(60), 5_000))
    });
}

/// Benchmark line classification throughput
fn bench_parser_feed(c: &mut Criterion) {
    let bytes = frame_stream(300);

    c.bench_function("parser_feed_300_lines", |b| {
        b.iter(|| {
            let mut parser = IngestionParser::new();
            parser.feed(black_box(&bytes))
        })
    });

    c.bench_function("parser_feed_small_chunks", |b| {
        b.iter(|| {
            let mut parser = IngestionParser::new();
            let mut events = 0;
            for chunk in bytes.chunks(16) {
                events += parser.feed(chunk).len();
            }
            events
        })
    });
}

/// Benchmark ingestion into state including history updates
fn bench_ingest_apply(c: &mut Criterion) {
    let bytes = frame_stream(300);
    let clock = ManualClock::new(1_000);

    c.bench_function("ingest_apply_300_lines", |b| {
        b.iter(|| {
            let mut state = SystemState::new(100, Arc::new(clock.clone()));
            let mut ingestor = Ingestor::new();
            ingestor.ingest(black_box(&bytes), &mut state, 40.0)
        })
    });
}

/// Benchmark snapshot serialization for WebSocket clients
fn bench_snapshot_json(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("Should create tokio runtime");
    let snapshot = rt.block_on(async {
        let (tx, _rx) = outbox(4);
        let mut node = Node::new(
            ConfigHandle::new(NodeConfig::default(), None),
            Arc::new(ManualClock::new(1_000)),
            tx,
        )
        .await;
        node.ingest_bytes(&frame_stream(100)).await;
        node.snapshot().await
    });

    c.bench_function("snapshot_json", |b| {
        b.iter(|| serde_json::to_string(black_box(&snapshot)).expect("Should serialize"))
    });
}

criterion_group!(
    benches,
    bench_history_append,
    bench_history_analytics,
    bench_parser_feed,
    bench_ingest_apply,
    bench_snapshot_json
);

criterion_main!(benches);
