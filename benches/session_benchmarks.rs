//! Performance benchmarks for the session hot paths
//!
//! Run with: cargo bench
//! Or for specific benchmarks: cargo bench -- <filter>

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use serde_json::json;
use std::time::Duration;

use sonic_gateway::core::session::ResultCache;
use sonic_gateway::core::session::events;
use sonic_gateway::core::tools::{ToolKind, ToolOutcome};
use sonic_gateway::handlers::session::messages::ClientMessage;

/// Every upstream message passes through these classifiers
fn bench_event_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_classification");
    group.measurement_time(Duration::from_secs(5));

    let audio_output = json!({"event": {"audioOutput": {"content": "A".repeat(4096)}}});
    let tool_end = json!({"event": {"contentEnd": {"type": "TOOL", "stopReason": "TOOL_USE"}}});

    group.bench_function("event_type", |b| {
        b.iter(|| events::event_type(black_box(&audio_output)));
    });
    group.bench_function("is_tool_content_end", |b| {
        b.iter(|| events::is_tool_content_end(black_box(&tool_end)));
    });

    let benign = "connection reset by peer while reading the response body";
    let fatal = "ValidationException: Invalid input request\nRequest ID: abc";
    group.bench_function("fatal_error_benign", |b| {
        b.iter(|| events::is_fatal_stream_error(black_box(benign)));
    });
    group.bench_function("fatal_error_fatal", |b| {
        b.iter(|| events::is_fatal_stream_error(black_box(fatal)));
    });

    group.finish();
}

/// Client frames are parsed once per message; audio frames dominate
fn bench_client_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("client_parsing");

    for chunk_size in [1024usize, 16 * 1024] {
        let frame = json!({"event": {"audioInput": {
            "promptName": "prompt-1",
            "contentName": "audio-1",
            "content": "A".repeat(chunk_size)
        }}})
        .to_string();

        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("audio_input", chunk_size),
            &frame,
            |b, frame| {
                b.iter(|| ClientMessage::parse(black_box(frame)));
            },
        );
    }

    group.finish();
}

fn bench_tool_lookup(c: &mut Criterion) {
    c.bench_function("tool_kind_from_name", |b| {
        b.iter(|| ToolKind::from_name(black_box("AgentSearch")));
    });

    let outcome = ToolOutcome::success("I am done waiting for 10 seconds.");
    c.bench_function("tool_result_triad", |b| {
        b.iter(|| events::tool_result_triad("prompt-1", "content-1", "tool-1", black_box(&outcome)));
    });
}

fn bench_result_cache(c: &mut Criterion) {
    let cache = ResultCache::new();
    let payload = json!({"summary": "done", "details": "x".repeat(512)});

    c.bench_function("result_cache_store_take", |b| {
        b.iter(|| {
            cache.store(black_box("agentSearch"), payload.clone());
            cache.take(black_box("agentsearch"))
        });
    });
}

criterion_group!(
    benches,
    bench_event_classification,
    bench_client_parsing,
    bench_tool_lookup,
    bench_result_cache,
);
criterion_main!(benches);
