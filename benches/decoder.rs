use agent_relay::stream::FrameDecoder;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn build_payload(frames: usize) -> Vec<u8> {
    let mut out = String::with_capacity(frames * 128);
    for i in 0..frames {
        let frame = if i % 16 == 0 {
            serde_json::json!({
                "choices": [{
                    "delta": {
                        "tool_calls": [{
                            "index": 0,
                            "function": { "arguments": format!("{{\"code\":\"1+{i}\"}}") }
                        }]
                    },
                    "finish_reason": null
                }]
            })
        } else {
            serde_json::json!({
                "choices": [{
                    "delta": { "content": format!("token{i}数据") },
                    "finish_reason": null
                }]
            })
        };
        out.push_str("data: ");
        out.push_str(&frame.to_string());
        out.push_str("\n\n");
    }
    out.push_str("data: [DONE]\n\n");
    out.into_bytes()
}

fn bench_decoder(c: &mut Criterion) {
    let payload = build_payload(1024);
    let mut group = c.benchmark_group("frame_decoder");
    group.throughput(Throughput::Bytes(payload.len() as u64));

    group.bench_function("whole_stream", |b| {
        b.iter(|| {
            let mut decoder = FrameDecoder::new();
            let mut frames = Vec::with_capacity(16);
            decoder.feed_into(black_box(payload.as_slice()), &mut frames);
            frames.len()
        });
    });

    group.bench_function("chunked_256b", |b| {
        b.iter(|| {
            let mut decoder = FrameDecoder::new();
            let mut frames = Vec::with_capacity(16);
            let mut total = 0usize;
            for chunk in payload.chunks(256) {
                decoder.feed_into(black_box(chunk), &mut frames);
                total += frames.len();
                frames.clear();
            }
            total
        });
    });

    group.finish();
}

criterion_group!(benches, bench_decoder);
criterion_main!(benches);
