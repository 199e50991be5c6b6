use chirp::cache::{parse_reply, Reply};
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;

/// A `ZREVRANGE … WITHSCORES` reply as the timeline cache receives it for a full page.
fn zrevrange_reply(entries: usize) -> Vec<u8> {
    let mut reply = format!("*{}\r\n", entries * 2).into_bytes();
    for i in 0..entries {
        let score = (1_568_227_693_541_000_000 - i as i64 * 1_000).to_string();
        let member = format!("{}-{}", score, uuid_like(i));
        for field in [member, score] {
            reply.extend(format!("${}\r\n{}\r\n", field.len(), field).into_bytes());
        }
    }
    reply
}

fn uuid_like(i: usize) -> String {
    format!("{:08x}-0000-4000-8000-{:012x}", i, i * 7919)
}

/// A fan-out job popped off a queue.
const JOB_REPLY: &str = "$247\r\n{\"id\":\"5b0e6a4e-8d0c-4b2e-9c57-0d5f3d1c2a10\",\"kind\":{\"type\":\"fanout\",\"follower_count\":4213},\"tweet_id\":\"1568227693541000000-9f1c2b7e-4d3a-4e5f-8a6b-7c8d9e0f1a2b\",\"author_id\":\"78\",\"priority\":\"normal\",\"created_at\":\"2019-09-11T18:42:19Z\",\"attempt\":0}\r\n";

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Parse Redis replies");

    let page = zrevrange_reply(101);
    group.bench_function("parse a 101-entry ZREVRANGE reply", |b| {
        b.iter(|| parse_reply(black_box(&page)))
    });

    let window = zrevrange_reply(800);
    group.bench_function("parse an 800-entry ZREVRANGE reply", |b| {
        b.iter(|| parse_reply(black_box(&window)))
    });

    group.bench_function("parse a job and decode its body", |b| {
        b.iter(|| match parse_reply(black_box(JOB_REPLY.as_bytes())) {
            Ok((Reply::Bulk(body), _)) => serde_json::from_slice::<serde_json::Value>(&body).ok(),
            _ => None,
        })
    });
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
