use chirp::timeline::{merge_desc, Entry};
use chirp::tweet::{Score, TweetId};
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;

/// `authors` descending lists of `per_author` entries with interleaved scores.
fn author_timelines(authors: usize, per_author: usize) -> Vec<Vec<Entry>> {
    (0..authors)
        .map(|author| {
            (0..per_author)
                .map(|i| {
                    let score = Score(1_000_000_000 - (i * authors + author) as i64 * 1_000);
                    Entry::new(TweetId::generate(score), score)
                })
                .collect()
        })
        .collect()
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Merge timelines");

    // one page of a home timeline plus a handful of pull-only authors
    let mut page = author_timelines(5, 21);
    page.push(author_timelines(1, 101).remove(0));
    group.bench_function("merge a home page with 5 pull-only authors", |b| {
        b.iter(|| merge_desc(black_box(page.clone())))
    });

    // a cold rebuild over everyone a user follows
    let cold = author_timelines(200, 40);
    group.bench_function("merge 200 author timelines for a cold rebuild", |b| {
        b.iter(|| merge_desc(black_box(cold.clone())))
    });

    // a pushed entry also read through the pull path
    let mut overlapping = author_timelines(3, 100);
    overlapping.push(overlapping[0].clone());
    group.bench_function("merge overlapping timelines", |b| {
        b.iter(|| merge_desc(black_box(overlapping.clone())))
    });
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
