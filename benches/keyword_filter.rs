use chrono::Utc;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;
use fanout::event::{Event, Id};
use fanout::request::FilterRow;
use fanout::response::filter::{apply, searchable_text, FilterRule};
use std::convert::TryFrom;

const UPDATE: &str = include_str!("../test_data/update_event.json");

fn rows(count: i64) -> Vec<FilterRow> {
    (0..count)
        .map(|n| FilterRow {
            filter_id: Id(n / 4),
            title: format!("filter {}", n / 4),
            context: vec!["home".to_string(), "public".to_string()],
            expires_at: None,
            action: 0,
            keyword: format!("keyword{}", n),
            whole_word: n % 2 == 0,
        })
        .collect()
}

fn criterion_benchmark(c: &mut Criterion) {
    let event = Event::try_from(UPDATE).expect("valid fixture");
    let status = event.update_payload().expect("update");
    let mut group = c.benchmark_group("Keyword filters");

    group.bench_function("Extract searchable text", |b| {
        b.iter(|| searchable_text(black_box(status)))
    });
    for count in [4, 40, 400] {
        let rules = FilterRule::from_rows(rows(count));
        let text = searchable_text(status);
        group.bench_function(format!("Match {} keywords", count), |b| {
            b.iter(|| apply(black_box(&rules), black_box(&text), Utc::now()))
        });
    }
    group.bench_function("Compile 40 keywords", |b| {
        b.iter(|| FilterRule::from_rows(black_box(rows(40))))
    });
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
