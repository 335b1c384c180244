use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;
use fanout::event::Event;
use fanout::response::redis::msg::{RedisMsg, RedisParseOutput};
use std::convert::TryFrom;

const UPDATE: &str = include_str!("../test_data/update_event.json");

fn redis_message(channel: &str, event: &str) -> String {
    format!(
        "*3\r\n$7\r\nmessage\r\n${}\r\n{}\r\n${}\r\n{}\r\n",
        channel.len(),
        channel,
        event.len(),
        event
    )
}

fn parse_msg(input: &str) -> &str {
    match RedisParseOutput::try_from(input) {
        Ok(RedisParseOutput::Msg(RedisMsg { event_txt, .. })) => event_txt,
        _ => panic!("benchmark input is a complete message"),
    }
}

fn parse_msg_and_event(input: &str) -> Event {
    Event::try_from(parse_msg(input)).expect("benchmark input is a valid event")
}

fn criterion_benchmark(c: &mut Criterion) {
    let input = redis_message("timeline:public", UPDATE.trim_end());
    let mut group = c.benchmark_group("Parse redis message");

    group.bench_function("RESP framing only", |b| b.iter(|| parse_msg(black_box(&input))));
    group.bench_function("RESP framing and typed Event", |b| {
        b.iter(|| parse_msg_and_event(black_box(&input)))
    });
    group.bench_function("Encode for WebSocket", |b| {
        let event = parse_msg_and_event(&input);
        let stream = vec!["public".to_string()];
        b.iter(|| black_box(&event).to_ws_json(&stream))
    });
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
