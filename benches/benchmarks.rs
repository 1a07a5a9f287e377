use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pa_agent::event_draft::{draft_from_output, extract_json_object, parse_event_draft};

const FENCED_OUTPUT: &str = "Sure! Here is the event:\n```json\n{\"summary\":\"Lunch with Sam\",\"start_date\":\"2024-06-11\",\"start_time\":\"12:00\",\"end_date\":\"2024-06-11\",\"end_time\":\"13:00\",\"location\":\"Cafe {Downtown}\",\"description\":\"\"}\n```\nLet me know if you need anything else.";

fn event_draft_benchmarks(c: &mut Criterion) {
    let now = NaiveDate::from_ymd_opt(2024, 6, 6)
        .and_then(|d| d.and_hms_opt(9, 30, 0))
        .unwrap();

    c.bench_function("extract_json_object", |b| {
        b.iter(|| black_box(extract_json_object(black_box(FENCED_OUTPUT))))
    });

    c.bench_function("parse_event_draft_fenced", |b| {
        b.iter(|| black_box(parse_event_draft(black_box(FENCED_OUTPUT))))
    });

    // Prose with no object at all: the fallback path.
    c.bench_function("draft_from_output_fallback", |b| {
        b.iter(|| {
            black_box(draft_from_output(
                black_box("I could not understand that request."),
                now,
                "lunch with Sam sometime",
            ))
        })
    });
}

criterion_group!(benches, event_draft_benchmarks);
criterion_main!(benches);
