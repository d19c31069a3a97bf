//! Benchmarks for the message translator.
//!
//! Run with: cargo bench --bench translator_bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gemini_proxy_rust::api::models::Message;
use gemini_proxy_rust::transformer::translate;
use serde_json::json;

fn text_conversation(turns: usize) -> Vec<Message> {
    let mut value = vec![json!({"role": "system", "content": "You are a helpful assistant."})];
    for i in 0..turns {
        value.push(json!({"role": "user", "content": format!("Question {i}?")}));
        value.push(json!({"role": "assistant", "content": format!("Answer {i}.")}));
    }
    serde_json::from_value(json!(value)).unwrap()
}

fn bench_translate_text(c: &mut Criterion) {
    let short = text_conversation(1);
    let long = text_conversation(50);

    c.bench_function("translate_short_conversation", |b| {
        b.iter(|| translate(black_box(&short)))
    });
    c.bench_function("translate_long_conversation", |b| {
        b.iter(|| translate(black_box(&long)))
    });
}

fn bench_translate_multimodal(c: &mut Criterion) {
    let payload = "iVBORw0KGgoAAAANSUhEUg".repeat(64);
    let messages: Vec<Message> = serde_json::from_value(json!([
        {"role": "user", "content": [
            {"type": "text", "text": "What is in this image?"},
            {"type": "image_url", "image_url": {"url": format!("data:image/png;base64,{payload}")}}
        ]}
    ]))
    .unwrap();

    c.bench_function("translate_multimodal_message", |b| {
        b.iter(|| translate(black_box(&messages)))
    });
}

criterion_group!(benches, bench_translate_text, bench_translate_multimodal);
criterion_main!(benches);
