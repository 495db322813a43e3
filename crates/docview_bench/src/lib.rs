//! Benchmark utilities.

use docview_core::{map_fn, MapFunction};
use rand::Rng;
use serde_json::{json, Value};
use std::sync::Arc;

/// Generate a random lowercase word of the specified length.
pub fn random_word(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
}

/// Generate a random key: a string, a number or a short array of both.
pub fn random_key() -> Value {
    let mut rng = rand::thread_rng();
    match rng.gen_range(0..3) {
        0 => json!(random_word(8)),
        1 => json!(rng.gen_range(-10_000i64..10_000)),
        _ => json!([random_word(4), rng.gen_range(0..100), random_word(6)]),
    }
}

/// Generate `count` sales documents spread over `kinds` types.
pub fn generate_sales(count: usize, kinds: usize) -> Vec<(String, Value)> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            let kind = format!("type{}", rng.gen_range(0..kinds.max(1)));
            let amount = rng.gen_range(0..1000);
            (
                format!("doc{i:06}"),
                json!({"type": kind, "amount": amount, "tag": random_word(6)}),
            )
        })
        .collect()
}

/// Emits `(doc.type, doc.amount)`.
pub fn sales_map() -> Arc<dyn MapFunction> {
    map_fn(|doc, emit| {
        if let Some(kind) = doc.get("type") {
            emit.emit(kind.clone(), doc.get("amount").cloned().unwrap_or(Value::Null));
        }
        Ok(())
    })
}
