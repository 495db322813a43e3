//! Built-in reduce functions.
//!
//! Each built-in handles `rereduce`, so its output can be fed back into
//! itself. [`by_name`] resolves the conventional `_sum`, `_count` and
//! `_stats` names used in view sources.

use crate::view::{FunctionError, ReduceFunction};
use docview_codec::{type_name, Value};
use serde_json::json;
use std::sync::Arc;

/// Sums numeric values.
///
/// The result stays an integer while every input is an integer and the sum
/// does not overflow.
pub fn sum() -> Arc<dyn ReduceFunction> {
    Arc::new(|_keys: &[Value], values: &[Value], _rereduce: bool| sum_values(values))
}

/// Counts rows. On rereduce, sums the partial counts.
pub fn count() -> Arc<dyn ReduceFunction> {
    Arc::new(
        |_keys: &[Value], values: &[Value], rereduce: bool| -> Result<Value, FunctionError> {
            if rereduce {
                sum_values(values)
            } else {
                Ok(json!(values.len()))
            }
        },
    )
}

/// Computes `sum`, `count`, `min`, `max` and `sumsqr` of numeric values.
pub fn stats() -> Arc<dyn ReduceFunction> {
    Arc::new(
        |_keys: &[Value], values: &[Value], rereduce: bool| -> Result<Value, FunctionError> {
            let mut acc = Stats::default();
            for value in values {
                if rereduce {
                    if let Some(partial) = Stats::from_value(value)? {
                        acc.merge(&partial);
                    }
                } else {
                    acc.push(number(value)?);
                }
            }
            Ok(acc.into_value())
        },
    )
}

/// Resolves a built-in reduce function by name.
pub fn by_name(name: &str) -> Option<Arc<dyn ReduceFunction>> {
    match name.trim() {
        "_sum" => Some(sum()),
        "_count" => Some(count()),
        "_stats" => Some(stats()),
        _ => None,
    }
}

fn number(value: &Value) -> Result<f64, FunctionError> {
    value
        .as_f64()
        .ok_or_else(|| FunctionError::new(format!("expected a number, got {}", type_name(value))))
}

fn sum_values(values: &[Value]) -> Result<Value, FunctionError> {
    let mut int_sum: Option<i64> = Some(0);
    let mut float_sum = 0.0f64;
    for value in values {
        float_sum += number(value)?;
        int_sum = match (int_sum, value.as_i64()) {
            (Some(acc), Some(n)) => acc.checked_add(n),
            _ => None,
        };
    }
    Ok(match int_sum {
        Some(n) => json!(n),
        None => json!(float_sum),
    })
}

#[derive(Debug)]
struct Stats {
    sum: f64,
    count: u64,
    min: f64,
    max: f64,
    sumsqr: f64,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            sum: 0.0,
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sumsqr: 0.0,
        }
    }
}

impl Stats {
    fn push(&mut self, n: f64) {
        self.sum += n;
        self.count += 1;
        self.min = self.min.min(n);
        self.max = self.max.max(n);
        self.sumsqr += n * n;
    }

    fn merge(&mut self, other: &Stats) {
        self.sum += other.sum;
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sumsqr += other.sumsqr;
    }

    /// Reads a partial result. Partials of empty groups carry no bounds and
    /// are skipped.
    fn from_value(value: &Value) -> Result<Option<Self>, FunctionError> {
        let count = value.get("count").and_then(Value::as_u64).unwrap_or(0);
        if count == 0 {
            return Ok(None);
        }
        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_f64)
                .ok_or_else(|| FunctionError::new(format!("stats value missing {name}")))
        };
        Ok(Some(Self {
            sum: field("sum")?,
            count,
            min: field("min")?,
            max: field("max")?,
            sumsqr: field("sumsqr")?,
        }))
    }

    fn into_value(self) -> Value {
        if self.count == 0 {
            return json!({"sum": 0, "count": 0, "min": null, "max": null, "sumsqr": 0});
        }
        json!({
            "sum": self.sum,
            "count": self.count,
            "min": self.min,
            "max": self.max,
            "sumsqr": self.sumsqr,
        })
    }
}
