//! # docview Codec
//!
//! Key and value encoding plus index collation for docview.
//!
//! Index keys and values are stored as canonical compact JSON. The
//! [`Collation`] comparator orders those encoded bytes directly, which lets
//! the index store and the query planner share a single ordering.
//!
//! ## Usage
//!
//! ```
//! use docview_codec::{encode, Collation, Value};
//! use std::cmp::Ordering;
//!
//! let a = encode(&Value::from("a"));
//! let b = encode(&Value::from("A"));
//! assert_eq!(Collation::Unicode.compare(&a, &b), Ordering::Less);
//! assert_eq!(Collation::Ascii.compare(&a, &b), Ordering::Greater);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collate;
mod error;
pub mod value;

pub use collate::Collation;
pub use error::{CodecError, CodecResult};
pub use serde_json::Value;
pub use value::{decode, encode, type_name};
