//! Collation of encoded index keys.
//!
//! Keys are compared in their stored JSON form without decoding them into
//! values first. The index store orders rows with this comparator and range
//! bounds are evaluated with it, so both sides always agree on ordering.
//!
//! # Ordering
//!
//! With [`Collation::Unicode`] and [`Collation::Ascii`] values of different
//! types order as:
//!
//! `null < false < true < numbers < strings < arrays < objects`
//!
//! Arrays compare element by element, a shorter array sorts before a longer
//! one sharing its prefix. Numbers compare numerically, so `123` and `123.0`
//! are equal.
//!
//! Strings compare with the Unicode Collation Algorithm under
//! [`Collation::Unicode`], using the root locale at tertiary strength:
//! accents and case only break ties between otherwise equal letters, and
//! lowercase sorts before uppercase (`"a" < "A" < "aa" < "B"`,
//! `"e" < "é" < "f"`). [`Collation::Ascii`] compares code points
//! (`"A" < "B" < "a"`).
//!
//! [`Collation::Raw`] uses a different type order
//! (`numbers < false < null < true < objects < arrays < strings`) and
//! code point string comparison.

use crate::value::encode;
use icu_collator::{Collator, CollatorOptions, Strength};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Collation mode of a view's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Collation {
    /// Locale-style string comparison, CouchDB type ordering.
    #[default]
    Unicode,
    /// Code point string comparison, CouchDB type ordering.
    Ascii,
    /// Code point string comparison, raw type ordering.
    Raw,
}

impl Collation {
    /// Compares two encoded keys.
    pub fn compare(self, a: &[u8], b: &[u8]) -> Ordering {
        collate(self, a, b)
    }

    /// Compares two decoded values by encoding them first.
    pub fn compare_values(self, a: &Value, b: &Value) -> Ordering {
        self.compare(&encode(a), &encode(b))
    }

    /// Returns the stable name used when persisting the collation.
    pub fn as_str(self) -> &'static str {
        match self {
            Collation::Unicode => "unicode",
            Collation::Ascii => "ascii",
            Collation::Raw => "raw",
        }
    }
}

/// Lexical token classes, in CouchDB collation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Token {
    EndArray = 0,
    EndObject = 1,
    Comma = 2,
    Colon = 3,
    Null = 4,
    False = 5,
    True = 6,
    Number = 7,
    String = 8,
    Array = 9,
    Object = 10,
    Illegal = 11,
}

impl Token {
    fn classify(byte: Option<u8>) -> Self {
        match byte {
            Some(b'n') => Token::Null,
            Some(b'f') => Token::False,
            Some(b't') => Token::True,
            Some(b'0'..=b'9' | b'-') => Token::Number,
            Some(b'"') => Token::String,
            Some(b']') => Token::EndArray,
            Some(b'}') => Token::EndObject,
            Some(b',') => Token::Comma,
            Some(b':') => Token::Colon,
            Some(b'[') => Token::Array,
            Some(b'{') => Token::Object,
            _ => Token::Illegal,
        }
    }

    /// Rank used by [`Collation::Raw`].
    fn raw_rank(self) -> i8 {
        match self {
            Token::EndArray => -4,
            Token::EndObject => -3,
            Token::Comma => -2,
            Token::Colon => -1,
            Token::Number => 0,
            Token::False => 1,
            Token::Null => 2,
            Token::True => 3,
            Token::Object => 4,
            Token::Array => 5,
            Token::String => 6,
            Token::Illegal => 7,
        }
    }
}

/// A read position inside one encoded key.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn peek(&mut self) -> Token {
        while matches!(self.buf.get(self.pos), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
        Token::classify(self.buf.get(self.pos).copied())
    }

    fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.buf.len());
    }

    fn read_number(&mut self) -> f64 {
        let start = self.pos;
        while matches!(
            self.buf.get(self.pos),
            Some(b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E')
        ) {
            self.pos += 1;
        }
        std::str::from_utf8(&self.buf[start..self.pos])
            .ok()
            .and_then(|text| text.parse::<f64>().ok())
            .unwrap_or(0.0)
    }

    /// Reads a string token starting at its opening quote, resolving escapes.
    fn read_string(&mut self) -> String {
        self.pos += 1;
        let mut out = Vec::new();
        while let Some(&byte) = self.buf.get(self.pos) {
            match byte {
                b'"' => {
                    self.pos += 1;
                    break;
                }
                b'\\' => {
                    self.pos += 1;
                    let ch = self.read_escape();
                    let mut tmp = [0u8; 4];
                    out.extend_from_slice(ch.encode_utf8(&mut tmp).as_bytes());
                }
                _ => {
                    out.push(byte);
                    self.pos += 1;
                }
            }
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    fn read_escape(&mut self) -> char {
        let Some(&code) = self.buf.get(self.pos) else {
            return '\0';
        };
        self.pos += 1;
        match code {
            b'b' => '\u{8}',
            b'f' => '\u{c}',
            b'n' => '\n',
            b'r' => '\r',
            b't' => '\t',
            b'u' => self.read_unicode_escape(),
            other => other as char,
        }
    }

    fn read_unicode_escape(&mut self) -> char {
        let Some(high) = self.read_hex4() else {
            return char::REPLACEMENT_CHARACTER;
        };
        if !(0xD800..0xDC00).contains(&high) {
            return char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER);
        }
        // High surrogate: try to pair it with a following \uDCxx.
        let save = self.pos;
        if self.buf.get(self.pos) == Some(&b'\\') && self.buf.get(self.pos + 1) == Some(&b'u') {
            self.pos += 2;
            if let Some(low) = self.read_hex4() {
                if (0xDC00..0xE000).contains(&low) {
                    let combined = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                    return char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER);
                }
            }
        }
        self.pos = save;
        char::REPLACEMENT_CHARACTER
    }

    fn read_hex4(&mut self) -> Option<u32> {
        let digits = self.buf.get(self.pos..self.pos + 4)?;
        let text = std::str::from_utf8(digits).ok()?;
        let code = u32::from_str_radix(text, 16).ok()?;
        self.pos += 4;
        Some(code)
    }
}

fn collate(mode: Collation, a: &[u8], b: &[u8]) -> Ordering {
    let mut left = Reader::new(a);
    let mut right = Reader::new(b);
    let mut depth = 0usize;

    loop {
        let t1 = left.peek();
        let t2 = right.peek();

        if t1 != t2 {
            return match mode {
                Collation::Raw => t1.raw_rank().cmp(&t2.raw_rank()),
                Collation::Unicode | Collation::Ascii => t1.cmp(&t2),
            };
        }

        match t1 {
            Token::Null | Token::True => {
                left.advance(4);
                right.advance(4);
            }
            Token::False => {
                left.advance(5);
                right.advance(5);
            }
            Token::Number => {
                let n1 = left.read_number();
                let n2 = right.read_number();
                match n1.partial_cmp(&n2) {
                    Some(Ordering::Equal) | None => {}
                    Some(ord) => return ord,
                }
            }
            Token::String => {
                let s1 = left.read_string();
                let s2 = right.read_string();
                let ord = match mode {
                    Collation::Unicode => compare_unicode(&s1, &s2),
                    Collation::Ascii | Collation::Raw => s1.cmp(&s2),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Token::Array | Token::Object => {
                left.advance(1);
                right.advance(1);
                depth += 1;
            }
            Token::EndArray | Token::EndObject => {
                left.advance(1);
                right.advance(1);
                depth = depth.saturating_sub(1);
            }
            Token::Comma | Token::Colon => {
                left.advance(1);
                right.advance(1);
            }
            Token::Illegal => return Ordering::Equal,
        }

        if depth == 0 {
            return Ordering::Equal;
        }
    }
}

thread_local! {
    static UNICODE_COLLATOR: Option<Collator> = unicode_collator();
}

/// Root locale, tertiary strength. Root data already orders lowercase first.
fn unicode_collator() -> Option<Collator> {
    let mut options = CollatorOptions::new();
    options.strength = Some(Strength::Tertiary);
    Collator::try_new(&Default::default(), options).ok()
}

fn compare_unicode(a: &str, b: &str) -> Ordering {
    UNICODE_COLLATOR.with(|collator| match collator {
        Some(collator) => collator.compare(a, b),
        // Compiled collation data is built in, so this only guards a broken build.
        None => a.cmp(b),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn cmp(mode: Collation, a: &str, b: &str) -> i32 {
        match mode.compare(a.as_bytes(), b.as_bytes()) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }
    }

    #[test]
    fn scalars_unicode() {
        let mode = Collation::Unicode;
        assert_eq!(cmp(mode, "true", "false"), 1);
        assert_eq!(cmp(mode, "false", "true"), -1);
        assert_eq!(cmp(mode, "null", "17"), -1);
        assert_eq!(cmp(mode, "123", "1"), 1);
        assert_eq!(cmp(mode, "123", "0123.0"), 0);
        assert_eq!(cmp(mode, "123", "\"123\""), -1);
        assert_eq!(cmp(mode, "\"1234\"", "\"123\""), 1);
        assert_eq!(cmp(mode, "\"1234\"", "\"1235\""), -1);
        assert_eq!(cmp(mode, "\"1234\"", "\"1234\""), 0);
        assert_eq!(cmp(mode, r#""12\/34""#, "\"12/34\""), 0);
        assert_eq!(cmp(mode, r#""\/1234""#, "\"/1234\""), 0);
        assert_eq!(cmp(mode, r#""1234\/""#, "\"1234/\""), 0);
        assert_eq!(cmp(mode, "\"a\"", "\"A\""), -1);
        assert_eq!(cmp(mode, "\"A\"", "\"aa\""), -1);
        assert_eq!(cmp(mode, "\"B\"", "\"aa\""), 1);
    }

    #[test]
    fn scalars_ascii() {
        let mode = Collation::Ascii;
        assert_eq!(cmp(mode, "true", "false"), 1);
        assert_eq!(cmp(mode, "null", "17"), -1);
        assert_eq!(cmp(mode, "123", "0123.0"), 0);
        assert_eq!(cmp(mode, "\"1234\"", "\"123\""), 1);
        assert_eq!(cmp(mode, r#""12\/34""#, "\"12/34\""), 0);
        assert_eq!(cmp(mode, "\"A\"", "\"a\""), -1);
        assert_eq!(cmp(mode, "\"B\"", "\"a\""), -1);
    }

    #[test]
    fn raw_type_order() {
        let mode = Collation::Raw;
        assert_eq!(cmp(mode, "false", "17"), 1);
        assert_eq!(cmp(mode, "false", "true"), -1);
        assert_eq!(cmp(mode, "null", "true"), -1);
        assert_eq!(cmp(mode, "[\"A\"]", "\"A\""), -1);
        assert_eq!(cmp(mode, "\"A\"", "\"a\""), -1);
        assert_eq!(cmp(mode, "[\"b\"]", "[\"b\",\"c\",\"a\"]"), -1);
    }

    #[test]
    fn arrays() {
        let mode = Collation::Unicode;
        assert_eq!(cmp(mode, "[]", "\"foo\""), 1);
        assert_eq!(cmp(mode, "[]", "[]"), 0);
        assert_eq!(cmp(mode, "[true]", "[true]"), 0);
        assert_eq!(cmp(mode, "[false]", "[null]"), 1);
        assert_eq!(cmp(mode, "[]", "[null]"), -1);
        assert_eq!(cmp(mode, "[123]", "[45]"), 1);
        assert_eq!(cmp(mode, "[123]", "[45,67]"), 1);
        assert_eq!(cmp(mode, "[123.4,\"wow\"]", "[123.40,789]"), 1);
    }

    #[test]
    fn nested_arrays() {
        let mode = Collation::Unicode;
        assert_eq!(cmp(mode, "[[]]", "[]"), 1);
        assert_eq!(cmp(mode, "[1,[2,3],4]", "[1,[2,3.1],4,5,6]"), -1);
    }

    #[test]
    fn unicode_strings() {
        let mode = Collation::Unicode;
        let enc = |s: &str| String::from_utf8(encode(&json!(s))).unwrap();
        assert_eq!(cmp(mode, &enc("fréd"), &enc("fréd")), 0);
        assert_eq!(cmp(mode, &enc("\t"), &enc(" ")), -1);
        assert_eq!(cmp(mode, &enc("\u{1}"), &enc(" ")), -1);
    }

    #[test]
    fn escapes_resolve_before_comparison() {
        let mode = Collation::Ascii;
        assert_eq!(cmp(mode, r#""E""#, "\"E\""), 0);
        assert_eq!(cmp(mode, r#""\t""#, "\"\t\""), 0);
        assert_eq!(cmp(mode, r#""\\""#, r#""\\""#), 0);
        assert_eq!(cmp(mode, r#""😀""#, "\"\u{1F600}\""), 0);
    }

    #[test]
    fn accents_are_secondary_to_base_letters() {
        let mode = Collation::Unicode;
        let order = |a: &str, b: &str| mode.compare_values(&json!(a), &json!(b));
        assert_eq!(order("e", "é"), Ordering::Less);
        assert_eq!(order("é", "f"), Ordering::Less);
        assert_eq!(order("éclair", "zebra"), Ordering::Less);
        assert_eq!(order("eclair", "éclair"), Ordering::Less);
        assert_eq!(order("resume", "résumé"), Ordering::Less);
        assert_eq!(order("résumé", "rf"), Ordering::Less);
        assert_eq!(order("résumé", "Résumé"), Ordering::Less);
        assert_eq!(order("Résumé", "résumés"), Ordering::Less);
    }

    #[test]
    fn accented_keys_sort_among_plain_ones() {
        let mut keys = vec![json!("zebra"), json!("éclair"), json!("f"), json!("e"), json!("é")];
        keys.sort_by(|a, b| Collation::Unicode.compare_values(a, b));
        assert_eq!(keys, vec![json!("e"), json!("é"), json!("éclair"), json!("f"), json!("zebra")]);

        keys.sort_by(|a, b| Collation::Ascii.compare_values(a, b));
        assert_eq!(keys.last(), Some(&json!("éclair")));
    }

    #[test]
    fn compare_values_matches_encoded() {
        let mode = Collation::Unicode;
        assert_eq!(
            mode.compare_values(&json!(null), &json!(false)),
            Ordering::Less
        );
        assert_eq!(
            mode.compare_values(&json!({"a": 1}), &json!([1, 2])),
            Ordering::Greater
        );
        assert_eq!(mode.compare_values(&json!(2), &json!(2.0)), Ordering::Equal);
    }

    fn json_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            (-1000i64..1000).prop_map(|n| json!(n)),
            "[a-zA-Z0-9 ]{0,6}".prop_map(Value::String),
        ]
    }

    fn json_value() -> impl Strategy<Value = Value> {
        json_leaf().prop_recursive(3, 16, 4, |inner| {
            prop::collection::vec(inner, 0..4).prop_map(Value::Array)
        })
    }

    proptest! {
        #[test]
        fn comparison_is_antisymmetric(a in json_value(), b in json_value()) {
            for mode in [Collation::Unicode, Collation::Ascii, Collation::Raw] {
                prop_assert_eq!(mode.compare_values(&a, &b), mode.compare_values(&b, &a).reverse());
            }
        }

        #[test]
        fn comparison_is_reflexive(a in json_value()) {
            for mode in [Collation::Unicode, Collation::Ascii, Collation::Raw] {
                prop_assert_eq!(mode.compare_values(&a, &a), Ordering::Equal);
            }
        }

        #[test]
        fn comparison_is_transitive(a in json_value(), b in json_value(), c in json_value()) {
            let mode = Collation::Unicode;
            if mode.compare_values(&a, &b) != Ordering::Greater
                && mode.compare_values(&b, &c) != Ordering::Greater
            {
                prop_assert_ne!(mode.compare_values(&a, &c), Ordering::Greater);
            }
        }
    }
}
