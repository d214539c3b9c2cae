//! The array data model (spec §3 "Array").
//!
//! An insertion-ordered mapping from `int64|string` keys to values, plus a
//! `next_index` counter used for `[]=` appends. Keys normalize the way PHP's
//! do: numeric strings that round-trip become `Int`; `bool`/`null` become
//! `Int` `1`/`0`/`""`.

use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;

/// A normalized array key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArrayKey {
    Int(i64),
    Str(String),
}

impl fmt::Display for ArrayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayKey::Int(i) => write!(f, "{i}"),
            ArrayKey::Str(s) => write!(f, "{s}"),
        }
    }
}

impl ArrayKey {
    /// Normalizes a raw value into an array key per spec §3.
    ///
    /// Numeric strings that round-trip through `i64` become `Int`; `bool`
    /// and `null` become the integers `1`/`0`. Floats truncate towards zero
    /// (PHP's `(int)` cast behaviour for array subscripts).
    pub fn normalize(value: &Value) -> ArrayKey {
        match value {
            Value::Int(i) => ArrayKey::Int(*i),
            Value::Str(s) => {
                if let Some(i) = canonical_int_string(s) {
                    ArrayKey::Int(i)
                } else {
                    ArrayKey::Str(s.to_string())
                }
            }
            Value::Bool(b) => ArrayKey::Int(if *b { 1 } else { 0 }),
            Value::Null => ArrayKey::Str(String::new()),
            Value::Float(f) => ArrayKey::Int(*f as i64),
            other => ArrayKey::Str(other.to_php_string()),
        }
    }
}

/// True integer-literal strings round-trip to the same key; `"08"`, `"1.0"`,
/// `"+1"`, `" 1"` etc. stay strings, matching PHP's key coercion rule.
fn canonical_int_string(s: &str) -> Option<i64> {
    if s.is_empty() {
        return None;
    }
    let bytes = s.as_bytes();
    let (neg, digits) = if bytes[0] == b'-' {
        (true, &s[1..])
    } else {
        (false, s)
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    if neg && digits == "0" {
        return None;
    }
    s.parse::<i64>().ok()
}

/// An insertion-ordered PHP-style array.
#[derive(Debug, Clone, Default)]
pub struct PhpArray {
    entries: IndexMap<ArrayKey, Value>,
    next_index: i64,
}

impl PhpArray {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
            next_index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn next_index(&self) -> i64 {
        self.next_index
    }

    /// Inserts (or overwrites) a value at a normalized key, updating
    /// `next_index` when the key is an `Int` at or above the current
    /// counter (spec §3: `NextIndex` is `max(int keys) + 1`).
    pub fn insert(&mut self, key: ArrayKey, value: Value) {
        if let ArrayKey::Int(i) = &key {
            if *i >= self.next_index {
                self.next_index = i.saturating_add(1);
            }
        }
        self.entries.insert(key, value);
    }

    /// Appends under the next integer index (`$arr[] = $v`).
    pub fn push(&mut self, value: Value) -> ArrayKey {
        let key = ArrayKey::Int(self.next_index);
        self.insert(key.clone(), value);
        key
    }

    pub fn get(&self, key: &ArrayKey) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &ArrayKey) -> Option<&mut Value> {
        self.entries.get_mut(key)
    }

    pub fn contains_key(&self, key: &ArrayKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &ArrayKey) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    /// Keys in insertion order (used directly for non-reference iteration;
    /// `FE_RESET` sorts them per spec §4.7 for deterministic key-order
    /// scenarios such as §8 scenario 6).
    pub fn keys_in_insertion_order(&self) -> Vec<ArrayKey> {
        self.entries.keys().cloned().collect()
    }

    /// Keys ordered integer-first (ascending), then strings
    /// (lexicographic), matching spec §4.7 / §8 scenario 6.
    pub fn keys_sorted_for_iteration(&self) -> Vec<ArrayKey> {
        let mut ints: Vec<i64> = Vec::new();
        let mut strs: Vec<String> = Vec::new();
        for key in self.entries.keys() {
            match key {
                ArrayKey::Int(i) => ints.push(*i),
                ArrayKey::Str(s) => strs.push(s.clone()),
            }
        }
        ints.sort_unstable();
        strs.sort();
        ints.into_iter()
            .map(ArrayKey::Int)
            .chain(strs.into_iter().map(ArrayKey::Str))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ArrayKey, &Value)> {
        self.entries.iter()
    }

    /// `+` on two arrays: union of the left's keys with the right's keys
    /// that are absent from the left, `NextIndex` is the union's.
    pub fn union(&self, other: &PhpArray) -> PhpArray {
        let mut result = self.clone();
        for (key, value) in other.entries.iter() {
            if !result.entries.contains_key(key) {
                result.insert(key.clone(), value.clone());
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_numeric_strings_to_int_keys() {
        assert_eq!(
            ArrayKey::normalize(&Value::Str("42".into())),
            ArrayKey::Int(42)
        );
        assert_eq!(
            ArrayKey::normalize(&Value::Str("-7".into())),
            ArrayKey::Int(-7)
        );
        assert_eq!(
            ArrayKey::normalize(&Value::Str("08".into())),
            ArrayKey::Str("08".into())
        );
        assert_eq!(
            ArrayKey::normalize(&Value::Str("1.0".into())),
            ArrayKey::Str("1.0".into())
        );
    }

    #[test]
    fn bool_and_null_normalize_per_spec() {
        assert_eq!(ArrayKey::normalize(&Value::Bool(true)), ArrayKey::Int(1));
        assert_eq!(ArrayKey::normalize(&Value::Bool(false)), ArrayKey::Int(0));
        assert_eq!(ArrayKey::normalize(&Value::Null), ArrayKey::Str("".into()));
    }

    #[test]
    fn push_tracks_next_index_after_explicit_int_key() {
        let mut arr = PhpArray::new();
        arr.insert(ArrayKey::Int(10), Value::Str("a".into()));
        arr.insert(ArrayKey::Int(1), Value::Str("b".into()));
        arr.insert(ArrayKey::Int(5), Value::Str("c".into()));
        assert_eq!(arr.next_index(), 11);

        let sorted = arr.keys_sorted_for_iteration();
        assert_eq!(
            sorted,
            vec![ArrayKey::Int(1), ArrayKey::Int(5), ArrayKey::Int(10)]
        );
    }

    #[test]
    fn union_keeps_left_values_and_adds_missing_right_keys() {
        let mut left = PhpArray::new();
        left.insert(ArrayKey::Int(0), Value::Int(1));
        let mut right = PhpArray::new();
        right.insert(ArrayKey::Int(0), Value::Int(99));
        right.insert(ArrayKey::Int(1), Value::Int(2));

        let merged = left.union(&right);
        assert_eq!(merged.get(&ArrayKey::Int(0)), Some(&Value::Int(1)));
        assert_eq!(merged.get(&ArrayKey::Int(1)), Some(&Value::Int(2)));
        assert_eq!(merged.next_index(), 2);
    }
}
