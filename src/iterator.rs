//! The foreach iteration protocol (spec §4.7 "Iteration Protocol", §3
//! "Iterator").

use crate::php_array::ArrayKey;
use crate::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

use crate::php_array::PhpArray;

/// What `FE_RESET` attached an iterator to.
pub enum IteratorSource {
    /// A value-semantics snapshot: keys/values captured at reset time, in
    /// the iteration order defined by [`PhpArray::keys_sorted_for_iteration`].
    Snapshot {
        keys: Vec<ArrayKey>,
        values: Vec<Value>,
    },
    /// By-reference iteration: the source array and its key order are
    /// retained so each fetch can rewire the element to a shared
    /// reference cell (spec §4.7).
    ByRef {
        source: Rc<RefCell<PhpArray>>,
        ordered_keys: Vec<ArrayKey>,
    },
    /// A generator coroutine handle.
    Generator(crate::generator::GeneratorHandle),
    /// An object implementing the Iterator protocol, dispatched through
    /// the builtin bridge's `rewind`/`valid`/`current`/`key`/`next`.
    ObjectProtocol { object: Value },
}

/// `(keys, values, index, generator?, iterator-object?, is-first,
/// by-reference, source-array, ordered-keys)` (spec §3 "Iterator").
pub struct Iterator {
    pub source: IteratorSource,
    pub index: usize,
    pub is_first: bool,
    pub by_reference: bool,
}

impl Iterator {
    pub fn snapshot(array: &PhpArray) -> Self {
        let keys = array.keys_sorted_for_iteration();
        let values = keys
            .iter()
            .map(|k| array.get(k).cloned().unwrap_or(Value::Null))
            .collect();
        Self {
            source: IteratorSource::Snapshot { keys, values },
            index: 0,
            is_first: true,
            by_reference: false,
        }
    }

    pub fn by_reference(source: Rc<RefCell<PhpArray>>) -> Self {
        let ordered_keys = source.borrow().keys_sorted_for_iteration();
        Self {
            source: IteratorSource::ByRef {
                source,
                ordered_keys,
            },
            index: 0,
            is_first: true,
            by_reference: true,
        }
    }

    pub fn generator(handle: crate::generator::GeneratorHandle) -> Self {
        Self {
            source: IteratorSource::Generator(handle),
            index: 0,
            is_first: true,
            by_reference: false,
        }
    }

    pub fn object_protocol(object: Value) -> Self {
        Self {
            source: IteratorSource::ObjectProtocol { object },
            index: 0,
            is_first: true,
            by_reference: false,
        }
    }

    /// Advances and returns the next `(key, value)`, or `None` on
    /// exhaustion (spec: "`FE_FETCH` produces the next `(key, value)` or
    /// `(null, null)` on exhaustion"). Object-protocol and generator
    /// sources are driven by the engine, which has access to the builtin
    /// bridge / coroutine scheduler; this only advances the plain-array
    /// cases.
    pub fn fetch_array(&mut self) -> Option<(Value, Value)> {
        match &self.source {
            IteratorSource::Snapshot { keys, values } => {
                let result = keys
                    .get(self.index)
                    .cloned()
                    .zip(values.get(self.index).cloned())
                    .map(|(k, v)| (key_to_value(&k), v));
                if result.is_some() {
                    self.index += 1;
                }
                self.is_first = false;
                result
            }
            IteratorSource::ByRef {
                source,
                ordered_keys,
            } => {
                let key = ordered_keys.get(self.index)?.clone();
                self.index += 1;
                self.is_first = false;
                let mut array = source.borrow_mut();
                let existing = array.get(&key).cloned().unwrap_or(Value::Null);
                let reffed = existing.into_reference();
                array.insert(key.clone(), reffed.clone());
                Some((key_to_value(&key), reffed))
            }
            IteratorSource::Generator(_) | IteratorSource::ObjectProtocol { .. } => None,
        }
    }

    pub fn is_exhausted_array(&self) -> bool {
        match &self.source {
            IteratorSource::Snapshot { keys, .. } => self.index >= keys.len(),
            IteratorSource::ByRef { ordered_keys, .. } => self.index >= ordered_keys.len(),
            _ => false,
        }
    }
}

fn key_to_value(key: &ArrayKey) -> Value {
    match key {
        ArrayKey::Int(i) => Value::Int(*i),
        ArrayKey::Str(s) => Value::str(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_visits_in_spec_iteration_order() {
        let mut array = PhpArray::new();
        array.insert(ArrayKey::Int(10), Value::str("a"));
        array.insert(ArrayKey::Int(1), Value::str("b"));
        array.insert(ArrayKey::Int(5), Value::str("c"));

        let mut iter = Iterator::snapshot(&array);
        let mut seen = Vec::new();
        while let Some((k, v)) = iter.fetch_array() {
            seen.push((k.to_int(), v.to_php_string()));
        }
        assert_eq!(seen, vec![(1, "b".into()), (5, "c".into()), (10, "a".into())]);
    }

    #[test]
    fn by_reference_fetch_rewires_array_element() {
        let mut backing = PhpArray::new();
        backing.insert(ArrayKey::Int(0), Value::Int(1));
        let shared = Rc::new(RefCell::new(backing));

        let mut iter = Iterator::by_reference(Rc::clone(&shared));
        let (_, loop_var) = iter.fetch_array().unwrap();
        Value::assign_through(&loop_var, Value::Int(42));

        assert_eq!(
            shared.borrow().get(&ArrayKey::Int(0)).unwrap().deref_clone(),
            Value::Int(42)
        );
    }
}
