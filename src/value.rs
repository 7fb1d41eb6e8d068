//! Dynamic message values.
//!
//! Decoded messages and encoder inputs are represented dynamically: a
//! [`MsgValue`] holds one slot per field, addressed positionally by the
//! field's `rnum`, and a [`Value`] is a tagged scalar, list, or nested
//! message. Numeric variants are deliberately loose (`Int` carries any
//! signed width); the verifier is what enforces per-declared-type ranges.

use bytes::Bytes;

/// A single dynamic value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Any signed integer (`int32`/`int64`/`sint*`/`sfixed*`), and the
    /// fallback carrier for enum numbers with no declared symbol.
    Int(i64),
    /// Any unsigned integer (`uint*`/`fixed*`).
    Uint(u64),
    Bool(bool),
    /// `float` and `double` values; `float` is narrowed at the wire.
    Double(f64),
    Str(String),
    Bytes(Bytes),
    /// An enum value, by declared symbol.
    Enum(String),
    Msg(MsgValue),
    /// The elements of a repeated field, in declaration/wire order.
    List(Vec<Value>),
}

impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Value {
        Value::Uint(u64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Value {
        Value::Uint(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Value {
        Value::Double(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Value {
        Value::Bytes(Bytes::from(v))
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Value {
        Value::Bytes(v)
    }
}

impl From<MsgValue> for Value {
    fn from(v: MsgValue) -> Value {
        Value::Msg(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Value {
        Value::List(v)
    }
}

/// A dynamic message value: the qualified message name plus one slot per
/// field, indexed by `rnum - 1`. An absent optional field is `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct MsgValue {
    pub name: String,
    pub fields: Vec<Option<Value>>,
}

impl MsgValue {
    pub fn new(name: impl Into<String>, field_count: usize) -> MsgValue {
        MsgValue {
            name: name.into(),
            fields: vec![None; field_count],
        }
    }

    /// The value in the field slot `rnum`, if set.
    ///
    /// Returns `None` both for an absent field and for an out-of-range
    /// ordinal.
    pub fn get(&self, rnum: u32) -> Option<&Value> {
        let idx = (rnum as usize).checked_sub(1)?;
        self.fields.get(idx).and_then(Option::as_ref)
    }

    /// Sets the field slot `rnum`. Panics when the ordinal is out of range
    /// for this value's arity.
    pub fn set(&mut self, rnum: u32, value: impl Into<Value>) -> &mut MsgValue {
        self.fields[rnum as usize - 1] = Some(value.into());
        self
    }

    /// Clears the field slot `rnum` back to absent.
    pub fn clear(&mut self, rnum: u32) -> &mut MsgValue {
        self.fields[rnum as usize - 1] = None;
        self
    }

    pub fn is_set(&self, rnum: u32) -> bool {
        self.get(rnum).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_access() {
        let mut msg = MsgValue::new("test.M", 2);
        assert!(!msg.is_set(1));
        msg.set(1, 150);
        msg.set(2, "abc");
        assert_eq!(msg.get(1), Some(&Value::Int(150)));
        assert_eq!(msg.get(2), Some(&Value::Str("abc".to_string())));
        msg.clear(1);
        assert_eq!(msg.get(1), None);
        assert_eq!(msg.get(99), None);
    }
}
