//! The encoder: message values to wire bytes.

use bytes::BufMut;

use crate::encoding::{encode_varint, zigzag_encode32, zigzag_encode64};
use crate::error::EncodeError;
use crate::features::VerifyMode;
use crate::schema::Occurrence;
use crate::value::{MsgValue, Value};

use super::{Codec, FieldPlan, MsgPlan, PlanType};

/// Per-call encoding options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EncodeOpts {
    /// Verify the value first. Honored only when the codec was
    /// synthesized with [`VerifyMode::Optionally`].
    pub verify: bool,
}

impl Codec {
    /// Encodes a message value to its proto2 wire form.
    pub fn encode_msg(&self, msg: &MsgValue) -> Result<Vec<u8>, EncodeError> {
        self.encode_msg_with(msg, EncodeOpts::default())
    }

    /// Like [`Codec::encode_msg`], with a per-call verification switch.
    pub fn encode_msg_with(&self, msg: &MsgValue, opts: EncodeOpts) -> Result<Vec<u8>, EncodeError> {
        let verify = match self.features.verify {
            VerifyMode::Always => true,
            VerifyMode::Never => false,
            VerifyMode::Optionally => opts.verify,
        };
        if verify {
            self.verify_msg(msg)?;
        }

        let idx = self
            .msg_plan_index(&msg.name)
            .ok_or_else(|| EncodeError::UnknownMessage(msg.name.clone()))?;
        let mut buf = Vec::new();
        self.encode_into(idx, msg, &mut buf)?;
        Ok(buf)
    }

    /// Appends the encoding of `msg` to `buf`, fields in declaration order.
    fn encode_into(&self, idx: usize, msg: &MsgValue, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        let plan = &self.msgs[idx];
        if msg.fields.len() != plan.fields.len() {
            return Err(EncodeError::Shape {
                msg: plan.name.clone(),
            });
        }

        for field in &plan.fields {
            let slot = msg.fields[(field.rnum - 1) as usize].as_ref();
            match field.occurrence {
                Occurrence::Required => {
                    let value = slot.ok_or_else(|| EncodeError::MissingRequired {
                        msg: plan.name.clone(),
                        field: field.name.clone(),
                    })?;
                    self.encode_field(plan, field, value, buf)?;
                }
                Occurrence::Optional => {
                    if let Some(value) = slot {
                        self.encode_field(plan, field, value, buf)?;
                    }
                }
                Occurrence::Repeated => {
                    if let Some(value) = slot {
                        let items = as_list(plan, field, value)?;
                        if field.packed {
                            self.encode_packed(plan, field, items, buf)?;
                        } else {
                            for item in items {
                                self.encode_field(plan, field, item, buf)?;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn encode_field(
        &self,
        plan: &MsgPlan,
        field: &FieldPlan,
        value: &Value,
        buf: &mut Vec<u8>,
    ) -> Result<(), EncodeError> {
        buf.extend_from_slice(&field.key);
        self.encode_value(plan, field, value, buf)
    }

    /// Encodes one value, without its key.
    fn encode_value(
        &self,
        plan: &MsgPlan,
        field: &FieldPlan,
        value: &Value,
        buf: &mut Vec<u8>,
    ) -> Result<(), EncodeError> {
        match &field.ty {
            // int32/int64 are sign-extended to 64 bits before the varint,
            // so negative values occupy ten bytes.
            PlanType::Int32 => {
                let v = int_value(plan, field, value, i64::from(i32::MIN), i64::from(i32::MAX))?;
                encode_varint(v as u64, buf);
            }
            PlanType::Int64 => {
                let v = int_value(plan, field, value, i64::MIN, i64::MAX)?;
                encode_varint(v as u64, buf);
            }
            PlanType::Uint32 => {
                let v = uint_value(plan, field, value, u64::from(u32::MAX))?;
                encode_varint(v, buf);
            }
            PlanType::Uint64 => {
                let v = uint_value(plan, field, value, u64::MAX)?;
                encode_varint(v, buf);
            }
            PlanType::Sint32 => {
                let v = int_value(plan, field, value, i64::from(i32::MIN), i64::from(i32::MAX))?;
                encode_varint(zigzag_encode32(v as i32), buf);
            }
            PlanType::Sint64 => {
                let v = int_value(plan, field, value, i64::MIN, i64::MAX)?;
                encode_varint(zigzag_encode64(v), buf);
            }
            PlanType::Bool => match value {
                Value::Bool(b) => encode_varint(u64::from(*b), buf),
                _ => return Err(type_error(plan, field, value)),
            },
            PlanType::Fixed32 => {
                let v = uint_value(plan, field, value, u64::from(u32::MAX))?;
                buf.put_u32_le(v as u32);
            }
            PlanType::Sfixed32 => {
                let v = int_value(plan, field, value, i64::from(i32::MIN), i64::from(i32::MAX))?;
                buf.put_i32_le(v as i32);
            }
            PlanType::Float => {
                let v = double_value(plan, field, value)?;
                buf.put_f32_le(v as f32);
            }
            PlanType::Fixed64 => {
                let v = uint_value(plan, field, value, u64::MAX)?;
                buf.put_u64_le(v);
            }
            PlanType::Sfixed64 => {
                let v = int_value(plan, field, value, i64::MIN, i64::MAX)?;
                buf.put_i64_le(v);
            }
            PlanType::Double => {
                let v = double_value(plan, field, value)?;
                buf.put_f64_le(v);
            }
            PlanType::Str => match value {
                Value::Str(s) => {
                    encode_varint(s.len() as u64, buf);
                    buf.extend_from_slice(s.as_bytes());
                }
                _ => return Err(type_error(plan, field, value)),
            },
            PlanType::Bytes => match value {
                Value::Bytes(b) => {
                    encode_varint(b.len() as u64, buf);
                    buf.extend_from_slice(b);
                }
                _ => return Err(type_error(plan, field, value)),
            },
            PlanType::Enum(ei) => {
                let number = match value {
                    Value::Enum(symbol) => *self.enums[*ei]
                        .by_symbol
                        .get(symbol)
                        .ok_or_else(|| type_error(plan, field, value))?,
                    // Unknown enum numbers decode to plain integers; allow
                    // them back out unchanged.
                    Value::Int(n)
                        if *n >= i64::from(i32::MIN) && *n <= i64::from(i32::MAX) =>
                    {
                        *n as i32
                    }
                    _ => return Err(type_error(plan, field, value)),
                };
                encode_varint(i64::from(number) as u64, buf);
            }
            PlanType::Msg(mi) => match value {
                Value::Msg(sub) if sub.name == self.msgs[*mi].name => {
                    // Sub-messages frame recursively through a scratch
                    // buffer; the length prefix needs the final size.
                    let mut scratch = Vec::new();
                    self.encode_into(*mi, sub, &mut scratch)?;
                    encode_varint(scratch.len() as u64, buf);
                    buf.extend_from_slice(&scratch);
                }
                _ => return Err(type_error(plan, field, value)),
            },
        }
        Ok(())
    }

    fn encode_packed(
        &self,
        plan: &MsgPlan,
        field: &FieldPlan,
        items: &[Value],
        buf: &mut Vec<u8>,
    ) -> Result<(), EncodeError> {
        // An empty packed field emits nothing, not a zero-length marker.
        if items.is_empty() {
            return Ok(());
        }

        buf.extend_from_slice(&field.key);
        if let Some(size) = field.fixed_size() {
            // Fixed-width elements: the block length is known up front,
            // no scratch buffer needed.
            encode_varint((items.len() * size) as u64, buf);
            for item in items {
                self.encode_value(plan, field, item, buf)?;
            }
        } else {
            let mut scratch = Vec::new();
            for item in items {
                self.encode_value(plan, field, item, &mut scratch)?;
            }
            encode_varint(scratch.len() as u64, buf);
            buf.extend_from_slice(&scratch);
        }
        Ok(())
    }
}

fn as_list<'a>(
    plan: &MsgPlan,
    field: &FieldPlan,
    value: &'a Value,
) -> Result<&'a [Value], EncodeError> {
    match value {
        Value::List(items) => Ok(items),
        _ => Err(type_error(plan, field, value)),
    }
}

fn int_value(
    plan: &MsgPlan,
    field: &FieldPlan,
    value: &Value,
    min: i64,
    max: i64,
) -> Result<i64, EncodeError> {
    match value {
        Value::Int(i) if (min..=max).contains(i) => Ok(*i),
        Value::Uint(u) if *u <= max as u64 => Ok(*u as i64),
        _ => Err(type_error(plan, field, value)),
    }
}

fn uint_value(
    plan: &MsgPlan,
    field: &FieldPlan,
    value: &Value,
    max: u64,
) -> Result<u64, EncodeError> {
    match value {
        Value::Uint(u) if *u <= max => Ok(*u),
        Value::Int(i) if *i >= 0 && *i as u64 <= max => Ok(*i as u64),
        _ => Err(type_error(plan, field, value)),
    }
}

fn double_value(plan: &MsgPlan, field: &FieldPlan, value: &Value) -> Result<f64, EncodeError> {
    match value {
        Value::Double(d) => Ok(*d),
        Value::Int(i) => Ok(*i as f64),
        Value::Uint(u) => Ok(*u as f64),
        _ => Err(type_error(plan, field, value)),
    }
}

fn type_error(plan: &MsgPlan, field: &FieldPlan, value: &Value) -> EncodeError {
    EncodeError::Type {
        msg: plan.name.clone(),
        field: field.name.clone(),
        value: format!("{:?}", value),
        ty: field.ty.kind_name(),
    }
}
