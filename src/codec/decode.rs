//! The decoder: wire bytes to message values.
//!
//! Per message the decoder is a three-state machine: read a key varint,
//! dispatch on the field number (unknown numbers go to the wire-type
//! skipper), then loop until the buffer is empty. Received fields merge:
//! scalars are last-wins, sub-messages merge recursively, repeated fields
//! append in wire order.

use bytes::{Buf, Bytes};

use crate::encoding::{
    check_wire_type, decode_key, decode_varint, skip_field, zigzag_decode32, zigzag_decode64,
    WireType, RECURSION_LIMIT,
};
use crate::error::DecodeError;
use crate::features::CopyBytes;
use crate::schema::Occurrence;
use crate::value::{MsgValue, Value};

use super::{Codec, FieldPlan, PlanType};

impl Codec {
    /// Decodes an instance of the named message type from `buf`.
    ///
    /// The input is a [`Bytes`] value so that decoded `bytes` fields can
    /// alias it when the negotiated copy strategy allows; pass a `Vec<u8>`
    /// or `&'static [u8]` and it converts for free.
    pub fn decode_msg(&self, buf: impl Into<Bytes>, msg_name: &str) -> Result<MsgValue, DecodeError> {
        let mut buf: Bytes = buf.into();
        let idx = self
            .msg_plan_index(msg_name)
            .ok_or_else(|| DecodeError::unknown_message(msg_name))?;
        let input_len = buf.len();
        let mut msg = self.empty_msg(idx);
        self.merge_buf(idx, &mut msg, &mut buf, input_len, RECURSION_LIMIT)?;
        Ok(msg)
    }

    fn merge_buf(
        &self,
        idx: usize,
        msg: &mut MsgValue,
        buf: &mut Bytes,
        input_len: usize,
        depth: u32,
    ) -> Result<(), DecodeError> {
        while buf.has_remaining() {
            let (fnum, wire_type) = decode_key(buf)?;
            let plan = &self.msgs[idx];
            match plan.by_fnum.get(&fnum) {
                Some(&fi) => {
                    self.merge_field(idx, fi, msg, wire_type, buf, input_len, depth)?;
                }
                None => skip_field(wire_type, buf)?,
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn merge_field(
        &self,
        idx: usize,
        fi: usize,
        msg: &mut MsgValue,
        wire_type: WireType,
        buf: &mut Bytes,
        input_len: usize,
        depth: u32,
    ) -> Result<(), DecodeError> {
        let field = &self.msgs[idx].fields[fi];
        let slot_idx = (field.rnum - 1) as usize;

        match field.occurrence {
            Occurrence::Repeated => {
                if field.packable() && wire_type == WireType::LengthDelimited {
                    // A packed block: elements back to back, no keys.
                    let len = read_len(buf)?;
                    let mut block = buf.split_to(len);
                    while block.has_remaining() {
                        let value = self.read_scalar(field, &mut block, input_len)?;
                        push_item(msg, slot_idx, value);
                    }
                } else if let PlanType::Msg(mi) = field.ty {
                    check_wire_type(WireType::LengthDelimited, wire_type)?;
                    let mut sub = self.read_delimited(buf)?;
                    let mut value = self.empty_msg(mi);
                    self.enter(depth)?;
                    self.merge_buf(mi, &mut value, &mut sub, input_len, depth - 1)?;
                    push_item(msg, slot_idx, Value::Msg(value));
                } else {
                    check_wire_type(field.elem_wire, wire_type)?;
                    let value = self.read_scalar(field, buf, input_len)?;
                    push_item(msg, slot_idx, value);
                }
            }
            Occurrence::Required | Occurrence::Optional => {
                if let PlanType::Msg(mi) = field.ty {
                    // Repeated occurrences of a sub-message field merge
                    // into the accumulated value rather than replacing it.
                    check_wire_type(WireType::LengthDelimited, wire_type)?;
                    let mut sub = self.read_delimited(buf)?;
                    self.enter(depth)?;
                    let slot = &mut msg.fields[slot_idx];
                    if !matches!(slot, Some(Value::Msg(_))) {
                        *slot = Some(Value::Msg(self.empty_msg(mi)));
                    }
                    if let Some(Value::Msg(existing)) = slot {
                        self.merge_buf(mi, existing, &mut sub, input_len, depth - 1)?;
                    }
                } else {
                    // Scalars and enums are last-wins.
                    check_wire_type(field.elem_wire, wire_type)?;
                    let value = self.read_scalar(field, buf, input_len)?;
                    msg.fields[slot_idx] = Some(value);
                }
            }
        }
        Ok(())
    }

    fn enter(&self, depth: u32) -> Result<(), DecodeError> {
        if depth == 0 {
            Err(DecodeError::recursion_limit())
        } else {
            Ok(())
        }
    }

    fn read_delimited(&self, buf: &mut Bytes) -> Result<Bytes, DecodeError> {
        let len = read_len(buf)?;
        Ok(buf.split_to(len))
    }

    /// Reads one scalar (or enum) value; inverts the corresponding
    /// encoder rule exactly.
    fn read_scalar(
        &self,
        field: &FieldPlan,
        buf: &mut Bytes,
        input_len: usize,
    ) -> Result<Value, DecodeError> {
        let value = match &field.ty {
            PlanType::Int32 => {
                let v = decode_varint(buf)?;
                Value::Int(i64::from(v as i32))
            }
            PlanType::Int64 => Value::Int(decode_varint(buf)? as i64),
            PlanType::Uint32 => Value::Uint(u64::from(decode_varint(buf)? as u32)),
            PlanType::Uint64 => Value::Uint(decode_varint(buf)?),
            PlanType::Sint32 => Value::Int(i64::from(zigzag_decode32(decode_varint(buf)?))),
            PlanType::Sint64 => Value::Int(zigzag_decode64(decode_varint(buf)?)),
            PlanType::Bool => Value::Bool(decode_varint(buf)? != 0),
            PlanType::Fixed32 => {
                self.need(buf, 4)?;
                Value::Uint(u64::from(buf.get_u32_le()))
            }
            PlanType::Sfixed32 => {
                self.need(buf, 4)?;
                Value::Int(i64::from(buf.get_i32_le()))
            }
            PlanType::Float => {
                self.need(buf, 4)?;
                Value::Double(f64::from(buf.get_f32_le()))
            }
            PlanType::Fixed64 => {
                self.need(buf, 8)?;
                Value::Uint(buf.get_u64_le())
            }
            PlanType::Sfixed64 => {
                self.need(buf, 8)?;
                Value::Int(buf.get_i64_le())
            }
            PlanType::Double => {
                self.need(buf, 8)?;
                Value::Double(buf.get_f64_le())
            }
            PlanType::Str => {
                let bytes = self.read_delimited(buf)?;
                match String::from_utf8(bytes.to_vec()) {
                    Ok(s) => Value::Str(s),
                    Err(_) => return Err(DecodeError::invalid_utf8()),
                }
            }
            PlanType::Bytes => {
                let len = read_len(buf)?;
                Value::Bytes(self.take_bytes(buf, len, input_len))
            }
            PlanType::Enum(ei) => {
                // The wire carries the sign-extended number; reinterpret
                // the low 32 bits.
                let number = decode_varint(buf)? as u32 as i32;
                match self.enums[*ei].by_number.get(&number) {
                    Some(symbol) => Value::Enum(symbol.clone()),
                    None => Value::Int(i64::from(number)),
                }
            }
            PlanType::Msg(_) => unreachable!("sub-messages are framed by the caller"),
        };
        Ok(value)
    }

    /// Slices `len` bytes off the front, aliasing or copying per the
    /// negotiated `bytes` strategy. The observable bytes are identical
    /// either way.
    fn take_bytes(&self, buf: &mut Bytes, len: usize, input_len: usize) -> Bytes {
        let copy = match self.features.copy_bytes {
            CopyBytes::Never => false,
            CopyBytes::Always | CopyBytes::Auto => true,
            CopyBytes::Threshold(t) => {
                input_len as u64 >= u64::from(t).saturating_mul(len as u64)
            }
        };
        if copy {
            let copied = Bytes::copy_from_slice(&buf.chunk()[..len]);
            buf.advance(len);
            copied
        } else {
            buf.split_to(len)
        }
    }

    fn need(&self, buf: &Bytes, width: usize) -> Result<(), DecodeError> {
        if buf.remaining() < width {
            return Err(DecodeError::truncated());
        }
        Ok(())
    }
}

fn read_len(buf: &mut Bytes) -> Result<usize, DecodeError> {
    let len = decode_varint(buf)?;
    if len > buf.remaining() as u64 {
        return Err(DecodeError::truncated());
    }
    Ok(len as usize)
}

fn push_item(msg: &mut MsgValue, slot_idx: usize, value: Value) {
    let slot = &mut msg.fields[slot_idx];
    match slot {
        Some(Value::List(items)) => items.push(value),
        _ => *slot = Some(Value::List(vec![value])),
    }
}
