//! The synthesized codec.
//!
//! [`Codec::synthesize`] compiles a normalized schema into per-message,
//! per-field plans: precomputed key bytes, resolved enum/message
//! references (by index, so cyclic schemas cost nothing), wire types, and
//! packed fast-path sizes. The encode, decode, merge, and verify
//! operations then run over those plans.

use std::collections::HashMap;

use crate::encoding::{key_bytes, WireType};
use crate::error::Error;
use crate::features::Features;
use crate::schema::{Def, FieldType, Occurrence, Schema};
use crate::value::MsgValue;

mod decode;
mod encode;
mod merge;
mod verify;

pub use encode::EncodeOpts;

/// An executable codec for one schema: the in-memory form of the
/// generated artifact.
///
/// A `Codec` is immutable after synthesis and safe to share across
/// threads; every operation takes `&self` and keeps its scratch buffers
/// local to the call.
#[derive(Debug)]
pub struct Codec {
    schema: Schema,
    features: Features,
    msgs: Vec<MsgPlan>,
    msg_index: HashMap<String, usize>,
    enums: Vec<EnumPlan>,
}

#[derive(Debug)]
pub(crate) struct MsgPlan {
    pub name: String,
    pub fields: Vec<FieldPlan>,
    pub by_fnum: HashMap<u32, usize>,
}

#[derive(Debug)]
pub(crate) struct FieldPlan {
    pub name: String,
    pub fnum: u32,
    pub rnum: u32,
    pub ty: PlanType,
    pub occurrence: Occurrence,
    pub packed: bool,
    /// Precomputed key bytes: `varint((fnum << 3) | wire_type)`, with the
    /// length-delimited wire type when the field is packed.
    pub key: Vec<u8>,
    /// The wire type of a single element of this field.
    pub elem_wire: WireType,
}

impl FieldPlan {
    /// The statically known element width, for the packed fast path.
    pub fn fixed_size(&self) -> Option<usize> {
        match self.ty {
            PlanType::Fixed32 | PlanType::Sfixed32 | PlanType::Float => Some(4),
            PlanType::Fixed64 | PlanType::Sfixed64 | PlanType::Double => Some(8),
            _ => None,
        }
    }

    /// Whether a length-delimited occurrence of this repeated field is a
    /// packed block rather than a single element.
    pub fn packable(&self) -> bool {
        !matches!(self.ty, PlanType::Str | PlanType::Bytes | PlanType::Msg(_))
    }
}

/// A field type with references resolved to plan indices.
#[derive(Debug)]
pub(crate) enum PlanType {
    Sint32,
    Sint64,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Bool,
    Fixed32,
    Sfixed32,
    Float,
    Fixed64,
    Sfixed64,
    Double,
    Str,
    Bytes,
    Enum(usize),
    Msg(usize),
}

impl PlanType {
    pub fn kind_name(&self) -> &'static str {
        match self {
            PlanType::Sint32 => "sint32",
            PlanType::Sint64 => "sint64",
            PlanType::Int32 => "int32",
            PlanType::Int64 => "int64",
            PlanType::Uint32 => "uint32",
            PlanType::Uint64 => "uint64",
            PlanType::Bool => "bool",
            PlanType::Fixed32 => "fixed32",
            PlanType::Sfixed32 => "sfixed32",
            PlanType::Float => "float",
            PlanType::Fixed64 => "fixed64",
            PlanType::Sfixed64 => "sfixed64",
            PlanType::Double => "double",
            PlanType::Str => "string",
            PlanType::Bytes => "bytes",
            PlanType::Enum(_) => "enum",
            PlanType::Msg(_) => "message",
        }
    }
}

#[derive(Debug)]
pub(crate) struct EnumPlan {
    pub by_symbol: HashMap<String, i32>,
    /// First declared symbol per number; later aliases lose.
    pub by_number: HashMap<i32, String>,
}

impl Codec {
    /// Compiles the schema into executable plans. Fails only on broken
    /// internal invariants; the schema is expected to have passed
    /// normalization.
    pub fn synthesize(schema: Schema, features: Features) -> Result<Codec, Error> {
        let internal = |detail: String| Error::Internal {
            stage: "codec synthesis",
            detail,
        };

        let mut msg_index = HashMap::new();
        let mut enum_index = HashMap::new();
        for def in &schema.defs {
            match def {
                Def::Message(m) => {
                    msg_index.insert(m.name.clone(), msg_index.len());
                }
                Def::Enum(e) => {
                    enum_index.insert(e.name.clone(), enum_index.len());
                }
            }
        }

        let mut enums = Vec::with_capacity(enum_index.len());
        for e in schema.enums() {
            let mut by_symbol = HashMap::new();
            let mut by_number = HashMap::new();
            for value in &e.values {
                by_symbol.insert(value.name.clone(), value.number);
                by_number
                    .entry(value.number)
                    .or_insert_with(|| value.name.clone());
            }
            enums.push(EnumPlan {
                by_symbol,
                by_number,
            });
        }

        let mut msgs = Vec::with_capacity(msg_index.len());
        for m in schema.messages() {
            let mut fields = Vec::with_capacity(m.fields.len());
            let mut by_fnum = HashMap::with_capacity(m.fields.len());
            for field in &m.fields {
                let ty = match &field.ty {
                    FieldType::Sint32 => PlanType::Sint32,
                    FieldType::Sint64 => PlanType::Sint64,
                    FieldType::Int32 => PlanType::Int32,
                    FieldType::Int64 => PlanType::Int64,
                    FieldType::Uint32 => PlanType::Uint32,
                    FieldType::Uint64 => PlanType::Uint64,
                    FieldType::Bool => PlanType::Bool,
                    FieldType::Fixed32 => PlanType::Fixed32,
                    FieldType::Sfixed32 => PlanType::Sfixed32,
                    FieldType::Float => PlanType::Float,
                    FieldType::Fixed64 => PlanType::Fixed64,
                    FieldType::Sfixed64 => PlanType::Sfixed64,
                    FieldType::Double => PlanType::Double,
                    FieldType::String => PlanType::Str,
                    FieldType::Bytes => PlanType::Bytes,
                    FieldType::Enum(name) => PlanType::Enum(
                        *enum_index
                            .get(name)
                            .ok_or_else(|| internal(format!("unresolved enum {name}")))?,
                    ),
                    FieldType::Message(name) => PlanType::Msg(
                        *msg_index
                            .get(name)
                            .ok_or_else(|| internal(format!("unresolved message {name}")))?,
                    ),
                };
                let elem_wire = field.ty.wire_type();
                let key_wire = if field.packed {
                    WireType::LengthDelimited
                } else {
                    elem_wire
                };
                by_fnum.insert(field.fnum, fields.len());
                fields.push(FieldPlan {
                    name: field.name.clone(),
                    fnum: field.fnum,
                    rnum: field.rnum,
                    ty,
                    occurrence: field.occurrence,
                    packed: field.packed,
                    key: key_bytes(field.fnum, key_wire),
                    elem_wire,
                });
            }
            msgs.push(MsgPlan {
                name: m.name.clone(),
                fields,
                by_fnum,
            });
        }

        Ok(Codec {
            schema,
            features,
            msgs,
            msg_index,
            enums,
        })
    }

    /// Schema introspection: the normalized definitions this codec was
    /// synthesized from.
    pub fn msg_defs(&self) -> &Schema {
        &self.schema
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    /// An all-absent value of the named message type.
    pub fn new_msg(&self, name: &str) -> Option<MsgValue> {
        let &idx = self.msg_index.get(name)?;
        Some(self.empty_msg(idx))
    }

    pub(crate) fn empty_msg(&self, idx: usize) -> MsgValue {
        let plan = &self.msgs[idx];
        MsgValue::new(plan.name.clone(), plan.fields.len())
    }

    pub(crate) fn msg_plan_index(&self, name: &str) -> Option<usize> {
        self.msg_index.get(name).copied()
    }
}
