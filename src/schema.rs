//! The normalized schema model.
//!
//! A [`Schema`] is the output of the normalizer: definitions are flattened
//! to the top level, every type reference carries a fully-qualified name
//! (`pkg.Outer.Inner`, no leading dot), field numbers are validated, and
//! each field carries its dense `rnum` ordinal.

use std::fmt;

use crate::encoding::WireType;

/// A canonicalized sequence of definitions. After the topological sort,
/// message definitions appear in dependency order (definee before
/// referrer) when the reference graph is acyclic.
#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    pub defs: Vec<Def>,
}

impl Schema {
    pub fn message(&self, name: &str) -> Option<&MessageDef> {
        self.messages().find(|m| m.name == name)
    }

    pub fn enum_def(&self, name: &str) -> Option<&EnumDef> {
        self.enums().find(|e| e.name == name)
    }

    pub fn messages(&self) -> impl Iterator<Item = &MessageDef> {
        self.defs.iter().filter_map(|def| match def {
            Def::Message(m) => Some(m),
            Def::Enum(_) => None,
        })
    }

    pub fn enums(&self) -> impl Iterator<Item = &EnumDef> {
        self.defs.iter().filter_map(|def| match def {
            Def::Enum(e) => Some(e),
            Def::Message(_) => None,
        })
    }
}

/// A top-level definition: either an enum or a message.
#[derive(Clone, Debug, PartialEq)]
pub enum Def {
    Enum(EnumDef),
    Message(MessageDef),
}

impl Def {
    pub fn name(&self) -> &str {
        match self {
            Def::Enum(e) => &e.name,
            Def::Message(m) => &m.name,
        }
    }
}

/// A named, ordered list of (symbol, value) pairs. The wire encoding of a
/// value is the varint of its sign-extended two's-complement form, so
/// negative values occupy 10 bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct EnumDef {
    pub name: String,
    pub values: Vec<EnumValue>,
}

impl EnumDef {
    pub fn number(&self, symbol: &str) -> Option<i32> {
        self.values
            .iter()
            .find(|v| v.name == symbol)
            .map(|v| v.number)
    }

    /// The first symbol declared with `number`; later aliases lose.
    pub fn symbol(&self, number: i32) -> Option<&str> {
        self.values
            .iter()
            .find(|v| v.number == number)
            .map(|v| v.name.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumValue {
    pub name: String,
    pub number: i32,
}

/// A qualified name plus an ordered list of field descriptors.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl MessageDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_fnum(&self, fnum: u32) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.fnum == fnum)
    }
}

/// A single field descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDef {
    /// Symbolic identifier, unique within the message.
    pub name: String,
    /// The field number used on the wire.
    pub fnum: u32,
    /// Dense ordinal (1..N) used for positional access in decoded values;
    /// assigned in declaration order after extensions are applied.
    pub rnum: u32,
    pub ty: FieldType,
    pub occurrence: Occurrence,
    pub packed: bool,
    pub default: Option<DefaultValue>,
}

/// The tagged variant over the fifteen scalar kinds plus enum and message
/// references. References carry the fully-qualified definition name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
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
    String,
    Bytes,
    Enum(String),
    Message(String),
}

impl FieldType {
    /// The wire type of a single (non-packed) value of this type.
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldType::Sint32
            | FieldType::Sint64
            | FieldType::Int32
            | FieldType::Int64
            | FieldType::Uint32
            | FieldType::Uint64
            | FieldType::Bool
            | FieldType::Enum(_) => WireType::Varint,
            FieldType::Fixed32 | FieldType::Sfixed32 | FieldType::Float => WireType::ThirtyTwoBit,
            FieldType::Fixed64 | FieldType::Sfixed64 | FieldType::Double => WireType::SixtyFourBit,
            FieldType::String | FieldType::Bytes | FieldType::Message(_) => {
                WireType::LengthDelimited
            }
        }
    }

    /// The statically known element width, for the packed fast path.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            FieldType::Fixed32 | FieldType::Sfixed32 | FieldType::Float => Some(4),
            FieldType::Fixed64 | FieldType::Sfixed64 | FieldType::Double => Some(8),
            _ => None,
        }
    }

    /// Whether `packed` is admissible on a repeated field of this type.
    pub fn is_packable(&self) -> bool {
        !matches!(
            self,
            FieldType::String | FieldType::Bytes | FieldType::Message(_)
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Sint32 => "sint32",
            FieldType::Sint64 => "sint64",
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::Uint32 => "uint32",
            FieldType::Uint64 => "uint64",
            FieldType::Bool => "bool",
            FieldType::Fixed32 => "fixed32",
            FieldType::Sfixed32 => "sfixed32",
            FieldType::Float => "float",
            FieldType::Fixed64 => "fixed64",
            FieldType::Sfixed64 => "sfixed64",
            FieldType::Double => "double",
            FieldType::String => "string",
            FieldType::Bytes => "bytes",
            FieldType::Enum(name) | FieldType::Message(name) => name,
        };
        f.write_str(name)
    }
}

/// How often a field may occur in a well-formed message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Occurrence {
    Required,
    Optional,
    Repeated,
}

/// A canonicalized `default` option value, well-typed for its field.
#[derive(Clone, Debug, PartialEq)]
pub enum DefaultValue {
    Int(i64),
    Uint(u64),
    Bool(bool),
    Double(f64),
    Str(String),
    Bytes(Vec<u8>),
    Enum(String),
}
