//! Raw definitions, as produced by the parser collaborator.
//!
//! This is the pre-normalization shape: definitions may be nested, type
//! references are unresolved name strings, and field options are
//! uninterpreted literals. [`crate::Config::compile_defs`] accepts this
//! shape directly, bypassing the import resolver.

use crate::schema::{FieldType, Occurrence};

/// One parsed `.proto` file.
#[derive(Clone, Debug, PartialEq)]
pub struct ProtoFile {
    /// The declared `package`, if any (dotted form, no leading dot).
    pub package: Option<String>,
    /// Declared imports, by import name.
    pub imports: Vec<String>,
    pub decls: Vec<Decl>,
}

/// A raw top-level declaration.
#[derive(Clone, Debug, PartialEq)]
pub enum Decl {
    Message(MessageAst),
    Enum(EnumAst),
    Extend(ExtendAst),
}

#[derive(Clone, Debug, PartialEq)]
pub struct MessageAst {
    pub name: String,
    pub fields: Vec<FieldAst>,
    pub messages: Vec<MessageAst>,
    pub enums: Vec<EnumAst>,
    pub extends: Vec<ExtendAst>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumAst {
    pub name: String,
    pub values: Vec<(String, i32)>,
}

/// An `extend` block; its fields are appended to the target message
/// during normalization.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtendAst {
    /// The target message, as written (possibly relative).
    pub target: String,
    pub fields: Vec<FieldAst>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldAst {
    pub name: String,
    pub fnum: u32,
    pub ty: TypeAst,
    pub occurrence: Occurrence,
    pub opts: Vec<OptAst>,
}

/// A field type as written: either one of the fifteen scalar keywords or
/// a (possibly relative, possibly `.`-anchored) type name.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeAst {
    Scalar(FieldType),
    Named(String),
}

/// A raw field option. Only `packed` and `default` are honored; all other
/// options are carried as `Other` and dropped during normalization.
#[derive(Clone, Debug, PartialEq)]
pub enum OptAst {
    Packed(bool),
    Default(Literal),
    Other(String),
}

/// An option value literal, as written.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Int(i128),
    Float(f64),
    Bool(bool),
    Str(String),
    /// A bare identifier: an enum symbol, or `inf`/`-inf`/`nan`.
    Ident(String),
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Float(v) => write!(f, "{}", v),
            Literal::Bool(v) => write!(f, "{}", v),
            Literal::Str(v) => write!(f, "{:?}", v),
            Literal::Ident(v) => f.write_str(v),
        }
    }
}
