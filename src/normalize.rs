//! The schema normalizer.
//!
//! Turns raw definitions into a [`Schema`]: type references are
//! absolutified from their lexical scope and resolved, nested definitions
//! are flattened to the top level, `extend` blocks are applied, fields get
//! dense `rnum` ordinals, options are canonicalized, and the schema
//! invariants are enforced. All violations are collected and reported
//! together.

use std::collections::HashMap;

use itertools::Itertools;
use log::debug;
use multimap::MultiMap;

use crate::ast::{Decl, EnumAst, ExtendAst, FieldAst, Literal, MessageAst, OptAst, ProtoFile, TypeAst};
use crate::encoding::MAX_FNUM;
use crate::error::{DefsError, Error};
use crate::schema::{
    Def, DefaultValue, EnumDef, EnumValue, FieldDef, FieldType, MessageDef, Occurrence, Schema,
};

pub fn normalize(files: &[ProtoFile]) -> Result<Schema, Error> {
    debug!("normalizing {} file(s)", files.len());
    let mut normalizer = Normalizer {
        kinds: HashMap::new(),
        errors: Vec::new(),
        drafts: Vec::new(),
        extends: MultiMap::new(),
    };

    // Every declared type name must be known before references resolve.
    for file in files {
        let mut scope = package_scope(file);
        for decl in &file.decls {
            normalizer.collect_names(&mut scope, decl);
        }
    }
    for file in files {
        let mut scope = package_scope(file);
        for decl in &file.decls {
            normalizer.flatten_decl(&mut scope, decl);
        }
    }
    normalizer.finish()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Message,
    Enum,
}

enum Draft {
    Enum(EnumDef),
    Message(MessageDraft),
}

struct MessageDraft {
    name: String,
    fields: Vec<FieldDraft>,
}

#[derive(Clone)]
struct FieldDraft {
    name: String,
    fnum: u32,
    ty: FieldType,
    occurrence: Occurrence,
    opts: Vec<OptAst>,
}

struct Normalizer {
    kinds: HashMap<String, Kind>,
    errors: Vec<DefsError>,
    drafts: Vec<Draft>,
    extends: MultiMap<String, FieldDraft>,
}

fn package_scope(file: &ProtoFile) -> Vec<String> {
    file.package
        .as_deref()
        .map(|p| p.split('.').map(str::to_string).collect())
        .unwrap_or_default()
}

fn qualify(scope: &[String], name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope.join("."), name)
    }
}

impl Normalizer {
    fn collect_names(&mut self, scope: &mut Vec<String>, decl: &Decl) {
        match decl {
            Decl::Message(m) => self.collect_message(scope, m),
            Decl::Enum(e) => self.declare(qualify(scope, &e.name), Kind::Enum),
            Decl::Extend(_) => {}
        }
    }

    fn collect_message(&mut self, scope: &mut Vec<String>, m: &MessageAst) {
        self.declare(qualify(scope, &m.name), Kind::Message);
        scope.push(m.name.clone());
        for e in &m.enums {
            self.declare(qualify(scope, &e.name), Kind::Enum);
        }
        for nested in &m.messages {
            self.collect_message(scope, nested);
        }
        scope.pop();
    }

    fn declare(&mut self, name: String, kind: Kind) {
        if self.kinds.insert(name.clone(), kind).is_some() {
            self.errors.push(DefsError::DuplicateDef { name });
        }
    }

    /// Resolves a written type name from the innermost scope outward. A
    /// leading dot anchors the name at the root scope.
    fn resolve(&self, scope: &[String], name: &str) -> Option<(String, Kind)> {
        if let Some(absolute) = name.strip_prefix('.') {
            return self.kinds.get(absolute).map(|k| (absolute.to_string(), *k));
        }
        for depth in (0..=scope.len()).rev() {
            let candidate = qualify(&scope[..depth], name);
            if let Some(kind) = self.kinds.get(&candidate) {
                return Some((candidate, *kind));
            }
        }
        None
    }

    fn flatten_decl(&mut self, scope: &mut Vec<String>, decl: &Decl) {
        match decl {
            Decl::Message(m) => self.flatten_message(scope, m),
            Decl::Enum(e) => self.push_enum(scope, e),
            Decl::Extend(x) => self.record_extend(scope, x),
        }
    }

    fn push_enum(&mut self, scope: &[String], e: &EnumAst) {
        self.drafts.push(Draft::Enum(EnumDef {
            name: qualify(scope, &e.name),
            values: e
                .values
                .iter()
                .map(|(name, number)| EnumValue {
                    name: name.clone(),
                    number: *number,
                })
                .collect(),
        }));
    }

    fn flatten_message(&mut self, scope: &mut Vec<String>, m: &MessageAst) {
        let fq = qualify(scope, &m.name);
        scope.push(m.name.clone());
        let fields = m
            .fields
            .iter()
            .map(|f| self.draft_field(scope, &fq, f))
            .collect();
        self.drafts
            .push(Draft::Message(MessageDraft { name: fq, fields }));
        for e in &m.enums {
            self.push_enum(scope, e);
        }
        for nested in &m.messages {
            self.flatten_message(scope, nested);
        }
        for x in &m.extends {
            self.record_extend(scope, x);
        }
        scope.pop();
    }

    fn draft_field(&mut self, scope: &[String], msg_fq: &str, f: &FieldAst) -> FieldDraft {
        let ty = match &f.ty {
            TypeAst::Scalar(scalar) => scalar.clone(),
            TypeAst::Named(name) => match self.resolve(scope, name) {
                Some((fq, Kind::Message)) => FieldType::Message(fq),
                Some((fq, Kind::Enum)) => FieldType::Enum(fq),
                None => {
                    self.errors.push(DefsError::UnresolvedRef {
                        msg: msg_fq.to_string(),
                        field: f.name.clone(),
                        name: name.clone(),
                    });
                    FieldType::Message(name.clone())
                }
            },
        };
        FieldDraft {
            name: f.name.clone(),
            fnum: f.fnum,
            ty,
            occurrence: f.occurrence,
            opts: f.opts.clone(),
        }
    }

    fn record_extend(&mut self, scope: &[String], x: &ExtendAst) {
        match self.resolve(scope, &x.target) {
            Some((fq, Kind::Message)) => {
                let fields: Vec<FieldDraft> = x
                    .fields
                    .iter()
                    .map(|f| self.draft_field(scope, &fq, f))
                    .collect();
                for field in fields {
                    self.extends.insert(fq.clone(), field);
                }
            }
            _ => self.errors.push(DefsError::BadExtendTarget {
                name: x.target.clone(),
            }),
        }
    }

    fn finish(mut self) -> Result<Schema, Error> {
        let drafts = std::mem::take(&mut self.drafts);
        let enums: HashMap<String, EnumDef> = drafts
            .iter()
            .filter_map(|d| match d {
                Draft::Enum(e) => Some((e.name.clone(), e.clone())),
                Draft::Message(_) => None,
            })
            .collect();

        let mut defs = Vec::with_capacity(drafts.len());
        for draft in drafts {
            match draft {
                Draft::Enum(e) => {
                    self.validate_enum(&e);
                    defs.push(Def::Enum(e));
                }
                Draft::Message(m) => {
                    let MessageDraft { name, mut fields } = m;
                    let extensions: Vec<FieldDraft> =
                        self.extends.get_vec(&name).cloned().unwrap_or_default();
                    fields.extend(extensions);

                    let mut finished = Vec::with_capacity(fields.len());
                    for (idx, field) in fields.into_iter().enumerate() {
                        finished.push(self.finish_field(&name, idx as u32 + 1, field, &enums));
                    }
                    let msg = MessageDef {
                        name,
                        fields: finished,
                    };
                    self.validate_message(&msg);
                    defs.push(Def::Message(msg));
                }
            }
        }

        if self.errors.is_empty() {
            Ok(Schema { defs })
        } else {
            Err(Error::InvalidSchema(self.errors))
        }
    }

    /// Canonicalizes the option list: the last `packed`/`default` wins and
    /// unknown options are dropped. The `default` literal is converted to
    /// a typed value.
    fn finish_field(
        &mut self,
        msg: &str,
        rnum: u32,
        draft: FieldDraft,
        enums: &HashMap<String, EnumDef>,
    ) -> FieldDef {
        let mut packed = false;
        let mut default_lit = None;
        for opt in draft.opts {
            match opt {
                OptAst::Packed(b) => packed = b,
                OptAst::Default(lit) => default_lit = Some(lit),
                OptAst::Other(_) => {}
            }
        }

        let mut default = None;
        if let Some(lit) = default_lit {
            if draft.occurrence == Occurrence::Repeated {
                self.errors.push(DefsError::BadDefault {
                    msg: msg.to_string(),
                    field: draft.name.clone(),
                    literal: lit.to_string(),
                    ty: "a repeated field".to_string(),
                });
            } else {
                match typed_default(&draft.ty, &lit, enums) {
                    Some(v) => default = Some(v),
                    None => self.errors.push(DefsError::BadDefault {
                        msg: msg.to_string(),
                        field: draft.name.clone(),
                        literal: lit.to_string(),
                        ty: draft.ty.to_string(),
                    }),
                }
            }
        }

        FieldDef {
            name: draft.name,
            fnum: draft.fnum,
            rnum,
            ty: draft.ty,
            occurrence: draft.occurrence,
            packed,
            default,
        }
    }

    fn validate_message(&mut self, msg: &MessageDef) {
        for fnum in msg.fields.iter().map(|f| f.fnum).duplicates() {
            self.errors.push(DefsError::DuplicateFnum {
                msg: msg.name.clone(),
                fnum,
            });
        }
        for name in msg.fields.iter().map(|f| f.name.as_str()).duplicates() {
            self.errors.push(DefsError::DuplicateFieldName {
                msg: msg.name.clone(),
                field: name.to_string(),
            });
        }
        for f in &msg.fields {
            if f.fnum < 1 || f.fnum > MAX_FNUM || (19000..=19999).contains(&f.fnum) {
                self.errors.push(DefsError::BadFnum {
                    msg: msg.name.clone(),
                    field: f.name.clone(),
                    fnum: f.fnum,
                });
            }
            if f.packed && !(f.occurrence == Occurrence::Repeated && f.ty.is_packable()) {
                self.errors.push(DefsError::BadPacked {
                    msg: msg.name.clone(),
                    field: f.name.clone(),
                });
            }
        }
        debug_assert!(msg
            .fields
            .iter()
            .enumerate()
            .all(|(i, f)| f.rnum == i as u32 + 1));
    }

    fn validate_enum(&mut self, e: &EnumDef) {
        if e.values.is_empty() {
            self.errors.push(DefsError::EmptyEnum {
                name: e.name.clone(),
            });
        }
        for symbol in e.values.iter().map(|v| v.name.as_str()).duplicates() {
            self.errors.push(DefsError::DuplicateEnumSymbol {
                name: e.name.clone(),
                symbol: symbol.to_string(),
            });
        }
    }
}

fn typed_default(
    ty: &FieldType,
    lit: &Literal,
    enums: &HashMap<String, EnumDef>,
) -> Option<DefaultValue> {
    match ty {
        FieldType::Int32 | FieldType::Sint32 | FieldType::Sfixed32 => {
            int_default(lit, i64::from(i32::MIN), i64::from(i32::MAX))
        }
        FieldType::Int64 | FieldType::Sint64 | FieldType::Sfixed64 => {
            int_default(lit, i64::MIN, i64::MAX)
        }
        FieldType::Uint32 | FieldType::Fixed32 => uint_default(lit, u64::from(u32::MAX)),
        FieldType::Uint64 | FieldType::Fixed64 => uint_default(lit, u64::MAX),
        FieldType::Bool => match lit {
            Literal::Bool(b) => Some(DefaultValue::Bool(*b)),
            _ => None,
        },
        FieldType::Float | FieldType::Double => match lit {
            Literal::Float(f) => Some(DefaultValue::Double(*f)),
            Literal::Int(i) => Some(DefaultValue::Double(*i as f64)),
            Literal::Ident(id) => match id.as_str() {
                "inf" => Some(DefaultValue::Double(f64::INFINITY)),
                "-inf" => Some(DefaultValue::Double(f64::NEG_INFINITY)),
                "nan" => Some(DefaultValue::Double(f64::NAN)),
                _ => None,
            },
            _ => None,
        },
        FieldType::String => match lit {
            Literal::Str(s) => Some(DefaultValue::Str(s.clone())),
            _ => None,
        },
        FieldType::Bytes => match lit {
            Literal::Str(s) => Some(DefaultValue::Bytes(s.clone().into_bytes())),
            _ => None,
        },
        FieldType::Enum(name) => match lit {
            Literal::Ident(symbol) => enums
                .get(name)
                .and_then(|e| e.number(symbol))
                .map(|_| DefaultValue::Enum(symbol.clone())),
            _ => None,
        },
        FieldType::Message(_) => None,
    }
}

fn int_default(lit: &Literal, min: i64, max: i64) -> Option<DefaultValue> {
    match lit {
        Literal::Int(i) if *i >= i128::from(min) && *i <= i128::from(max) => {
            Some(DefaultValue::Int(*i as i64))
        }
        _ => None,
    }
}

fn uint_default(lit: &Literal, max: u64) -> Option<DefaultValue> {
    match lit {
        Literal::Int(i) if *i >= 0 && *i <= i128::from(max) => Some(DefaultValue::Uint(*i as u64)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_proto;

    fn normalize_src(src: &str) -> Result<Schema, Error> {
        let file = parse_proto(src).unwrap();
        normalize(std::slice::from_ref(&file))
    }

    fn defs_errors(result: Result<Schema, Error>) -> Vec<DefsError> {
        match result {
            Err(Error::InvalidSchema(errors)) => errors,
            other => panic!("expected InvalidSchema, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn flattens_and_absolutifies_nested_definitions() {
        let schema = normalize_src(
            "package p;
             message Outer {
                 message Inner { required int32 x = 1; }
                 enum Kind { A = 0; }
                 required Inner inner = 1;
                 optional Kind kind = 2;
                 optional Outer parent = 3;
             }",
        )
        .unwrap();

        let outer = schema.message("p.Outer").unwrap();
        assert_eq!(
            outer.field("inner").unwrap().ty,
            FieldType::Message("p.Outer.Inner".to_string())
        );
        assert_eq!(
            outer.field("kind").unwrap().ty,
            FieldType::Enum("p.Outer.Kind".to_string())
        );
        assert_eq!(
            outer.field("parent").unwrap().ty,
            FieldType::Message("p.Outer".to_string())
        );
        assert!(schema.message("p.Outer.Inner").is_some());
        assert!(schema.enum_def("p.Outer.Kind").is_some());
    }

    #[test]
    fn applies_extensions_and_numbers_fields_densely() {
        let schema = normalize_src(
            "message M { required int32 a = 1; }
             extend M { optional string b = 100; optional bool c = 101; }",
        )
        .unwrap();
        let m = schema.message("M").unwrap();
        let rnums: Vec<(u32, u32)> = m.fields.iter().map(|f| (f.fnum, f.rnum)).collect();
        assert_eq!(rnums, [(1, 1), (100, 2), (101, 3)]);
    }

    #[test]
    fn canonicalizes_defaults() {
        let schema = normalize_src(
            "message M {
                 optional int32 a = 1 [default = -7];
                 optional double b = 2 [default = 4];
                 optional bytes c = 3 [default = \"ab\"];
                 optional E e = 4 [default = ON];
             }
             enum E { OFF = 0; ON = 1; }",
        )
        .unwrap();
        let m = schema.message("M").unwrap();
        assert_eq!(m.field("a").unwrap().default, Some(DefaultValue::Int(-7)));
        assert_eq!(
            m.field("b").unwrap().default,
            Some(DefaultValue::Double(4.0))
        );
        assert_eq!(
            m.field("c").unwrap().default,
            Some(DefaultValue::Bytes(b"ab".to_vec()))
        );
        assert_eq!(
            m.field("e").unwrap().default,
            Some(DefaultValue::Enum("ON".to_string()))
        );
    }

    #[test]
    fn rejects_duplicate_field_numbers() {
        let errors = defs_errors(normalize_src(
            "message M { required int32 a = 1; required int32 b = 1; }",
        ));
        assert_eq!(
            errors,
            [DefsError::DuplicateFnum {
                msg: "M".to_string(),
                fnum: 1
            }]
        );
    }

    #[test]
    fn rejects_unresolved_references() {
        let errors = defs_errors(normalize_src("message M { required Missing x = 1; }"));
        assert!(matches!(&errors[0], DefsError::UnresolvedRef { name, .. } if name == "Missing"));
    }

    #[test]
    fn rejects_packed_on_inadmissible_fields() {
        let errors = defs_errors(normalize_src(
            "message M {
                 optional int32 a = 1 [packed = true];
                 repeated string b = 2 [packed = true];
                 repeated int32 ok = 3 [packed = true];
             }",
        ));
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| matches!(e, DefsError::BadPacked { .. })));
    }

    #[test]
    fn rejects_ill_typed_defaults() {
        let errors = defs_errors(normalize_src(
            "message M {
                 optional int32 a = 1 [default = \"nope\"];
                 optional uint32 b = 2 [default = -1];
                 optional E e = 3 [default = MISSING];
             }
             enum E { OFF = 0; }",
        ));
        assert_eq!(errors.len(), 3);
        assert!(errors
            .iter()
            .all(|e| matches!(e, DefsError::BadDefault { .. })));
    }

    #[test]
    fn rejects_out_of_range_and_reserved_field_numbers() {
        let errors = defs_errors(normalize_src(
            "message M { required int32 a = 19500; required int32 b = 536870912; }",
        ));
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(e, DefsError::BadFnum { .. })));
    }

    #[test]
    fn rejects_duplicate_definitions_and_bad_extend_targets() {
        let errors = defs_errors(normalize_src(
            "message M {} message M {} extend Nope { optional int32 x = 1; }",
        ));
        assert!(errors.contains(&DefsError::DuplicateDef {
            name: "M".to_string()
        }));
        assert!(errors.contains(&DefsError::BadExtendTarget {
            name: "Nope".to_string()
        }));
    }

    #[test]
    fn rejects_empty_and_aliased_enums() {
        let errors = defs_errors(normalize_src(
            "enum Empty {} enum E { A = 0; A = 1; }",
        ));
        assert!(errors.contains(&DefsError::EmptyEnum {
            name: "Empty".to_string()
        }));
        assert!(errors.contains(&DefsError::DuplicateEnumSymbol {
            name: "E".to_string(),
            symbol: "A".to_string()
        }));
    }

    #[test]
    fn sibling_scope_resolution_prefers_the_innermost_match() {
        let schema = normalize_src(
            "package p;
             message A { required int32 x = 1; }
             message Outer {
                 message A { required int32 y = 1; }
                 required A a = 1;
                 required .p.A rooted = 2;
             }",
        )
        .unwrap();
        let outer = schema.message("p.Outer").unwrap();
        assert_eq!(
            outer.field("a").unwrap().ty,
            FieldType::Message("p.Outer.A".to_string())
        );
        assert_eq!(
            outer.field("rooted").unwrap().ty,
            FieldType::Message("p.A".to_string())
        );
    }
}
