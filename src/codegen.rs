//! The artifact emitter.
//!
//! Renders the generated codec module — an embedded copy of the
//! normalized schema plus the public codec operations, delegating to the
//! pbgen runtime — and, when typed declarations are enabled, a companion
//! `<module>_types.rs` file of plain struct/enum declarations. The
//! rendering is deterministic: equal schemas produce byte-equal output.

use std::collections::HashSet;
use std::path::Path;

use heck::{ToSnakeCase, ToUpperCamelCase};
use itertools::Itertools;
use log::debug;

use crate::codec::Codec;
use crate::config::{Artifact, CompiledCodec};
use crate::error::Error;
use crate::features::{CopyBytes, Features, VerifyMode};
use crate::fileops::FileOps;
use crate::schema::{Def, DefaultValue, FieldType, Occurrence, Schema};

pub(crate) fn emit(
    codec: Codec,
    module_name: &str,
    out_dir: &Path,
    in_memory: bool,
    ops: &dyn FileOps,
) -> Result<Artifact, Error> {
    let source = generate_module(&codec, module_name);
    let types = codec
        .features()
        .type_specs
        .then(|| generate_types(codec.msg_defs(), module_name));

    if in_memory {
        debug!("returning in-memory artifact for {module_name}");
        return Ok(Artifact::Memory(CompiledCodec {
            name: module_name.to_string(),
            codec,
            source,
            types,
        }));
    }

    let source_path = out_dir.join(format!("{module_name}.rs"));
    ops.write_file(&source_path, source.as_bytes())?;
    debug!("wrote {}", source_path.display());

    let types_path = match types {
        Some(types) => {
            let path = out_dir.join(format!("{module_name}_types.rs"));
            ops.write_file(&path, types.as_bytes())?;
            debug!("wrote {}", path.display());
            Some(path)
        }
        None => None,
    };

    Ok(Artifact::Files {
        source: source_path,
        types: types_path,
    })
}

struct Generator {
    buf: String,
    depth: u8,
}

impl Generator {
    fn new() -> Generator {
        Generator {
            buf: String::new(),
            depth: 0,
        }
    }

    fn line(&mut self, line: &str) {
        if line.is_empty() {
            self.buf.push('\n');
            return;
        }
        for _ in 0..self.depth {
            self.buf.push_str("    ");
        }
        self.buf.push_str(line);
        self.buf.push('\n');
    }

    fn open(&mut self, line: &str) {
        self.line(line);
        self.depth += 1;
    }

    fn close(&mut self, line: &str) {
        self.depth -= 1;
        self.line(line);
    }
}

fn generate_module(codec: &Codec, module_name: &str) -> String {
    let mut g = Generator::new();
    g.line("// This file is @generated by pbgen. Do not edit.");
    g.line(&format!("// Codec module for schema `{module_name}`."));
    g.line("");
    g.line("use std::sync::OnceLock;");
    g.line("");

    g.line("/// The synthesized codec for this schema.");
    g.open("pub fn codec() -> &'static pbgen::Codec {");
    g.line("static CODEC: OnceLock<pbgen::Codec> = OnceLock::new();");
    g.open("CODEC.get_or_init(|| {");
    g.line("pbgen::Codec::synthesize(schema(), features())");
    g.line("    .expect(\"schema was validated when this module was generated\")");
    g.close("})");
    g.close("}");
    g.line("");

    g.open("pub fn encode_msg(msg: &pbgen::MsgValue) -> Result<Vec<u8>, pbgen::EncodeError> {");
    g.line("codec().encode_msg(msg)");
    g.close("}");
    g.line("");

    g.open(
        "pub fn encode_msg_with(msg: &pbgen::MsgValue, opts: pbgen::EncodeOpts) \
         -> Result<Vec<u8>, pbgen::EncodeError> {",
    );
    g.line("codec().encode_msg_with(msg, opts)");
    g.close("}");
    g.line("");

    g.open(
        "pub fn decode_msg(buf: impl Into<pbgen::bytes::Bytes>, msg_name: &str) \
         -> Result<pbgen::MsgValue, pbgen::DecodeError> {",
    );
    g.line("codec().decode_msg(buf, msg_name)");
    g.close("}");
    g.line("");

    g.open("pub fn merge_msgs(prev: &pbgen::MsgValue, new: &pbgen::MsgValue) -> pbgen::MsgValue {");
    g.line("codec().merge_msgs(prev, new)");
    g.close("}");
    g.line("");

    g.open("pub fn verify_msg(msg: &pbgen::MsgValue) -> Result<(), pbgen::VerifyError> {");
    g.line("codec().verify_msg(msg)");
    g.close("}");
    g.line("");

    g.open("pub fn get_msg_defs() -> &'static pbgen::Schema {");
    g.line("codec().msg_defs()");
    g.close("}");
    g.line("");

    push_features_fn(&mut g, codec.features());
    g.line("");
    push_schema_fn(&mut g, codec.msg_defs());

    g.buf
}

fn push_features_fn(g: &mut Generator, features: &Features) {
    let copy_bytes = match features.copy_bytes {
        CopyBytes::Never => "pbgen::CopyBytes::Never".to_string(),
        CopyBytes::Always => "pbgen::CopyBytes::Always".to_string(),
        CopyBytes::Auto => "pbgen::CopyBytes::Auto".to_string(),
        CopyBytes::Threshold(t) => format!("pbgen::CopyBytes::Threshold({t})"),
    };
    let verify = match features.verify {
        VerifyMode::Always => "pbgen::VerifyMode::Always",
        VerifyMode::Optionally => "pbgen::VerifyMode::Optionally",
        VerifyMode::Never => "pbgen::VerifyMode::Never",
    };

    g.open("fn features() -> pbgen::Features {");
    g.open("pbgen::Features {");
    g.line(&format!("type_specs: {},", features.type_specs));
    g.line(&format!("copy_bytes: {copy_bytes},"));
    g.line(&format!("verify: {verify},"));
    g.close("}");
    g.close("}");
}

fn push_schema_fn(g: &mut Generator, schema: &Schema) {
    g.open("fn schema() -> pbgen::Schema {");
    g.open("pbgen::Schema {");
    g.open("defs: vec![");
    for def in &schema.defs {
        match def {
            Def::Enum(e) => {
                g.open("pbgen::Def::Enum(pbgen::EnumDef {");
                g.line(&format!("name: {:?}.to_string(),", e.name));
                g.open("values: vec![");
                for value in &e.values {
                    g.line(&format!(
                        "pbgen::EnumValue {{ name: {:?}.to_string(), number: {} }},",
                        value.name,
                        render_i32(value.number)
                    ));
                }
                g.close("],");
                g.close("}),");
            }
            Def::Message(m) => {
                g.open("pbgen::Def::Message(pbgen::MessageDef {");
                g.line(&format!("name: {:?}.to_string(),", m.name));
                g.open("fields: vec![");
                for field in &m.fields {
                    g.open("pbgen::FieldDef {");
                    g.line(&format!("name: {:?}.to_string(),", field.name));
                    g.line(&format!("fnum: {},", field.fnum));
                    g.line(&format!("rnum: {},", field.rnum));
                    g.line(&format!("ty: {},", render_field_type(&field.ty)));
                    g.line(&format!(
                        "occurrence: pbgen::Occurrence::{:?},",
                        field.occurrence
                    ));
                    g.line(&format!("packed: {},", field.packed));
                    g.line(&format!("default: {},", render_default(&field.default)));
                    g.close("},");
                }
                g.close("],");
                g.close("}),");
            }
        }
    }
    g.close("],");
    g.close("}");
    g.close("}");
}

fn render_field_type(ty: &FieldType) -> String {
    match ty {
        FieldType::Enum(name) => format!("pbgen::FieldType::Enum({:?}.to_string())", name),
        FieldType::Message(name) => format!("pbgen::FieldType::Message({:?}.to_string())", name),
        scalar => format!("pbgen::FieldType::{:?}", scalar),
    }
}

fn render_default(default: &Option<DefaultValue>) -> String {
    let Some(default) = default else {
        return "None".to_string();
    };
    let rendered = match default {
        DefaultValue::Int(i) if *i == i64::MIN => "pbgen::DefaultValue::Int(i64::MIN)".to_string(),
        DefaultValue::Int(i) => format!("pbgen::DefaultValue::Int({i})"),
        DefaultValue::Uint(u) => format!("pbgen::DefaultValue::Uint({u})"),
        DefaultValue::Bool(b) => format!("pbgen::DefaultValue::Bool({b})"),
        DefaultValue::Double(d) => format!("pbgen::DefaultValue::Double({})", render_f64(*d)),
        DefaultValue::Str(s) => format!("pbgen::DefaultValue::Str({:?}.to_string())", s),
        DefaultValue::Bytes(b) => format!(
            "pbgen::DefaultValue::Bytes(vec![{}])",
            b.iter().map(|byte| byte.to_string()).join(", ")
        ),
        DefaultValue::Enum(s) => format!("pbgen::DefaultValue::Enum({:?}.to_string())", s),
    };
    format!("Some({rendered})")
}

fn render_f64(value: f64) -> String {
    if value.is_nan() {
        "f64::NAN".to_string()
    } else if value == f64::INFINITY {
        "f64::INFINITY".to_string()
    } else if value == f64::NEG_INFINITY {
        "f64::NEG_INFINITY".to_string()
    } else {
        format!("{:?}", value)
    }
}

fn render_i32(value: i32) -> String {
    if value == i32::MIN {
        "i32::MIN".to_string()
    } else {
        value.to_string()
    }
}

fn generate_types(schema: &Schema, module_name: &str) -> String {
    let mut g = Generator::new();
    g.line("// This file is @generated by pbgen. Do not edit.");
    g.line(&format!("// Typed declarations for schema `{module_name}`."));

    for def in &schema.defs {
        g.line("");
        match def {
            Def::Enum(e) => {
                g.line(&format!("/// `{}`", e.name));
                g.line("#[derive(Clone, Copy, Debug, PartialEq, Eq)]");
                g.line("#[repr(i32)]");
                g.open(&format!("pub enum {} {{", rust_type_name(&e.name)));
                let mut seen = HashSet::new();
                for value in &e.values {
                    // Aliased numbers cannot be distinct Rust variants;
                    // the first declared symbol represents the number.
                    if seen.insert(value.number) {
                        g.line(&format!(
                            "{} = {},",
                            value.name.to_upper_camel_case(),
                            render_i32(value.number)
                        ));
                    }
                }
                g.close("}");
            }
            Def::Message(m) => {
                g.line(&format!("/// `{}`", m.name));
                g.line("#[derive(Clone, Debug, PartialEq)]");
                g.open(&format!("pub struct {} {{", rust_type_name(&m.name)));
                for field in &m.fields {
                    let ty = rust_field_type(&field.ty);
                    let ty = match field.occurrence {
                        Occurrence::Required => ty,
                        Occurrence::Optional => format!("Option<{ty}>"),
                        Occurrence::Repeated => format!("Vec<{ty}>"),
                    };
                    g.line(&format!("pub {}: {},", rust_field_name(&field.name), ty));
                }
                g.close("}");
            }
        }
    }

    g.buf
}

/// `pkg.Outer.Inner` becomes `PkgOuterInner`: the declarations live in one
/// flat file, so the qualified name is folded into the type name.
fn rust_type_name(fq_name: &str) -> String {
    fq_name
        .split('.')
        .map(|segment| segment.to_upper_camel_case())
        .collect()
}

fn rust_field_name(name: &str) -> String {
    let name = name.to_snake_case();
    match name.as_str() {
        // Raw identifiers are not allowed for these.
        "self" | "super" | "crate" | "extern" => format!("{name}_"),
        "as" | "async" | "await" | "box" | "break" | "const" | "continue" | "dyn" | "else"
        | "enum" | "false" | "fn" | "for" | "if" | "impl" | "in" | "let" | "loop" | "match"
        | "mod" | "move" | "mut" | "pub" | "ref" | "return" | "static" | "struct" | "trait"
        | "true" | "try" | "type" | "unsafe" | "use" | "where" | "while" => {
            format!("r#{name}")
        }
        _ => name,
    }
}

fn rust_field_type(ty: &FieldType) -> String {
    match ty {
        FieldType::Int32 | FieldType::Sint32 | FieldType::Sfixed32 => "i32".to_string(),
        FieldType::Int64 | FieldType::Sint64 | FieldType::Sfixed64 => "i64".to_string(),
        FieldType::Uint32 | FieldType::Fixed32 => "u32".to_string(),
        FieldType::Uint64 | FieldType::Fixed64 => "u64".to_string(),
        FieldType::Bool => "bool".to_string(),
        FieldType::Float => "f32".to_string(),
        FieldType::Double => "f64".to_string(),
        FieldType::String => "String".to_string(),
        FieldType::Bytes => "Vec<u8>".to_string(),
        FieldType::Enum(name) | FieldType::Message(name) => rust_type_name(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::negotiate;
    use crate::normalize::normalize;
    use crate::parse::parse_proto;

    fn codec(src: &str, type_specs: bool) -> Codec {
        let file = parse_proto(src).unwrap();
        let schema = normalize(std::slice::from_ref(&file)).unwrap();
        let (schema, cyclic) = crate::graph::sort_defs(schema);
        let (features, _) = negotiate(type_specs, CopyBytes::Never, VerifyMode::Optionally, cyclic);
        Codec::synthesize(schema, features).unwrap()
    }

    const SRC: &str = "package shop;
        enum Size { SMALL = 0; LARGE = 1; }
        message Shirt {
            required string color = 1;
            optional Size size = 2 [default = LARGE];
            repeated sint32 adjustments = 3 [packed = true];
        }";

    #[test]
    fn module_exposes_the_codec_operations() {
        let source = generate_module(&codec(SRC, false), "shop");
        for needle in [
            "pub fn codec()",
            "pub fn encode_msg(",
            "pub fn encode_msg_with(",
            "pub fn decode_msg(",
            "pub fn merge_msgs(",
            "pub fn verify_msg(",
            "pub fn get_msg_defs(",
            "fn schema()",
            "fn features()",
        ] {
            assert!(source.contains(needle), "missing {needle:?} in:\n{source}");
        }
        assert!(source.contains("pbgen::FieldType::Enum(\"shop.Size\".to_string())"));
        assert!(source.contains("pbgen::DefaultValue::Enum(\"LARGE\".to_string())"));
        assert!(source.contains("packed: true,"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let first = generate_module(&codec(SRC, false), "shop");
        let second = generate_module(&codec(SRC, false), "shop");
        assert_eq!(first, second);
    }

    #[test]
    fn typed_declarations_follow_the_schema() {
        let types = generate_types(codec(SRC, true).msg_defs(), "shop");
        assert!(types.contains("pub enum ShopSize {"));
        assert!(types.contains("Small = 0,"));
        assert!(types.contains("pub struct ShopShirt {"));
        assert!(types.contains("pub color: String,"));
        assert!(types.contains("pub size: Option<ShopSize>,"));
        assert!(types.contains("pub adjustments: Vec<i32>,"));
    }

    #[test]
    fn keywords_become_raw_identifiers() {
        assert_eq!(rust_field_name("type"), "r#type");
        assert_eq!(rust_field_name("super"), "super_");
        assert_eq!(rust_field_name("fooBar"), "foo_bar");
    }
}
