//! End-to-end pipeline behavior over an in-memory file system: import
//! resolution, artifact emission, feature negotiation, and diagnostics.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;

use pbgen::{Artifact, Config, DefsError, Error, MemFileOps, VerifyMode, Warning};

fn file_system() -> MemFileOps {
    let ops = MemFileOps::new();
    ops.insert(
        "protos/shop.proto",
        r#"
        syntax = "proto2";
        package shop;

        import "sizes.proto";

        message Shirt {
            required string color = 1;
            optional shop.common.Size size = 2;
            repeated sint32 adjustments = 3 [packed = true];
        }
        "#,
    );
    ops.insert(
        "include/sizes.proto",
        "package shop.common; enum Size { SMALL = 0; LARGE = 1; }",
    );
    ops
}

#[test]
fn compiles_a_file_and_writes_the_codec_module() {
    let ops = file_system();
    let out = Config::new()
        .file_ops(ops.clone())
        .import_path("include")
        .out_dir("gen")
        .compile_file("protos/shop.proto")
        .unwrap();

    assert!(out.warnings.is_empty());
    let Artifact::Files { source, types } = out.artifact else {
        panic!("expected written files");
    };
    assert_eq!(source, PathBuf::from("gen/shop.rs"));
    assert_eq!(types, None);

    let generated = String::from_utf8(ops.get("gen/shop.rs").unwrap()).unwrap();
    assert!(generated.starts_with("// This file is @generated by pbgen."));
    assert!(generated.contains("pub fn encode_msg("));
    assert!(generated.contains("pub fn get_msg_defs("));
    assert!(generated.contains("\"shop.Shirt\""));
    assert!(generated.contains("\"shop.common.Size\""));
}

#[test]
fn output_defaults_to_the_source_directory() {
    let ops = file_system();
    Config::new()
        .file_ops(ops.clone())
        .import_path("include")
        .compile_file("protos/shop.proto")
        .unwrap();
    assert!(ops.get("protos/shop.rs").is_some());
}

#[test]
fn type_specs_emit_a_declarations_file() {
    let ops = file_system();
    let out = Config::new()
        .file_ops(ops.clone())
        .import_path("include")
        .out_dir("gen")
        .type_specs(true)
        .compile_file("protos/shop.proto")
        .unwrap();

    let Artifact::Files { types, .. } = out.artifact else {
        panic!("expected written files");
    };
    assert_eq!(types, Some(PathBuf::from("gen/shop_types.rs")));

    let types = String::from_utf8(ops.get("gen/shop_types.rs").unwrap()).unwrap();
    assert!(types.contains("pub struct ShopShirt {"));
    assert!(types.contains("pub size: Option<ShopCommonSize>,"));
    assert!(types.contains("pub enum ShopCommonSize {"));
}

#[test]
fn a_cycle_demotes_type_specs_with_a_warning() {
    let ops = MemFileOps::new();
    ops.insert(
        "list.proto",
        "message Node { optional Node next = 1; required int32 value = 2; }",
    );
    let out = Config::new()
        .file_ops(ops.clone())
        .type_specs(true)
        .out_dir("gen")
        .compile_file("list.proto")
        .unwrap();

    assert_eq!(out.warnings, [Warning::TypeSpecsDisabled]);
    let Artifact::Files { types, .. } = out.artifact else {
        panic!("expected written files");
    };
    assert_eq!(types, None);
    assert!(ops.get("gen/list_types.rs").is_none());

    // The in-memory codec still handles the cyclic schema.
    let out = Config::new()
        .file_ops(ops.clone())
        .in_memory()
        .compile_file("list.proto")
        .unwrap();
    let codec = out.codec().unwrap();
    let mut inner = codec.new_msg("Node").unwrap();
    inner.set(2, 1);
    let mut node = codec.new_msg("Node").unwrap();
    node.set(1, inner).set(2, 2);
    let bytes = codec.encode_msg(&node).unwrap();
    assert_eq!(codec.decode_msg(bytes, "Node").unwrap(), node);
}

#[test]
fn probe_defs_sees_the_sorted_schema() {
    let ops = MemFileOps::new();
    ops.insert(
        "g.proto",
        "message A { required B b = 1; } message B { required int32 x = 1; }",
    );

    let seen: Arc<Mutex<Vec<(Vec<String>, bool)>>> = Arc::new(Mutex::new(Vec::new()));
    let probe_log = Arc::clone(&seen);
    Config::new()
        .file_ops(ops)
        .in_memory()
        .probe_defs(move |schema, cyclic| {
            let names = schema.messages().map(|m| m.name.clone()).collect();
            probe_log.lock().unwrap().push((names, cyclic));
        })
        .compile_file("g.proto")
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        [(vec!["B".to_string(), "A".to_string()], false)]
    );
}

#[test]
fn missing_imports_are_import_not_found() {
    let ops = MemFileOps::new();
    ops.insert("root.proto", "import \"gone.proto\";");
    let err = Config::new()
        .file_ops(ops)
        .compile_file("root.proto")
        .unwrap_err();
    match err {
        Error::ImportNotFound { name } => assert_eq!(name, "gone.proto"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn scan_and_parse_errors_name_the_offending_file() {
    let ops = MemFileOps::new();
    ops.insert("bad_scan.proto", "/* never closed\nmessage M {}");
    let err = Config::new()
        .file_ops(ops)
        .compile_file("bad_scan.proto")
        .unwrap_err();
    match err {
        Error::Scan { file, detail } => {
            assert_eq!(file, "bad_scan.proto");
            assert!(detail.contains("block comment"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let ops = MemFileOps::new();
    ops.insert("bad_parse.proto", "message M {\n  required int32 = 1;\n}");
    let err = Config::new()
        .file_ops(ops)
        .compile_file("bad_parse.proto")
        .unwrap_err();
    match err {
        Error::Parse { file, line, .. } => {
            assert_eq!(file, "bad_parse.proto");
            assert_eq!(line, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn invalid_schemas_surface_every_violation() {
    let ops = MemFileOps::new();
    ops.insert(
        "invalid.proto",
        "message M {
             required int32 a = 1;
             required int32 b = 1;
             optional int32 c = 2 [packed = true];
         }",
    );
    let err = Config::new()
        .file_ops(ops)
        .compile_file("invalid.proto")
        .unwrap_err();
    let Error::InvalidSchema(errors) = err else {
        panic!("expected InvalidSchema");
    };
    assert_eq!(errors.len(), 2);
    assert!(errors.contains(&DefsError::DuplicateFnum {
        msg: "M".to_string(),
        fnum: 1
    }));
    assert!(errors.contains(&DefsError::BadPacked {
        msg: "M".to_string(),
        field: "c".to_string()
    }));
}

#[test]
fn writes_real_files_through_the_default_file_ops() {
    let dir = tempfile::tempdir().unwrap();
    let proto = dir.path().join("demo.proto");
    std::fs::write(&proto, "message Demo { optional uint32 id = 1; }").unwrap();

    let out = Config::new().compile_file(&proto).unwrap();
    let Artifact::Files { source, types } = out.artifact else {
        panic!("expected written files");
    };
    assert_eq!(source, dir.path().join("demo.rs"));
    assert_eq!(types, None);

    let generated = std::fs::read_to_string(source).unwrap();
    assert!(generated.contains("pub fn decode_msg("));
}

#[test]
fn in_memory_compilation_keeps_schema_introspection() {
    let file = pbgen::parse_str(
        "message M { optional uint32 n = 1 [default = 44]; }",
    )
    .unwrap();
    let out = Config::new()
        .in_memory()
        .verify(VerifyMode::Always)
        .compile_defs("defs", file.decls)
        .unwrap();
    let codec = out.codec().unwrap();

    let defs = codec.msg_defs();
    let field = defs.message("M").unwrap().field("n").unwrap();
    assert_eq!(field.fnum, 1);
    assert_eq!(field.rnum, 1);
    assert_eq!(field.default, Some(pbgen::DefaultValue::Uint(44)));

    let Artifact::Memory(compiled) = &out.artifact else {
        panic!("expected an in-memory artifact");
    };
    assert_eq!(compiled.name, "defs");
    assert!(compiled.source.contains("fn schema()"));
    assert!(compiled.types.is_none());
}
