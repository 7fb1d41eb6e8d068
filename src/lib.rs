#![doc(html_root_url = "https://docs.rs/pbgen/0.1.0")]

//! `pbgen` compiles proto2 `.proto` schemas into wire-format codecs.
//!
//! For each input schema the compiler produces a self-contained codec
//! module — encoder, decoder, merger, verifier, and schema introspection —
//! either as generated Rust source files or as an in-memory [`Codec`]
//! ready to use. The wire behavior is byte-compatible with the Protocol
//! Buffers proto2 encoding for every supported type and occurrence
//! combination.
//!
//! ## Example
//!
//! Compile a schema in memory and round-trip a value:
//!
//! ```
//! use pbgen::Config;
//!
//! let file = pbgen::parse_str(
//!     "message Point {
//!          required sint32 x = 1;
//!          required sint32 y = 2;
//!      }",
//! )?;
//! let out = Config::new().in_memory().compile_defs("points", file.decls)?;
//! let codec = out.codec().expect("in-memory compilation");
//!
//! let mut point = codec.new_msg("Point").expect("defined message");
//! point.set(1, -2).set(2, 7);
//!
//! let bytes = codec.encode_msg(&point)?;
//! assert_eq!(codec.decode_msg(bytes, "Point")?, point);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Or drive the full pipeline from a file, writing generated sources next
//! to the input:
//!
//! ```no_run
//! pbgen::compile_file("protos/items.proto")?;
//! # Ok::<(), pbgen::Error>(())
//! ```

pub mod ast;
mod codec;
mod codegen;
mod config;
pub mod encoding;
mod error;
mod features;
mod fileops;
mod graph;
mod import;
mod normalize;
mod parse;
mod schema;
mod value;

/// Re-exported for generated code and callers that pass [`bytes::Bytes`]
/// buffers to the decoder.
pub use bytes;

pub use codec::{Codec, EncodeOpts};
pub use config::{Artifact, CompiledCodec, Config, Output};
pub use error::{
    DecodeError, DecodeErrorKind, DefsError, EncodeError, Error, VerifyError, VerifyReason,
};
pub use features::{CopyBytes, Features, VerifyMode, Warning};
pub use fileops::{FileInfo, FileOps, MemFileOps, OsFileOps};
pub use schema::{
    Def, DefaultValue, EnumDef, EnumValue, FieldDef, FieldType, MessageDef, Occurrence, Schema,
};
pub use value::{MsgValue, Value};

/// Compiles a schema file with default options: resolves imports,
/// normalizes, and writes the generated codec module next to the input.
pub fn compile_file(path: impl AsRef<std::path::Path>) -> Result<Output, Error> {
    Config::new().compile_file(path)
}

/// Compiles a pre-parsed schema with default options, bypassing import
/// resolution.
pub fn compile_defs(module_name: &str, decls: Vec<ast::Decl>) -> Result<Output, Error> {
    Config::new().compile_defs(module_name, decls)
}

/// Parses `.proto` source text into raw definitions, suitable for
/// [`compile_defs`].
pub fn parse_str(src: &str) -> Result<ast::ProtoFile, Error> {
    parse::scan_check(src).map_err(|detail| Error::Scan {
        file: "<input>".to_string(),
        detail,
    })?;
    parse::parse_proto(src).map_err(|e| Error::Parse {
        file: "<input>".to_string(),
        line: e.line,
        detail: e.detail,
    })
}
