//! Compilation configuration and the pipeline driver.

use std::path::{Path, PathBuf};

use heck::ToSnakeCase;
use log::debug;

use crate::ast::{Decl, ProtoFile};
use crate::codec::Codec;
use crate::codegen;
use crate::error::Error;
use crate::features::{self, CopyBytes, VerifyMode, Warning};
use crate::fileops::{FileOps, OsFileOps};
use crate::graph;
use crate::import;
use crate::normalize;
use crate::schema::Schema;

/// Configuration options for schema compilation.
///
/// This configuration builder can be used to set non-default options:
///
/// ```no_run
/// let mut config = pbgen::Config::new();
/// config
///     .import_path("protos/include")
///     .out_dir("src/generated")
///     .verify(pbgen::VerifyMode::Always);
/// config.compile_file("protos/items.proto")?;
/// # Ok::<(), pbgen::Error>(())
/// ```
pub struct Config {
    import_paths: Vec<PathBuf>,
    out_dir: Option<PathBuf>,
    in_memory: bool,
    type_specs: bool,
    verify: VerifyMode,
    copy_bytes: CopyBytes,
    file_ops: Box<dyn FileOps>,
    probe_defs: Option<Box<dyn Fn(&Schema, bool)>>,
}

impl Config {
    /// Creates a new configuration with default options.
    pub fn new() -> Config {
        Config::default()
    }

    /// Appends a directory to the import search path. Directories are
    /// searched in the order given; the root file's own directory is
    /// searched last.
    pub fn import_path(&mut self, dir: impl Into<PathBuf>) -> &mut Config {
        self.import_paths.push(dir.into());
        self
    }

    /// Sets the output directory for generated files. Defaults to the
    /// source file's directory.
    pub fn out_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Config {
        self.out_dir = Some(dir.into());
        self
    }

    /// Returns the compiled artifact in memory instead of writing files.
    pub fn in_memory(&mut self) -> &mut Config {
        self.in_memory = true;
        self
    }

    /// Toggles typed declarations in the generated output. Forcibly
    /// disabled, with a [`Warning`], when the message graph is cyclic.
    pub fn type_specs(&mut self, enabled: bool) -> &mut Config {
        self.type_specs = enabled;
        self
    }

    /// Selects when generated encoding verifies its input.
    pub fn verify(&mut self, mode: VerifyMode) -> &mut Config {
        self.verify = mode;
        self
    }

    /// Selects the decoded-`bytes` copy strategy.
    pub fn copy_bytes(&mut self, strategy: CopyBytes) -> &mut Config {
        self.copy_bytes = strategy;
        self
    }

    /// Injects a file-system collaborator; all pipeline I/O goes through
    /// it.
    pub fn file_ops(&mut self, ops: impl FileOps + 'static) -> &mut Config {
        self.file_ops = Box::new(ops);
        self
    }

    /// Installs a diagnostic hook that receives the schema after the
    /// topological sort, along with the cycle flag.
    pub fn probe_defs(&mut self, probe: impl Fn(&Schema, bool) + 'static) -> &mut Config {
        self.probe_defs = Some(Box::new(probe));
        self
    }

    /// Loads, compiles, and emits a schema file: the whole pipeline,
    /// starting from import resolution.
    pub fn compile_file(&self, path: impl AsRef<Path>) -> Result<Output, Error> {
        let path = path.as_ref();
        let mut search = self.import_paths.clone();
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => search.push(parent.to_path_buf()),
            _ => {}
        }

        let loaded = import::resolve_imports(&*self.file_ops, path, &search)?;
        debug!(
            "loaded {} file(s) for {}",
            loaded.imported.len(),
            path.display()
        );

        let default_out = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        self.run_pipeline(&module_name_from_path(path), &loaded.files, default_out)
    }

    /// Compiles a pre-parsed schema, bypassing import resolution.
    pub fn compile_defs(&self, module_name: &str, decls: Vec<Decl>) -> Result<Output, Error> {
        let files = vec![ProtoFile {
            package: None,
            imports: Vec::new(),
            decls,
        }];
        self.run_pipeline(module_name, &files, PathBuf::from("."))
    }

    fn run_pipeline(
        &self,
        module_name: &str,
        files: &[ProtoFile],
        default_out: PathBuf,
    ) -> Result<Output, Error> {
        let schema = normalize::normalize(files)?;
        let (schema, cyclic) = graph::sort_defs(schema);
        if let Some(probe) = &self.probe_defs {
            probe(&schema, cyclic);
        }

        let (features, warnings) =
            features::negotiate(self.type_specs, self.copy_bytes, self.verify, cyclic);
        let codec = Codec::synthesize(schema, features)?;

        let out_dir = self.out_dir.clone().unwrap_or(default_out);
        let artifact = codegen::emit(
            codec,
            module_name,
            &out_dir,
            self.in_memory,
            &*self.file_ops,
        )?;
        Ok(Output { artifact, warnings })
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            import_paths: Vec::new(),
            out_dir: None,
            in_memory: false,
            type_specs: false,
            verify: VerifyMode::default(),
            copy_bytes: CopyBytes::default(),
            file_ops: Box::new(OsFileOps),
            probe_defs: None,
        }
    }
}

fn module_name_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_snake_case())
        .unwrap_or_default();
    if stem.is_empty() {
        "proto".to_string()
    } else if stem.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{stem}")
    } else {
        stem
    }
}

/// A successful compilation: the artifact plus any non-fatal warnings.
#[derive(Debug)]
pub struct Output {
    pub artifact: Artifact,
    pub warnings: Vec<Warning>,
}

impl Output {
    /// The in-memory codec, when compiled with [`Config::in_memory`].
    pub fn codec(&self) -> Option<&Codec> {
        match &self.artifact {
            Artifact::Memory(compiled) => Some(&compiled.codec),
            Artifact::Files { .. } => None,
        }
    }
}

/// What the emitter produced.
#[derive(Debug)]
pub enum Artifact {
    /// Generated files were written through the file-ops collaborator.
    Files {
        source: PathBuf,
        /// The typed-declarations file; present only when typed
        /// declarations were enabled and survived negotiation.
        types: Option<PathBuf>,
    },
    /// The compiled artifact, kept in memory.
    Memory(CompiledCodec),
}

/// An in-memory artifact: the executable codec plus the rendered sources.
#[derive(Debug)]
pub struct CompiledCodec {
    pub name: String,
    pub codec: Codec,
    pub source: String,
    pub types: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_names_come_from_the_file_stem() {
        assert_eq!(module_name_from_path(Path::new("a/b/MyProtos.proto")), "my_protos");
        assert_eq!(module_name_from_path(Path::new("3d.proto")), "_3d");
        assert_eq!(module_name_from_path(Path::new("")), "proto");
    }
}
