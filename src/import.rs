//! The import resolver: walks the `import` graph of a root file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::debug;

use crate::ast::ProtoFile;
use crate::error::Error;
use crate::fileops::FileOps;
use crate::parse;

/// The flat result of an import walk: parsed files in declarer-before-
/// imports order, plus the paths actually read.
#[derive(Debug)]
pub struct Loaded {
    pub files: Vec<ProtoFile>,
    pub imported: Vec<PathBuf>,
}

/// Loads `root` and, recursively, everything it imports. Each import name
/// is resolved against the search directories in order, the first readable
/// match winning; a file reached along multiple import paths is loaded
/// once. Scan, parse, and missing-import failures are surfaced unchanged,
/// and a failed file counts as seen so it is reported once.
pub fn resolve_imports(
    ops: &dyn FileOps,
    root: &Path,
    search: &[PathBuf],
) -> Result<Loaded, Error> {
    let mut loader = Loader {
        ops,
        search,
        seen: HashSet::new(),
        files: Vec::new(),
        imported: Vec::new(),
    };
    let root_name = root.to_string_lossy().into_owned();
    loader.seen.insert(root_name.clone());
    loader.load(&root_name)?;
    Ok(Loaded {
        files: loader.files,
        imported: loader.imported,
    })
}

struct Loader<'a> {
    ops: &'a dyn FileOps,
    search: &'a [PathBuf],
    seen: HashSet<String>,
    files: Vec<ProtoFile>,
    imported: Vec<PathBuf>,
}

impl Loader<'_> {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        let direct = PathBuf::from(name);
        if self.ops.read_file_info(&direct).is_ok() {
            return Some(direct);
        }
        for dir in self.search {
            let candidate = dir.join(name);
            if self.ops.read_file_info(&candidate).is_ok() {
                return Some(candidate);
            }
        }
        None
    }

    fn load(&mut self, name: &str) -> Result<(), Error> {
        let path = self
            .locate(name)
            .ok_or_else(|| Error::ImportNotFound {
                name: name.to_string(),
            })?;
        debug!("importing {}", path.display());

        let bytes = self.ops.read_file(&path)?;
        let src = String::from_utf8_lossy(&bytes);
        parse::scan_check(&src).map_err(|detail| Error::Scan {
            file: name.to_string(),
            detail,
        })?;
        let file = parse::parse_proto(&src).map_err(|e| Error::Parse {
            file: name.to_string(),
            line: e.line,
            detail: e.detail,
        })?;

        self.imported.push(path);
        let imports = file.imports.clone();
        self.files.push(file);

        for import in imports {
            if self.seen.insert(import.clone()) {
                self.load(&import)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fileops::MemFileOps;

    fn ops() -> MemFileOps {
        let ops = MemFileOps::new();
        ops.insert(
            "root.proto",
            "import \"a.proto\"; import \"b.proto\"; message Root {}",
        );
        ops.insert("inc/a.proto", "import \"shared.proto\"; message A {}");
        ops.insert("inc/b.proto", "import \"shared.proto\"; message B {}");
        ops.insert("inc/shared.proto", "message Shared {}");
        ops
    }

    #[test]
    fn walks_imports_depth_first_and_dedupes() {
        let ops = ops();
        let loaded =
            resolve_imports(&ops, Path::new("root.proto"), &[PathBuf::from("inc")]).unwrap();

        // Declarer first, then each import's contents; the diamond import
        // of shared.proto loads once.
        let names: Vec<&str> = loaded
            .files
            .iter()
            .map(|f| match &f.decls[0] {
                crate::ast::Decl::Message(m) => m.name.as_str(),
                _ => panic!("expected a message"),
            })
            .collect();
        assert_eq!(names, ["Root", "A", "Shared", "B"]);
        assert_eq!(
            loaded.imported,
            [
                PathBuf::from("root.proto"),
                PathBuf::from("inc/a.proto"),
                PathBuf::from("inc/shared.proto"),
                PathBuf::from("inc/b.proto"),
            ]
        );
    }

    #[test]
    fn search_directories_are_walked_in_order() {
        let ops = ops();
        ops.insert("first/shared.proto", "message FirstShared {}");
        let loaded = resolve_imports(
            &ops,
            Path::new("root.proto"),
            &[PathBuf::from("first"), PathBuf::from("inc")],
        )
        .unwrap();
        assert!(loaded
            .imported
            .contains(&PathBuf::from("first/shared.proto")));
    }

    #[test]
    fn missing_import_is_reported_by_name() {
        let ops = MemFileOps::new();
        ops.insert("root.proto", "import \"nowhere.proto\";");
        let err = resolve_imports(&ops, Path::new("root.proto"), &[]).unwrap_err();
        match err {
            Error::ImportNotFound { name } => assert_eq!(name, "nowhere.proto"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parse_failures_carry_the_import_name() {
        let ops = MemFileOps::new();
        ops.insert("root.proto", "import \"bad.proto\";");
        ops.insert("bad.proto", "message {}");
        let err = resolve_imports(&ops, Path::new("root.proto"), &[PathBuf::from(".")]).unwrap_err();
        match err {
            Error::Parse { file, .. } => assert_eq!(file, "bad.proto"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
