// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Module path resolution and the in-memory module map.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use flast_ast::decl::{DeclKind, FnDecl, ImportDecl};
use flast_ast::Program;
use flast_lexer::Lexer;
use flast_parser::Parser;
use thiserror::Error;

use crate::cache;

/// Errors from module loading.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("could not read module {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("module {path} has {count} syntax error(s)")]
    ParseFailed {
        path: PathBuf,
        count: usize,
        messages: Vec<String>,
    },
    #[error("circular import of {0}")]
    CircularImport(PathBuf),
}

/// A successfully loaded module.
#[derive(Clone)]
pub struct LoadedModule {
    /// Absolute path of the module source.
    pub path: PathBuf,
    /// Shared handle to the parsed program.
    pub program: Rc<Program>,
    /// The module's cache directory (markers and object artifacts).
    pub cache_dir: PathBuf,
    /// True when the on-disk cache entry was still fresh; a fresh entry's
    /// object artifact may be reused without re-lowering.
    pub fresh: bool,
}

/// Locates, loads, and caches imported modules.
///
/// The in-memory map is authoritative for the current run; the on-disk
/// markers and objects survive across runs and are validated by mtime.
pub struct ModuleResolver {
    project_root: PathBuf,
    cache_root: PathBuf,
    modules: HashMap<PathBuf, LoadedModule>,
    /// Import paths that could not be located, reported together at the
    /// end of the resolution sub-phase.
    missing: Vec<String>,
    /// Source path → object artifact, for the final link line.
    objects: HashMap<PathBuf, PathBuf>,
    /// Modules currently being lowered, for cycle detection.
    in_progress: HashSet<PathBuf>,
}

impl ModuleResolver {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let project_root = project_root.canonicalize().unwrap_or(project_root);
        let cache_root = project_root.join(".build").join("cache");
        Self {
            project_root,
            cache_root,
            modules: HashMap::new(),
            missing: Vec::new(),
            objects: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Resolve an import path against the importing file's directory.
    ///
    /// Order: `./` and `../` paths resolve relative to the importer;
    /// otherwise `<root>/<path>` then `<root>/packages/<path>`. A path
    /// without an extension gets `.fls` appended. Misses are recorded in
    /// the missing-module list and return `None`.
    pub fn resolve_path(&mut self, import_path: &str, importing_dir: &Path) -> Option<PathBuf> {
        let mut candidate = if import_path.starts_with("./") || import_path.starts_with("../") {
            importing_dir.join(import_path)
        } else {
            let in_root = self.project_root.join(import_path);
            if exists_with_fls(&in_root) {
                in_root
            } else {
                let in_packages = self.project_root.join("packages").join(import_path);
                if exists_with_fls(&in_packages) {
                    in_packages
                } else {
                    in_root
                }
            }
        };

        if candidate.extension().is_none() {
            candidate.set_extension("fls");
        }

        if !candidate.exists() {
            self.missing.push(import_path.to_string());
            return None;
        }

        Some(
            candidate
                .canonicalize()
                .unwrap_or(candidate),
        )
    }

    /// Load a module by absolute path, reusing the in-memory entry when
    /// present. The on-disk marker is rewritten only when stale, so an
    /// untouched source leaves its cache entry untouched.
    pub fn load(&mut self, path: &Path) -> Result<LoadedModule, ResolveError> {
        if let Some(loaded) = self.modules.get(path) {
            return Ok(loaded.clone());
        }

        let fresh = cache::is_cache_fresh(&self.cache_root, &self.project_root, path);

        let source = std::fs::read_to_string(path).map_err(|e| ResolveError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let lex = Lexer::new(&source).tokenize();
        let mut parser = Parser::new(lex.tokens, path);
        let parsed = parser.parse();
        let error_count = lex.errors.len() + parsed.errors.len();
        if error_count > 0 {
            let messages = lex
                .errors
                .iter()
                .map(|e| e.message.clone())
                .chain(parsed.errors.iter().map(|e| e.message.clone()))
                .collect();
            return Err(ResolveError::ParseFailed {
                path: path.to_path_buf(),
                count: error_count,
                messages,
            });
        }

        let cache_dir = cache::module_cache_dir(&self.cache_root, &self.project_root, path);
        if !fresh {
            let _ = cache::write_cache_marker(
                &self.cache_root,
                &self.project_root,
                path,
                &parsed.program,
            );
        }

        let loaded = LoadedModule {
            path: path.to_path_buf(),
            program: Rc::new(parsed.program),
            cache_dir,
            fresh,
        };
        self.modules.insert(path.to_path_buf(), loaded.clone());
        Ok(loaded)
    }

    /// Mark a module as being lowered. Returns false when it is already in
    /// progress, which means the import graph has a cycle.
    pub fn enter(&mut self, path: &Path) -> bool {
        self.in_progress.insert(path.to_path_buf())
    }

    pub fn leave(&mut self, path: &Path) {
        self.in_progress.remove(path);
    }

    /// Record a module's object artifact for the final link.
    pub fn record_object(&mut self, source: &Path, object: PathBuf) {
        self.objects.insert(source.to_path_buf(), object);
    }

    pub fn object_for(&self, source: &Path) -> Option<&PathBuf> {
        self.objects.get(source)
    }

    /// All tracked module objects, in a stable order.
    pub fn module_objects(&self) -> Vec<PathBuf> {
        let mut objects: Vec<PathBuf> = self.objects.values().cloned().collect();
        objects.sort();
        objects
    }

    pub fn missing_modules(&self) -> &[String] {
        &self.missing
    }

    /// Select the functions an import brings into the importing unit:
    /// the named list filtered to public functions, all public functions
    /// for a wildcard, or the first public function for a bare import.
    pub fn select_imports<'p>(import: &ImportDecl, program: &'p Program) -> Vec<&'p FnDecl> {
        let public_fns = || {
            program.decls.iter().filter_map(|d| match &d.kind {
                DeclKind::Function(f) if f.modifiers.is_pub => Some(f),
                _ => None,
            })
        };

        if import.wildcard {
            public_fns().collect()
        } else if import.names.is_empty() {
            public_fns().take(1).collect()
        } else {
            public_fns()
                .filter(|f| import.names.iter().any(|n| n == &f.name))
                .collect()
        }
    }
}

impl flast_diagnostics::ToDiagnostic for ResolveError {
    fn to_diagnostic(&self) -> flast_diagnostics::Diagnostic {
        use flast_diagnostics::{DiagKind, Diagnostic};
        match self {
            ResolveError::Io { .. } => Diagnostic::error(DiagKind::FileNotFound, self.to_string()),
            ResolveError::ParseFailed { .. } => {
                Diagnostic::error(DiagKind::CompilationFailed, self.to_string())
            }
            ResolveError::CircularImport(_) => {
                Diagnostic::error(DiagKind::CircularDependency, self.to_string())
            }
        }
    }
}

/// Walk the import graph depth-first from `program`, loading every
/// reachable module so misses, parse failures, and cycles are all known
/// before code generation starts. Imports resolve in source order.
pub fn resolve_imports(
    resolver: &mut ModuleResolver,
    program: &Program,
    source_dir: &Path,
    sink: &mut flast_diagnostics::DiagnosticSink,
) {
    use flast_diagnostics::{DiagKind, Diagnostic, ToDiagnostic};

    let mut seen_here: Vec<String> = Vec::new();
    for decl in flatten_imports(&program.decls) {
        let DeclKind::Import(import) = &decl.kind else {
            continue;
        };
        if seen_here.iter().any(|p| p == &import.path) {
            sink.report(
                Diagnostic::warning(
                    DiagKind::DuplicateImport,
                    format!("duplicate import of \"{}\"", import.path),
                )
                .with_span(decl.span),
            );
            continue;
        }
        seen_here.push(import.path.clone());

        let Some(abs) = resolver.resolve_path(&import.path, source_dir) else {
            continue; // recorded in the missing list
        };
        if !resolver.enter(&abs) {
            sink.report(
                Diagnostic::error(
                    DiagKind::CircularDependency,
                    format!("circular import of \"{}\"", import.path),
                )
                .with_span(decl.span),
            );
            continue;
        }
        match resolver.load(&abs) {
            Ok(loaded) => {
                let dir = abs.parent().unwrap_or(Path::new(".")).to_path_buf();
                let program = loaded.program.clone();
                resolve_imports(resolver, &program, &dir, sink);
            }
            Err(e) => sink.report(e.to_diagnostic().with_span(decl.span)),
        }
        resolver.leave(&abs);
    }
}

/// Imports of a declaration list, looking through inline `mod` blocks.
fn flatten_imports(decls: &[flast_ast::decl::Decl]) -> Vec<&flast_ast::decl::Decl> {
    let mut out = Vec::new();
    for decl in decls {
        match &decl.kind {
            DeclKind::Import(_) => out.push(decl),
            DeclKind::Module(m) => out.extend(flatten_imports(&m.decls)),
            _ => {}
        }
    }
    out
}

fn exists_with_fls(path: &Path) -> bool {
    if path.exists() {
        return true;
    }
    if path.extension().is_none() {
        let mut with_ext = path.to_path_buf();
        with_ext.set_extension("fls");
        return with_ext.exists();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn relative_paths_resolve_against_importer() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(&root.join("sub").join("helper.fls"), "pub func h() { }");

        let mut resolver = ModuleResolver::new(root);
        let resolved = resolver
            .resolve_path("./helper", &root.join("sub"))
            .expect("should resolve");
        assert!(resolved.ends_with("sub/helper.fls"));
    }

    #[test]
    fn bare_paths_try_root_then_packages() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(&root.join("direct.fls"), "pub func d() { }");
        write(&root.join("packages").join("dep.fls"), "pub func p() { }");

        let mut resolver = ModuleResolver::new(root);
        assert!(resolver
            .resolve_path("direct", root)
            .unwrap()
            .ends_with("direct.fls"));
        assert!(resolver
            .resolve_path("dep", root)
            .unwrap()
            .ends_with("packages/dep.fls"));
    }

    #[test]
    fn misses_accumulate_for_deferred_reporting() {
        let tmp = TempDir::new().unwrap();
        let mut resolver = ModuleResolver::new(tmp.path());
        assert!(resolver.resolve_path("nowhere", tmp.path()).is_none());
        assert!(resolver.resolve_path("./also/nowhere", tmp.path()).is_none());
        assert_eq!(resolver.missing_modules(), ["nowhere", "./also/nowhere"]);
    }

    #[test]
    fn load_caches_in_memory_and_writes_marker() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let module = root.join("util.fls");
        write(&module, "pub func add(a: i32, b: i32) -> i32 { return a + b; }");

        let mut resolver = ModuleResolver::new(root);
        let module = module.canonicalize().unwrap();
        let first = resolver.load(&module).unwrap();
        assert!(!first.fresh);
        assert_eq!(first.program.decls.len(), 1);

        let marker = first
            .cache_dir
            .join(crate::cache::cache_file_name(&module));
        assert!(marker.exists());

        // Second load hits the in-memory map and shares the program.
        let second = resolver.load(&module).unwrap();
        assert!(Rc::ptr_eq(&first.program, &second.program));
    }

    #[test]
    fn stale_source_invalidates_cache_entry() {
        use std::time::{Duration, SystemTime};

        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let module = root.join("util.fls");
        write(&module, "pub func f() { }");

        let mut resolver = ModuleResolver::new(root);
        let module = module.canonicalize().unwrap();
        resolver.load(&module).unwrap();

        // Touch the source beyond the marker's mtime and reload in a new
        // resolver (a new run).
        let file = std::fs::File::options().write(true).open(&module).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5))
            .unwrap();

        let mut second_run = ModuleResolver::new(root);
        let reloaded = second_run.load(&module).unwrap();
        assert!(!reloaded.fresh);

        // An untouched marker newer than the source stays fresh.
        let marker = reloaded
            .cache_dir
            .join(crate::cache::cache_file_name(&module));
        let marker_file = std::fs::File::options().write(true).open(&marker).unwrap();
        marker_file
            .set_modified(SystemTime::now() + Duration::from_secs(10))
            .unwrap();
        let mut third_run = ModuleResolver::new(root);
        assert!(third_run.load(&module).unwrap().fresh);
    }

    #[test]
    fn parse_errors_fail_the_load() {
        let tmp = TempDir::new().unwrap();
        let module = tmp.path().join("bad.fls");
        write(&module, "func ( {");

        let mut resolver = ModuleResolver::new(tmp.path());
        let module = module.canonicalize().unwrap();
        match resolver.load(&module) {
            Err(ResolveError::ParseFailed { count, .. }) => assert!(count > 0),
            other => panic!("expected ParseFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn cycle_detection_via_enter_leave() {
        let tmp = TempDir::new().unwrap();
        let mut resolver = ModuleResolver::new(tmp.path());
        let path = tmp.path().join("a.fls");
        assert!(resolver.enter(&path));
        assert!(!resolver.enter(&path));
        resolver.leave(&path);
        assert!(resolver.enter(&path));
    }

    #[test]
    fn import_selection_filters_public_functions() {
        let source = "pub func a() { } func hidden() { } pub func b() { } pub func c() { }";
        let lex = Lexer::new(source).tokenize();
        let mut parser = Parser::new(lex.tokens, "m.fls");
        let program = parser.parse().program;

        let named = ImportDecl {
            path: "m".into(),
            alias: None,
            names: vec!["b".into(), "hidden".into()],
            wildcard: false,
        };
        let selected = ModuleResolver::select_imports(&named, &program);
        // `hidden` is not public, so only `b` comes through.
        assert_eq!(selected.iter().map(|f| &f.name).collect::<Vec<_>>(), ["b"]);

        let wildcard = ImportDecl {
            path: "m".into(),
            alias: None,
            names: vec![],
            wildcard: true,
        };
        let selected = ModuleResolver::select_imports(&wildcard, &program);
        assert_eq!(
            selected.iter().map(|f| &f.name).collect::<Vec<_>>(),
            ["a", "b", "c"]
        );

        let bare = ImportDecl {
            path: "m".into(),
            alias: None,
            names: vec![],
            wildcard: false,
        };
        let selected = ModuleResolver::select_imports(&bare, &program);
        assert_eq!(selected.iter().map(|f| &f.name).collect::<Vec<_>>(), ["a"]);
    }
}
