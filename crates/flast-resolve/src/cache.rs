// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! On-disk module cache layout.
//!
//! Each successfully loaded module gets a directory under
//! `<project-root>/.build/cache/modules/`, organized by the module's path
//! relative to the project root (or a hashed directory for modules outside
//! it). The directory holds a `<stem>_<hash>.cache` metadata marker and a
//! `<stem>_<hash>.o` object artifact. A cache entry is fresh while the
//! marker's mtime is at least the source's mtime.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use flast_ast::decl::DeclKind;
use flast_ast::Program;

/// 64-bit hash of a module's absolute path, used to keep cache file names
/// unique across modules with the same stem.
fn path_hash(module_path: &Path) -> u64 {
    let mut hasher = DefaultHasher::new();
    module_path.to_string_lossy().hash(&mut hasher);
    hasher.finish()
}

fn module_stem(module_path: &Path) -> String {
    module_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "module".to_string())
}

/// `<stem>_<hash>.cache`
pub fn cache_file_name(module_path: &Path) -> String {
    format!("{}_{}.cache", module_stem(module_path), path_hash(module_path))
}

/// `<stem>_<hash>.o`
pub fn object_file_name(module_path: &Path) -> String {
    format!("{}_{}.o", module_stem(module_path), path_hash(module_path))
}

/// The cache directory for a module: `modules/<dir relative to root>`, or
/// `modules/external_<hash>` for modules outside the project tree.
pub fn module_cache_dir(cache_root: &Path, project_root: &Path, module_path: &Path) -> PathBuf {
    let parent = module_path.parent().unwrap_or(Path::new(""));
    let relative = match parent.strip_prefix(project_root) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => PathBuf::from(format!("external_{}", path_hash(parent))),
    };
    cache_root.join("modules").join(relative)
}

/// True when the cache marker exists and is at least as new as the source.
pub fn is_cache_fresh(cache_root: &Path, project_root: &Path, module_path: &Path) -> bool {
    let marker = module_cache_dir(cache_root, project_root, module_path)
        .join(cache_file_name(module_path));
    entry_is_fresh(&marker, module_path)
}

/// True when `artifact` exists and is at least as new as `source`.
pub fn entry_is_fresh(artifact: &Path, source: &Path) -> bool {
    let artifact_time = match std::fs::metadata(artifact).and_then(|m| m.modified()) {
        Ok(t) => t,
        Err(_) => return false,
    };
    let source_time = match std::fs::metadata(source).and_then(|m| m.modified()) {
        Ok(t) => t,
        Err(_) => return false,
    };
    artifact_time >= source_time
}

/// Write the textual metadata marker for a loaded module: filename,
/// timestamp, declaration count, and the exported function list.
pub fn write_cache_marker(
    cache_root: &Path,
    project_root: &Path,
    module_path: &Path,
    program: &Program,
) -> std::io::Result<PathBuf> {
    let dir = module_cache_dir(cache_root, project_root, module_path);
    std::fs::create_dir_all(&dir)?;
    let marker = dir.join(cache_file_name(module_path));

    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut contents = String::new();
    contents.push_str("# Flast Module Cache\n");
    contents.push_str(&format!(
        "# Module: {}\n",
        module_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    ));
    contents.push_str(&format!("# Generated: {}\n", stamp));
    contents.push_str(&format!("# Declarations: {}\n\n", program.decls.len()));
    for decl in &program.decls {
        if let DeclKind::Function(f) = &decl.kind {
            contents.push_str(&format!(
                "FUNCTION: {} (public: {})\n",
                f.name,
                if f.modifiers.is_pub { "yes" } else { "no" }
            ));
        }
    }

    std::fs::write(&marker, contents)?;
    Ok(marker)
}

/// Remove top-level cache files while preserving the `modules/` sub-caches
/// and everything under `bin/`.
pub fn clean_main_cache(cache_root: &Path) -> std::io::Result<(usize, usize)> {
    let mut files_removed = 0;
    let mut dirs_kept = 0;
    if !cache_root.exists() {
        return Ok((0, 0));
    }
    for entry in std::fs::read_dir(cache_root)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() {
            std::fs::remove_file(&path)?;
            files_removed += 1;
        } else {
            dirs_kept += 1;
        }
    }
    Ok((files_removed, dirs_kept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn touch(path: &Path, contents: &str) {
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn cache_names_embed_stem_and_hash() {
        let a = cache_file_name(Path::new("/proj/util.fls"));
        let b = cache_file_name(Path::new("/other/util.fls"));
        assert!(a.starts_with("util_") && a.ends_with(".cache"));
        assert!(b.starts_with("util_") && b.ends_with(".cache"));
        // Same stem, different directories, different names.
        assert_ne!(a, b);
        assert_eq!(
            object_file_name(Path::new("/proj/util.fls")),
            a.replace(".cache", ".o")
        );
    }

    #[test]
    fn cache_dir_is_relative_to_root() {
        let root = Path::new("/proj");
        let cache = Path::new("/proj/.build/cache");
        let dir = module_cache_dir(cache, root, Path::new("/proj/sub/util.fls"));
        assert_eq!(dir, Path::new("/proj/.build/cache/modules/sub"));

        let external = module_cache_dir(cache, root, Path::new("/elsewhere/util.fls"));
        assert!(external
            .to_string_lossy()
            .contains("modules/external_"));
    }

    #[test]
    fn freshness_follows_mtimes() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("m.fls");
        let marker = tmp.path().join("m.cache");
        touch(&source, "func f() { }");
        touch(&marker, "# marker");

        // Marker written after source: fresh.
        assert!(entry_is_fresh(&marker, &source));

        // Advance the source past the marker: stale.
        let file = std::fs::File::options().write(true).open(&source).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5))
            .unwrap();
        assert!(!entry_is_fresh(&marker, &source));

        // Missing marker is never fresh.
        assert!(!entry_is_fresh(&tmp.path().join("absent"), &source));
    }

    #[test]
    fn marker_lists_exported_functions() {
        use flast_lexer::Lexer;
        use flast_parser::Parser;

        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        let cache_root = root.join(".build").join("cache");
        let module = root.join("util.fls");
        touch(&module, "pub func visible() { } func hidden() { }");

        let lex = Lexer::new("pub func visible() { } func hidden() { }").tokenize();
        let mut parser = Parser::new(lex.tokens, &module);
        let program = parser.parse().program;

        let marker = write_cache_marker(&cache_root, &root, &module, &program).unwrap();
        let contents = std::fs::read_to_string(marker).unwrap();
        assert!(contents.contains("# Declarations: 2"));
        assert!(contents.contains("FUNCTION: visible (public: yes)"));
        assert!(contents.contains("FUNCTION: hidden (public: no)"));
    }

    #[test]
    fn clean_preserves_module_subcaches() {
        let tmp = TempDir::new().unwrap();
        let cache_root = tmp.path().join("cache");
        std::fs::create_dir_all(cache_root.join("modules").join("sub")).unwrap();
        touch(&cache_root.join("main.o"), "obj");
        touch(&cache_root.join("modules").join("sub").join("m.cache"), "m");

        let (removed, kept) = clean_main_cache(&cache_root).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(kept, 1);
        assert!(!cache_root.join("main.o").exists());
        assert!(cache_root.join("modules").join("sub").join("m.cache").exists());
    }
}
