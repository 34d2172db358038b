// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Build-directory setup and the system linker driver.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::module::BuildMode;
use crate::{CodegenError, CodegenResult};

/// The build tree rooted at the project directory:
/// `.build/bin` for executables, `.build/cache` for objects and markers.
pub struct BuildPaths {
    pub root: PathBuf,
    pub bin_dir: PathBuf,
    pub cache_dir: PathBuf,
}

/// Create the build-directory structure and clear top-level cache files,
/// preserving the per-module sub-caches.
pub fn prepare_build_dirs(project_root: &Path) -> CodegenResult<BuildPaths> {
    let build = project_root.join(".build");
    let bin_dir = build.join("bin");
    let cache_dir = build.join("cache");
    std::fs::create_dir_all(&bin_dir)?;
    std::fs::create_dir_all(&cache_dir)?;
    flast_resolve::cache::clean_main_cache(&cache_dir)?;
    Ok(BuildPaths {
        root: project_root.to_path_buf(),
        bin_dir,
        cache_dir,
    })
}

/// Executable extension for the host platform.
pub fn platform_extension() -> &'static str {
    if cfg!(target_os = "windows") {
        ".exe"
    } else if cfg!(target_os = "linux") || cfg!(target_os = "macos") {
        ""
    } else {
        ".out"
    }
}

/// Compose the link command: system C compiler, `-no-pie`, `-g` in debug
/// builds or `-O2` in release builds, the entry object plus every tracked
/// module object, `-o <binary>`.
pub fn link_command(
    compiler: &str,
    entry_object: &Path,
    module_objects: &[PathBuf],
    binary: &Path,
    mode: BuildMode,
) -> Command {
    let mut cmd = Command::new(compiler);
    cmd.arg("-no-pie");
    match mode {
        BuildMode::Debug => {
            cmd.arg("-g");
        }
        BuildMode::Release => {
            cmd.arg("-O2");
        }
    }
    cmd.arg(entry_object);
    for obj in module_objects {
        cmd.arg(obj);
    }
    cmd.arg("-o").arg(binary);
    cmd
}

/// Run the system linker. A missing `cc` falls back to `gcc`; a non-zero
/// exit is a `LinkFailure`.
pub fn link_executable(
    entry_object: &Path,
    module_objects: &[PathBuf],
    binary: &Path,
    mode: BuildMode,
) -> CodegenResult<()> {
    let status = link_command("cc", entry_object, module_objects, binary, mode)
        .status()
        .or_else(|_| link_command("gcc", entry_object, module_objects, binary, mode).status())
        .map_err(|e| CodegenError::LinkFailure(format!("failed to run cc: {}", e)))?;

    if !status.success() {
        return Err(CodegenError::LinkFailure(format!(
            "linker exited with status {}",
            status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn debug_link_line() {
        let cmd = link_command(
            "cc",
            Path::new("main.o"),
            &[PathBuf::from("util_1.o")],
            Path::new(".build/bin/main"),
            BuildMode::Debug,
        );
        assert_eq!(cmd.get_program(), "cc");
        assert_eq!(
            args_of(&cmd),
            vec!["-no-pie", "-g", "main.o", "util_1.o", "-o", ".build/bin/main"]
        );
    }

    #[test]
    fn release_link_line() {
        let cmd = link_command(
            "cc",
            Path::new("main.o"),
            &[],
            Path::new("out"),
            BuildMode::Release,
        );
        let args = args_of(&cmd);
        assert!(args.contains(&"-O2".to_string()));
        assert!(!args.contains(&"-g".to_string()));
    }

    #[test]
    fn build_dirs_created_and_cache_cleared() {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = prepare_build_dirs(tmp.path()).unwrap();
        assert!(paths.bin_dir.is_dir());
        assert!(paths.cache_dir.is_dir());

        // Top-level cache files go, module sub-caches stay.
        std::fs::write(paths.cache_dir.join("stale.o"), "x").unwrap();
        let sub = paths.cache_dir.join("modules").join("m");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("m.cache"), "x").unwrap();

        prepare_build_dirs(tmp.path()).unwrap();
        assert!(!paths.cache_dir.join("stale.o").exists());
        assert!(sub.join("m.cache").exists());
    }
}
