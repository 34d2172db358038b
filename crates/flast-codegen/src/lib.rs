// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Flast code generator — AST → native code via Cranelift.

pub mod builder;
pub mod builtins;
pub mod link;
pub mod module;
pub mod scope;
mod tests;
pub mod types;

pub use link::{link_executable, platform_extension, prepare_build_dirs, BuildPaths};
pub use module::{compile_program, BuildMode, CodeGenerator, CompiledUnit};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("{0}")]
    Lowering(String),
    #[error("unsupported construct: {0}")]
    Unsupported(String),
    #[error("verification failed for '{name}': {detail}")]
    Verification { name: String, detail: String },
    #[error("linking failed: {0}")]
    LinkFailure(String),
    #[error(transparent)]
    Resolve(#[from] flast_resolve::ResolveError),
    #[error("cranelift error: {0}")]
    Cranelift(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CodegenResult<T> = Result<T, CodegenError>;
