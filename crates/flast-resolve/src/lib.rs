// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Module resolution and on-disk caching.
//!
//! The resolver locates imported `.fls` files, keeps parsed programs in an
//! in-memory map shared by `Rc` handle, and maintains the per-module cache
//! directories under `.build/cache/modules/` that hold metadata markers and
//! object artifacts across runs.

pub mod cache;
pub mod resolver;

pub use resolver::{resolve_imports, LoadedModule, ModuleResolver, ResolveError};
