// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Lexer for Flast source code.

pub mod lexer;

pub use lexer::{LexError, LexErrorKind, LexResult, Lexer};
