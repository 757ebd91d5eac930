#![forbid(unsafe_code)]

pub mod ast;
pub mod build;
pub mod types;

pub use ast::*;
pub use types::*;

use serde::{Deserialize, Serialize};

/// Byte range into the original source, as reported by the front-end.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
}

impl Span {
    pub fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }
}

impl From<Span> for miette::SourceSpan {
    fn from(s: Span) -> Self {
        miette::SourceSpan::new(s.offset.into(), s.len)
    }
}

pub fn span(offset: usize, len: usize) -> Span {
    Span::new(offset, len)
}

pub fn span_between(start: usize, end: usize) -> Span {
    debug_assert!(end >= start);
    span(start, end - start)
}
