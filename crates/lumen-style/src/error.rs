//! Builder errors
//!
//! Resolution itself never fails: unmatched selectors and unresolvable
//! values recover locally. Errors exist only for structural misuse of the
//! builder APIs.

/// Errors from selector and declaration construction
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StyleError {
    #[error("duplicate declaration for `{0}` in one block")]
    DuplicateDeclaration(String),

    #[error("selector has an empty compound")]
    EmptySelector,

    #[error("nth step and offset cannot both be zero")]
    InvalidNth,
}
