//! Wraps a concrete-syntax-tree parser behind a uniform interface. `tree_sitter::Node` already exposes typed kinds,
//! child-by-field access and exact byte spans, so the adapter's job is
//! mostly grammar selection and turning a hard parser failure into
//! [`crate::errors::Error::Parse`].

pub mod javascript;
pub mod python;

use crate::errors::{Error, Result};
use tree_sitter::{Language as TsLanguage, Parser, Tree};

/// A concrete-syntax-tree grammar for one supported source language.
pub trait Adapter {
    fn ts_language() -> TsLanguage;

    fn parse(code: &str) -> Result<Tree> {
        let mut parser = Parser::new();
        parser
            .set_language(&Self::ts_language())
            .map_err(|_| Error::TreeSitterLanguage)?;
        parser
            .parse(code, None)
            .ok_or_else(|| Error::Parse("grammar rejected input".to_string()))
    }
}
