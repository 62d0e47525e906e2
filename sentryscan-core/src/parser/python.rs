//! Grammar selection for the dynamic scripting language family.

use super::Adapter;
use tree_sitter::Language;

pub struct PythonAdapter;

impl Adapter for PythonAdapter {
    fn ts_language() -> Language {
        tree_sitter_python::LANGUAGE.into()
    }
}
