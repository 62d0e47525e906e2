//! Grammar selection for the curly-brace scripting language family.

use super::Adapter;
use tree_sitter::Language;

pub struct JavascriptAdapter;

impl Adapter for JavascriptAdapter {
    fn ts_language() -> Language {
        tree_sitter_javascript::LANGUAGE.into()
    }
}
