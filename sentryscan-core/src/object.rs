//! Object Assembler: turns a file's `CodeObject` tree plus its computed
//! hashes into the flat [`ScanObject`] list the classifier consumes, one
//! per Code Object.

use crate::hash;
use crate::token;
use crate::types::{Arg, CodeObject, CodeObjectId, Category, Instruction, Language};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// One unit of classifier input: a single Code Object's identity, location,
/// (lazily projected) token sequence, and the score/excerpt metadata a scan
/// attaches once the classifier has run.
#[derive(Debug, Clone)]
pub struct ScanObject {
    pub id: CodeObjectId,
    pub file: String,
    pub name: String,
    pub language: Language,
    pub depth: u32,
    pub location: Option<(u32, u32)>,
    pub hash: String,
    /// Source lines `[start,end]` of the originating file, if a location is
    /// known.
    pub excerpt: Option<String>,
    score: Option<f64>,
    subword_token_count: Option<usize>,
    instructions: Vec<Instruction>,
    threshold: usize,
    /// Shared across every `ScanObject` assembled from the same file, so
    /// `MAKE_FUNCTION`/`MAKE_CLASS` can project the referenced sibling's
    /// name without re-walking the arena.
    names: Arc<HashMap<CodeObjectId, String>>,
    tokens: OnceLock<Vec<String>>,
}

impl ScanObject {
    /// The token sequence handed to the classifier, computed once and
    /// memoized rather than stored twice.
    pub fn tokens(&self) -> &[String] {
        self.tokens.get_or_init(|| {
            self.instructions
                .iter()
                .flat_map(|i| token::project_instruction(i, self.language, self.threshold, &self.names))
                .collect()
        })
    }

    /// Every category token carried by this object's own instructions, in
    /// emission order, duplicates included.
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.instructions.iter().filter_map(|i| match &i.arg {
            Arg::Category(c) => Some(*c),
            _ => None,
        })
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    /// Records the classifier's maliciousness score for this object. Set
    /// once, by the scan pipeline, after the Classifier Driver scores it.
    pub fn set_score(&mut self, score: f64) {
        self.score = Some(score);
    }

    pub fn subword_token_count(&self) -> Option<usize> {
        self.subword_token_count
    }

    /// Records the count of ML subword tokens produced when the classifier
    /// further tokenizes this object's projected token sequence.
    pub fn set_subword_token_count(&mut self, count: usize) {
        self.subword_token_count = Some(count);
    }
}

/// Assembles every `CodeObject` produced for one file into its `ScanObject`s.
/// `source` is the file's full text, used only to slice the optional
/// excerpt; it is never retained.
pub fn assemble(objects: Vec<CodeObject>, threshold: usize, source: &str) -> Vec<ScanObject> {
    let hashes = hash::compute_hashes(&objects);
    let names: Arc<HashMap<CodeObjectId, String>> =
        Arc::new(objects.iter().map(|o| (o.id, o.name.clone())).collect());
    objects
        .into_iter()
        .zip(hashes)
        .map(|(obj, hash)| ScanObject {
            id: obj.id,
            file: obj.file,
            name: obj.name,
            language: obj.language,
            depth: obj.depth,
            location: obj.location,
            hash,
            excerpt: obj.location.map(|(start, end)| excerpt(source, start, end)),
            score: None,
            subword_token_count: None,
            instructions: obj.instructions,
            threshold,
            names: names.clone(),
            tokens: OnceLock::new(),
        })
        .collect()
}

fn excerpt(source: &str, start: u32, end: u32) -> String {
    let start_idx = start.saturating_sub(1) as usize;
    let end_idx = end as usize;
    source
        .lines()
        .skip(start_idx)
        .take(end_idx.saturating_sub(start_idx))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;
    use crate::types::Arena;

    #[test]
    fn assemble_produces_one_scan_object_per_code_object() {
        let source = "def f():\n    return 1\n";
        let mut arena = Arena::new();
        compile::python::compile_module(&mut arena, "t.py", source, 15, 256).unwrap();
        let objects = arena.into_vec();
        let count = objects.len();
        let scan_objects = assemble(objects, 15, source);
        assert_eq!(scan_objects.len(), count);
        assert!(scan_objects.iter().all(|o| !o.hash.is_empty()));
    }

    #[test]
    fn tokens_are_memoized_and_stable() {
        let source = "x = 5\n";
        let mut arena = Arena::new();
        compile::python::compile_module(&mut arena, "t.py", source, 15, 256).unwrap();
        let scan_objects = assemble(arena.into_vec(), 15, source);
        let first = scan_objects[0].tokens().to_vec();
        let second = scan_objects[0].tokens().to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn excerpt_slices_the_declared_line_range() {
        let source = "def f():\n    return 1\n";
        let mut arena = Arena::new();
        compile::python::compile_module(&mut arena, "t.py", source, 15, 256).unwrap();
        let scan_objects = assemble(arena.into_vec(), 15, source);
        let func = scan_objects.iter().find(|o| o.name == "f").expect("function object");
        assert_eq!(func.excerpt.as_deref(), Some("def f():\n    return 1"));
    }
}
