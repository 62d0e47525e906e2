//! Instruction hashing: a Merkle-like Code Object fingerprint. Excludes
//! line numbers so formatting-only diffs don't change identity, and
//! substitutes a child's already-computed hash wherever the parent
//! instruction stream references it, so the hash commits to the whole
//! subtree without re-hashing its bytes.

use crate::types::{Arg, CodeObject, CodeObjectId};
use sha2::{Digest, Sha256};

/// Computes every object's hash in one pass. Relies on the arena invariant
/// that a child is always pushed before the parent instruction referencing
/// it, so a single ascending pass already has every dependency hashed by
/// the time it's needed.
pub fn compute_hashes(objects: &[CodeObject]) -> Vec<String> {
    let mut hashes: Vec<String> = Vec::with_capacity(objects.len());
    for obj in objects {
        hashes.push(hash_one(obj, &hashes));
    }
    hashes
}

fn hash_one(obj: &CodeObject, prior_hashes: &[String]) -> String {
    let mut hasher = Sha256::new();
    for instr in &obj.instructions {
        hasher.update(instr.opcode.token().as_bytes());
        hasher.update([0u8]);
        match &instr.arg {
            Arg::CodeObjectRef(child_id) => {
                hasher.update(child_hash(*child_id, prior_hashes).as_bytes());
            }
            other => hasher.update(canonical_arg(other).as_bytes()),
        }
        hasher.update([0xffu8]);
    }
    format!("{:x}", hasher.finalize())
}

fn child_hash(id: CodeObjectId, prior_hashes: &[String]) -> String {
    prior_hashes
        .get(id.0)
        .cloned()
        .unwrap_or_else(|| "0".repeat(64))
}

fn canonical_arg(arg: &Arg) -> String {
    match arg {
        Arg::None => "none".to_string(),
        Arg::Int(v) => format!("int:{v}"),
        Arg::Float(v) => format!("float:{v}"),
        Arg::Bool(v) => format!("bool:{v}"),
        Arg::Str(s) => format!("str:{s}"),
        Arg::Symbol(s) => format!("sym:{s}"),
        Arg::Category(c) => format!("cat:{}", c.token()),
        Arg::CodeObjectRef(_) => unreachable!("handled by caller"),
        Arg::KwNameList(names) => format!("kw:{}", names.join(",")),
        Arg::CompareOp(op) => format!("cmp:{op:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;
    use crate::types::Arena;

    #[test]
    fn identical_sources_hash_identically() {
        let mut a = Arena::new();
        compile::python::compile_module(&mut a, "a.py", "x = 1\n", 15, 256).unwrap();
        let mut b = Arena::new();
        compile::python::compile_module(&mut b, "b.py", "x = 1\n", 15, 256).unwrap();
        assert_eq!(compute_hashes(&a.into_vec()), compute_hashes(&b.into_vec()));
    }

    #[test]
    fn line_shift_does_not_change_hash() {
        let mut a = Arena::new();
        compile::python::compile_module(&mut a, "a.py", "x = 1\n", 15, 256).unwrap();
        let mut b = Arena::new();
        compile::python::compile_module(&mut b, "b.py", "\n\n\nx = 1\n", 15, 256).unwrap();
        assert_eq!(compute_hashes(&a.into_vec()), compute_hashes(&b.into_vec()));
    }

    #[test]
    fn different_bodies_hash_differently() {
        let mut a = Arena::new();
        compile::python::compile_module(&mut a, "a.py", "x = 1\n", 15, 256).unwrap();
        let mut b = Arena::new();
        compile::python::compile_module(&mut b, "b.py", "x = 2\n", 15, 256).unwrap();
        assert_ne!(compute_hashes(&a.into_vec()), compute_hashes(&b.into_vec()));
    }

    #[test]
    fn parent_hash_changes_when_child_body_changes() {
        let mut a = Arena::new();
        compile::python::compile_module(&mut a, "a.py", "def f():\n    return 1\n", 15, 256).unwrap();
        let mut b = Arena::new();
        compile::python::compile_module(&mut b, "b.py", "def f():\n    return 2\n", 15, 256).unwrap();
        let ha = compute_hashes(&a.into_vec());
        let hb = compute_hashes(&b.into_vec());
        assert_ne!(ha[0], hb[0], "module hash should change when the child it references changes");
    }
}
