//! AST-to-Instruction Compiler: the heart of the core. Walks a parsed file
//! and emits a [`CodeObject`] tree using the closed opcode set.

pub mod javascript;
pub mod python;

use crate::errors::Warning;
use crate::types::{Arena, CodeObject, CodeObjectId, Instruction, Language, Opcode};
use std::collections::HashSet;

/// Bound on recursive descent into the source tree. Exceeding it records a
/// warning and truncates the offending subtree instead of aborting.
pub const DEFAULT_RECURSION_LIMIT: usize = 256;

/// Lexical scope used to resolve a name to a load/store opcode pair.
/// Built by a pre-pass over a function/module body before any instruction
/// for that body is emitted, so forward references resolve the same way a
/// backward reference would.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub is_module: bool,
    pub params: HashSet<String>,
    pub locals: HashSet<String>,
    pub globals: HashSet<String>,
    /// Names bound in an enclosing function scope (Python `nonlocal`, JS
    /// closure capture). `LOAD_CLOSURE` exists in the opcode set with no
    /// assignment rule of its own, so this crate assigns it to the one
    /// case real closures actually need (see DESIGN.md).
    pub nonlocals: HashSet<String>,
}

/// The two opcodes produced for a name reference: load and store.
#[derive(Debug, Clone, Copy)]
pub struct NameOpcodes {
    pub load: Opcode,
    pub store: Opcode,
}

impl Scope {
    pub fn module() -> Self {
        Self {
            is_module: true,
            ..Default::default()
        }
    }

    pub fn function(
        params: HashSet<String>,
        locals: HashSet<String>,
        globals: HashSet<String>,
        nonlocals: HashSet<String>,
    ) -> Self {
        Self {
            is_module: false,
            params,
            locals,
            globals,
            nonlocals,
        }
    }

    /// Resolves a name to its load/store opcode pair (extended with
    /// `nonlocals`, see the field doc comment).
    ///
    /// A bare module-level binding is `LOAD_NAME`/`STORE_NAME`, not
    /// `LOAD_GLOBAL`/`STORE_GLOBAL`: `GLOBAL`-family opcodes are reserved for
    /// names explicitly declared `global` inside a function scope, matching
    /// spec.md's own literal scenarios (S1's `x = 5` is `store_name x`; S3's
    /// `import os` is `store_name os`) over its prose summary of rule 7,
    /// which this crate treats as imprecise on this point.
    pub fn resolve(&self, name: &str) -> NameOpcodes {
        if self.params.contains(name) {
            return NameOpcodes {
                load: Opcode::LoadParam,
                store: Opcode::StoreFast,
            };
        }
        if self.nonlocals.contains(name) {
            return NameOpcodes {
                load: Opcode::LoadClosure,
                store: Opcode::StoreFast,
            };
        }
        if self.globals.contains(name) {
            return NameOpcodes {
                load: Opcode::LoadGlobal,
                store: Opcode::StoreGlobal,
            };
        }
        if self.locals.contains(name) {
            return NameOpcodes {
                load: Opcode::LoadFast,
                store: Opcode::StoreFast,
            };
        }
        NameOpcodes {
            load: Opcode::LoadName,
            store: Opcode::StoreName,
        }
    }
}

/// Accumulates instructions for one `CodeObject` under construction and owns
/// the arena its children are pushed into.
pub struct Emitter<'a> {
    pub arena: &'a mut Arena,
    pub instructions: Vec<Instruction>,
    pub warnings: Vec<Warning>,
    pub file: String,
    pub language: Language,
    pub short_literal_threshold: usize,
    pub recursion_limit: usize,
}

impl<'a> Emitter<'a> {
    pub fn new(
        arena: &'a mut Arena,
        file: String,
        language: Language,
        short_literal_threshold: usize,
        recursion_limit: usize,
    ) -> Self {
        Self {
            arena,
            instructions: Vec::new(),
            warnings: Vec::new(),
            file,
            language,
            short_literal_threshold,
            recursion_limit,
        }
    }

    pub fn push(&mut self, instr: Instruction) -> usize {
        let idx = self.instructions.len();
        self.instructions.push(instr);
        idx
    }

    /// Reserves a jump instruction slot, to be patched once the target is known.
    pub fn push_jump_placeholder(&mut self, opcode: Opcode, line: u32) -> usize {
        self.push(Instruction::with_jump(opcode, line, 0))
    }

    pub fn patch_jump(&mut self, idx: usize, target: usize) {
        self.instructions[idx].jump_target = Some(target);
    }

    pub fn next_index(&self) -> usize {
        self.instructions.len()
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(Warning::parse_error(message.into()));
    }

    pub fn warn_truncation(&mut self, message: impl Into<String>) {
        self.warnings.push(Warning::truncation(message.into()));
    }

    /// Finishes this emitter into a [`CodeObject`], pushing it into the arena.
    pub fn finish(
        self,
        name: String,
        children: Vec<CodeObjectId>,
        location: Option<(u32, u32)>,
        depth: u32,
    ) -> CodeObjectId {
        let id = CodeObjectId(self.arena.len());
        let object = CodeObject {
            id,
            name,
            instructions: self.instructions,
            children,
            location,
            depth,
            file: self.file,
            language: self.language,
            warnings: self.warnings,
        };
        self.arena.push(object)
    }
}

/// Compiles one source file into its module `CodeObject` plus every
/// top-level (depth 0) function/class/lambda/comprehension `CodeObject`.
/// Module objects carry references to child code objects, never their
/// bodies.
pub fn compile_file(
    file: &str,
    code: &str,
    language: Language,
    short_literal_threshold: usize,
    recursion_limit: usize,
) -> crate::errors::Result<Vec<CodeObject>> {
    let mut arena = Arena::new();
    match language {
        Language::ScriptDynamic => {
            python::compile_module(&mut arena, file, code, short_literal_threshold, recursion_limit)?;
        }
        Language::ScriptCurly => {
            javascript::compile_module(&mut arena, file, code, short_literal_threshold, recursion_limit)?;
        }
    }
    Ok(arena.into_vec())
}
