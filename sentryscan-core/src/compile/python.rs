//! Emission rules for the dynamic scripting language family, over the
//! tree-sitter-python grammar.
//!
//! The walk is ordinary recursive descent bounded by `rec`/`recursion_limit`:
//! once the bound is hit the offending subtree collapses to a single `NOP`
//! plus a `compile_truncation` warning, rather than growing the native call
//! stack without limit.

use super::{Emitter, NameOpcodes, Scope};
use crate::category;
use crate::errors::Result;
use crate::parser::python::PythonAdapter;
use crate::parser::Adapter;
use crate::types::{Arena, Arg, CodeObjectId, CompareOp, Instruction, Language, Opcode};
use crate::value;
use std::collections::HashSet;
use tree_sitter::Node;

const LANG: Language = Language::ScriptDynamic;

/// Per-call compilation context threaded through every helper: the emitter
/// currently receiving instructions, the active scope stack (innermost
/// last), the source text, and knobs copied from `ScanConfig`.
struct Ctx<'e, 'c> {
    em: &'e mut Emitter<'c>,
    scopes: Vec<Scope>,
    code: &'c str,
    recursion_limit: usize,
}

pub fn compile_module(
    arena: &mut Arena,
    file: &str,
    code: &str,
    short_literal_threshold: usize,
    recursion_limit: usize,
) -> Result<CodeObjectId> {
    let tree = match PythonAdapter::parse(code) {
        Ok(t) => t,
        Err(e) => {
            // A total grammar rejection still produces a minimal, valid
            // module object: a scan always produces a report.
            let mut em = Emitter::new(arena, file.to_string(), LANG, short_literal_threshold, recursion_limit);
            em.warn(format!("parse error: {e}"));
            em.push(Instruction::simple(Opcode::TargetedFile, 1));
            em.push(Instruction::new(Opcode::ReturnConst, Arg::None, 1));
            return Ok(em.finish(module_name(file), Vec::new(), None, 0));
        }
    };
    let root = tree.root_node();

    let mut em = Emitter::new(arena, file.to_string(), LANG, short_literal_threshold, recursion_limit);
    em.push(Instruction::simple(Opcode::TargetedFile, 1));

    let module_scope = prescan_scope(root, code, true);
    let mut ctx = Ctx {
        em: &mut em,
        scopes: vec![module_scope],
        code,
        recursion_limit,
    };
    let mut children = Vec::new();
    let mut cursor = root.walk();
    for stmt in root.named_children(&mut cursor) {
        compile_stmt(&mut ctx, stmt, 0, 0, &mut children)?;
    }
    let last_line = root.end_position().row as u32 + 1;
    em.push(Instruction::new(Opcode::ReturnConst, Arg::None, last_line));

    let end_row = root.end_position().row as u32 + 1;
    Ok(em.finish(module_name(file), children, Some((1, end_row)), 0))
}

fn module_name(file: &str) -> String {
    format!("<module:{file}>")
}

/// Collects names assigned, declared `global`, and declared `nonlocal`
/// directly within `scope_node` (not descending into nested function/class
/// bodies); this is the first of the two passes scope resolution needs.
fn prescan_scope(scope_node: Node, code: &str, is_module: bool) -> Scope {
    let mut locals = HashSet::new();
    let mut globals = HashSet::new();
    let mut nonlocals = HashSet::new();
    let mut stack = vec![scope_node];
    let mut first = true;
    while let Some(n) = stack.pop() {
        let entering_nested = !first
            && matches!(
                n.kind(),
                "function_definition" | "class_definition" | "lambda"
            );
        first = false;
        if entering_nested {
            continue;
        }
        match n.kind() {
            "global_statement" => {
                for name in identifier_list_text(n, code) {
                    globals.insert(name);
                }
            }
            "nonlocal_statement" => {
                for name in identifier_list_text(n, code) {
                    nonlocals.insert(name);
                }
            }
            "assignment" | "augmented_assignment" | "named_expression" => {
                if let Some(lhs) = n.child_by_field_name("left").or_else(|| n.child(0)) {
                    collect_assign_targets(lhs, code, &mut locals);
                }
            }
            "for_statement" => {
                if let Some(lhs) = n.child_by_field_name("left") {
                    collect_assign_targets(lhs, code, &mut locals);
                }
            }
            "with_item" => {
                if let Some(alias) = n.child_by_field_name("alias") {
                    collect_assign_targets(alias, code, &mut locals);
                }
            }
            "except_clause" => {
                // `except E as name:` binds `name` in the enclosing scope.
                let mut c = n.walk();
                for child in n.named_children(&mut c) {
                    if child.kind() == "identifier" && child != n.named_child(0).unwrap_or(child) {
                        locals.insert(child.utf8_text(code.as_bytes()).unwrap_or("").to_string());
                    }
                }
            }
            _ => {}
        }
        let mut c = n.walk();
        for child in n.children(&mut c) {
            stack.push(child);
        }
    }
    for g in &globals {
        locals.remove(g);
    }
    for nl in &nonlocals {
        locals.remove(nl);
    }
    if is_module {
        Scope::module()
    } else {
        Scope::function(HashSet::new(), locals, globals, nonlocals)
    }
}

fn identifier_list_text(n: Node, code: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut c = n.walk();
    for child in n.named_children(&mut c) {
        if child.kind() == "identifier" {
            out.push(child.utf8_text(code.as_bytes()).unwrap_or("").to_string());
        }
    }
    out
}

fn collect_assign_targets(node: Node, code: &str, locals: &mut HashSet<String>) {
    match node.kind() {
        "identifier" => {
            locals.insert(node.utf8_text(code.as_bytes()).unwrap_or("").to_string());
        }
        "tuple" | "list" | "pattern_list" => {
            let mut c = node.walk();
            for child in node.named_children(&mut c) {
                collect_assign_targets(child, code, locals);
            }
        }
        _ => {}
    }
}

fn params_from(node: Node, code: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    if let Some(params) = node.child_by_field_name("parameters") {
        let mut c = params.walk();
        for p in params.named_children(&mut c) {
            let name_node = match p.kind() {
                "identifier" => Some(p),
                "default_parameter" | "typed_parameter" | "typed_default_parameter" => {
                    p.child_by_field_name("name").or_else(|| p.named_child(0))
                }
                "list_splat_pattern" | "dictionary_splat_pattern" => p.named_child(0),
                _ => None,
            };
            if let Some(n) = name_node {
                if n.kind() == "identifier" {
                    out.insert(n.utf8_text(code.as_bytes()).unwrap_or("").to_string());
                }
            }
        }
    }
    out
}

/// Compiles one statement. `target_children` receives depth-0 child
/// `CodeObjectId`s as they're created (function/class/lambda/comprehension
/// definitions at depth 0).
fn compile_stmt(
    ctx: &mut Ctx,
    node: Node,
    depth: u32,
    rec: usize,
    target_children: &mut Vec<CodeObjectId>,
) -> Result<()> {
    if rec >= ctx.recursion_limit {
        ctx.em.warn_truncation(format!("recursion limit reached at {}", node.kind()));
        ctx.em.push(Instruction::new(Opcode::Nop, Arg::Category(crate::types::Category::StringCode), line(node)));
        return Ok(());
    }
    let line = line(node);
    match node.kind() {
        "function_definition" => {
            compile_function_def(ctx, node, depth, rec, target_children)?;
        }
        "class_definition" => {
            compile_class_def(ctx, node, depth, rec, target_children)?;
        }
        "decorated_definition" => {
            if let Some(def) = node
                .named_children(&mut node.walk())
                .last()
            {
                compile_stmt(ctx, def, depth, rec + 1, target_children)?;
            }
        }
        "expression_statement" => {
            let mut handled = false;
            if let Some(inner) = node.named_child(0) {
                if matches!(inner.kind(), "assignment" | "augmented_assignment") {
                    compile_assignment(ctx, inner, depth, rec + 1)?;
                    handled = true;
                } else {
                    compile_expr(ctx, inner, depth, rec + 1)?;
                    ctx.em.push(Instruction::simple(Opcode::PopTop, line));
                    handled = true;
                }
            }
            if !handled {
                ctx.em.push(Instruction::simple(Opcode::Nop, line));
            }
        }
        "return_statement" => {
            if let Some(value) = node.named_child(0) {
                compile_expr(ctx, value, depth, rec + 1)?;
                ctx.em.push(Instruction::simple(Opcode::ReturnValue, line));
            } else {
                ctx.em.push(Instruction::new(Opcode::ReturnConst, Arg::None, line));
            }
        }
        "if_statement" => compile_if(ctx, node, depth, rec + 1, target_children)?,
        "for_statement" => compile_for(ctx, node, depth, rec + 1, target_children)?,
        "while_statement" => compile_while(ctx, node, depth, rec + 1, target_children)?,
        "try_statement" => compile_try(ctx, node, depth, rec + 1, target_children)?,
        "with_statement" => compile_with(ctx, node, depth, rec + 1, target_children)?,
        "import_statement" => compile_import(ctx, node, line)?,
        "import_from_statement" => compile_import_from(ctx, node, line)?,
        "raise_statement" => {
            if let Some(value) = node.named_child(0) {
                compile_expr(ctx, value, depth, rec + 1)?;
            }
            ctx.em.push(Instruction::simple(Opcode::Raise, line));
        }
        "global_statement" | "nonlocal_statement" | "pass_statement" => {
            ctx.em.push(Instruction::simple(Opcode::Nop, line));
        }
        "break_statement" => {
            ctx.em.push(Instruction::simple(Opcode::JumpForward, line));
        }
        "continue_statement" => {
            ctx.em.push(Instruction::simple(Opcode::JumpBackward, line));
        }
        "assert_statement" => {
            let mut c = node.walk();
            for expr in node.named_children(&mut c) {
                compile_expr(ctx, expr, depth, rec + 1)?;
                ctx.em.push(Instruction::simple(Opcode::PopTop, line));
            }
        }
        "block" | "module" => {
            let mut c = node.walk();
            for child in node.named_children(&mut c) {
                compile_stmt(ctx, child, depth, rec + 1, target_children)?;
            }
        }
        _ => {
            ctx.em.warn(format!("unsupported statement kind: {}", node.kind()));
            ctx.em.push(Instruction::simple(Opcode::Nop, line));
        }
    }
    Ok(())
}

fn compile_block(
    ctx: &mut Ctx,
    node: Node,
    depth: u32,
    rec: usize,
    target_children: &mut Vec<CodeObjectId>,
) -> Result<()> {
    let mut c = node.walk();
    for stmt in node.named_children(&mut c) {
        compile_stmt(ctx, stmt, depth, rec, target_children)?;
    }
    Ok(())
}

fn compile_function_def(
    ctx: &mut Ctx,
    node: Node,
    depth: u32,
    rec: usize,
    target_children: &mut Vec<CodeObjectId>,
) -> Result<()> {
    let name_node = node.child_by_field_name("name");
    let name = name_node
        .map(|n| n.utf8_text(ctx.code.as_bytes()).unwrap_or("<lambda>").to_string())
        .unwrap_or_else(|| "<anonymous>".to_string());
    let body = node.child_by_field_name("body");

    if depth == 0 {
        let child_id = compile_nested_object(ctx, node, body, &name, depth, rec)?;
        target_children.push(child_id);
        let ln = line(node);
        ctx.em.push(Instruction::new(Opcode::MakeFunction, Arg::CodeObjectRef(child_id), ln));
        emit_store(ctx, &name, ln);
    } else {
        // Nested function: inlined into the enclosing stream.
        let params = params_from(node, ctx.code);
        let body_node = body.unwrap_or(node);
        let inner_scope = prescan_scope(body_node, ctx.code, false);
        let mut scope = inner_scope;
        scope.params = params;
        ctx.scopes.push(scope);
        let ln = line(node);
        ctx.em.push(Instruction::simple(Opcode::Resume, ln));
        if let Some(b) = body {
            compile_block(ctx, b, depth + 1, rec + 1, &mut Vec::new())?;
        }
        ctx.em.push(Instruction::new(Opcode::ReturnConst, Arg::None, ln));
        ctx.scopes.pop();
        // The binding itself still needs a store in the enclosing scope.
        emit_store(ctx, &name, ln);
    }
    Ok(())
}

/// Compiles a depth-0 function body into its own `CodeObject` and returns
/// its id.
fn compile_nested_object(
    ctx: &mut Ctx,
    def_node: Node,
    body: Option<Node>,
    name: &str,
    depth: u32,
    rec: usize,
) -> Result<CodeObjectId> {
    let params = params_from(def_node, ctx.code);
    let body_node = body.unwrap_or(def_node);
    let mut scope = prescan_scope(body_node, ctx.code, false);
    scope.params = params;

    let mut child_em = Emitter::new(
        ctx.em.arena,
        ctx.em.file.clone(),
        LANG,
        ctx.em.short_literal_threshold,
        ctx.em.recursion_limit,
    );
    let ln = line(def_node);
    child_em.push(Instruction::simple(Opcode::Resume, ln));
    let mut child_ctx = Ctx {
        em: &mut child_em,
        scopes: vec![scope],
        code: ctx.code,
        recursion_limit: ctx.recursion_limit,
    };
    let mut grandchildren = Vec::new();
    if let Some(b) = body {
        compile_block(&mut child_ctx, b, 0, rec + 1, &mut grandchildren)?;
    }
    child_em.push(Instruction::new(Opcode::ReturnConst, Arg::None, ln));
    let start = def_node.start_position().row as u32 + 1;
    let end = def_node.end_position().row as u32 + 1;
    Ok(child_em.finish(name.to_string(), grandchildren, Some((start, end)), depth + 1))
}

fn compile_class_def(
    ctx: &mut Ctx,
    node: Node,
    depth: u32,
    rec: usize,
    target_children: &mut Vec<CodeObjectId>,
) -> Result<()> {
    let name = node
        .child_by_field_name("name")
        .map(|n| n.utf8_text(ctx.code.as_bytes()).unwrap_or("<class>").to_string())
        .unwrap_or_else(|| "<anonymous-class>".to_string());
    let body = node.child_by_field_name("body");

    if depth == 0 {
        let mut child_em = Emitter::new(
            ctx.em.arena,
            ctx.em.file.clone(),
            LANG,
            ctx.em.short_literal_threshold,
            ctx.em.recursion_limit,
        );
        let ln = line(node);
        let class_scope = Scope::function(HashSet::new(), HashSet::new(), HashSet::new(), HashSet::new());
        let mut child_ctx = Ctx {
            em: &mut child_em,
            scopes: vec![class_scope],
            code: ctx.code,
            recursion_limit: ctx.recursion_limit,
        };
        let mut grandchildren = Vec::new();
        if let Some(b) = body {
            // Class bodies and their methods inline into one object:
            // walk statements directly at depth 1 so nested defs inside are
            // inlined rather than split out.
            compile_block(&mut child_ctx, b, 1, rec + 1, &mut grandchildren)?;
        }
        child_em.push(Instruction::new(Opcode::ReturnConst, Arg::None, ln));
        let start = node.start_position().row as u32 + 1;
        let end = node.end_position().row as u32 + 1;
        let child_id = child_em.finish(name.clone(), grandchildren, Some((start, end)), depth + 1);

        target_children.push(child_id);
        ctx.em.push(Instruction::new(Opcode::MakeClass, Arg::CodeObjectRef(child_id), ln));
        emit_store(ctx, &name, ln);
    } else {
        // A class nested inside a function: still a single inlined object,
        // but it must live in the enclosing stream's scope, so we simply
        // recurse in place (methods remain inlined regardless of depth).
        let ln = line(node);
        if let Some(b) = body {
            compile_block(ctx, b, depth + 1, rec + 1, target_children)?;
        }
        emit_store(ctx, &name, ln);
    }
    Ok(())
}

fn emit_store(ctx: &mut Ctx, name: &str, ln: u32) {
    let ops = resolve(ctx, name);
    ctx.em.push(Instruction::new(ops.store, Arg::Symbol(name.to_string()), ln));
}

fn resolve(ctx: &Ctx, name: &str) -> NameOpcodes {
    ctx.scopes.last().expect("scope stack never empty").resolve(name)
}

fn compile_assignment(ctx: &mut Ctx, node: Node, depth: u32, rec: usize) -> Result<()> {
    let ln = line(node);
    let left = node.child_by_field_name("left");
    let right = node.child_by_field_name("right");
    if node.kind() == "augmented_assignment" {
        if let (Some(l), Some(r)) = (left, right) {
            compile_load_target(ctx, l, depth, rec)?;
            compile_expr(ctx, r, depth, rec)?;
            let op_text = operator_between(ctx.code, l, r);
            ctx.em.push(Instruction::simple(augmented_opcode(&op_text), ln));
            compile_store_target(ctx, l, depth, rec)?;
        }
        return Ok(());
    }
    if let Some(r) = right {
        compile_expr(ctx, r, depth, rec)?;
    } else {
        ctx.em.push(Instruction::new(Opcode::LoadConst, Arg::None, ln));
    }
    if let Some(l) = left {
        compile_store_target(ctx, l, depth, rec)?;
    }
    Ok(())
}

fn compile_load_target(ctx: &mut Ctx, node: Node, depth: u32, rec: usize) -> Result<()> {
    compile_expr(ctx, node, depth, rec)
}

fn compile_store_target(ctx: &mut Ctx, node: Node, depth: u32, rec: usize) -> Result<()> {
    let ln = line(node);
    match node.kind() {
        "identifier" => {
            let name = ident_text(ctx.code, node);
            emit_store(ctx, &name, ln);
        }
        "attribute" => {
            let obj = node.child_by_field_name("object").unwrap_or(node);
            let attr = node
                .child_by_field_name("attribute")
                .map(|n| ident_text(ctx.code, n))
                .unwrap_or_default();
            compile_expr(ctx, obj, depth, rec)?;
            ctx.em.push(Instruction::new(Opcode::StoreAttr, Arg::Symbol(attr), ln));
        }
        "subscript" => {
            let value = node.child_by_field_name("value").unwrap_or(node);
            let index = node.child_by_field_name("subscript");
            compile_expr(ctx, value, depth, rec)?;
            if let Some(idx) = index {
                compile_expr(ctx, idx, depth, rec)?;
            }
            ctx.em.push(Instruction::simple(Opcode::StoreSubscr, ln));
        }
        "tuple" | "list" | "pattern_list" => {
            let mut c = node.walk();
            for child in node.named_children(&mut c) {
                compile_store_target(ctx, child, depth, rec)?;
            }
        }
        _ => {
            ctx.em.warn(format!("unsupported assignment target: {}", node.kind()));
        }
    }
    Ok(())
}

fn compile_if(
    ctx: &mut Ctx,
    node: Node,
    depth: u32,
    rec: usize,
    target_children: &mut Vec<CodeObjectId>,
) -> Result<()> {
    let cond = node.child_by_field_name("condition");
    let consequence = node.child_by_field_name("consequence");
    let ln = line(node);
    if let Some(c) = cond {
        compile_expr(ctx, c, depth, rec)?;
    }
    let jmp_to_else = ctx.em.push_jump_placeholder(Opcode::PopJumpIfFalse, ln);
    if let Some(body) = consequence {
        compile_block(ctx, body, depth, rec, target_children)?;
    }
    let alternative = node.child_by_field_name("alternative");
    if alternative.is_some() {
        let jmp_to_end = ctx.em.push_jump_placeholder(Opcode::JumpForward, ln);
        let else_start = ctx.em.next_index();
        ctx.em.patch_jump(jmp_to_else, else_start);
        if let Some(alt) = alternative {
            compile_if_alternative(ctx, alt, depth, rec, target_children)?;
        }
        let end = ctx.em.next_index();
        ctx.em.patch_jump(jmp_to_end, end);
    } else {
        let end = ctx.em.next_index();
        ctx.em.patch_jump(jmp_to_else, end);
    }
    Ok(())
}

fn compile_if_alternative(
    ctx: &mut Ctx,
    node: Node,
    depth: u32,
    rec: usize,
    target_children: &mut Vec<CodeObjectId>,
) -> Result<()> {
    match node.kind() {
        "elif_clause" => compile_if(ctx, node, depth, rec, target_children),
        "else_clause" => {
            if let Some(body) = node.named_child(0) {
                compile_block(ctx, body, depth, rec, target_children)
            } else {
                Ok(())
            }
        }
        _ => compile_stmt(ctx, node, depth, rec, target_children),
    }
}

fn compile_for(
    ctx: &mut Ctx,
    node: Node,
    depth: u32,
    rec: usize,
    target_children: &mut Vec<CodeObjectId>,
) -> Result<()> {
    let ln = line(node);
    let right = node.child_by_field_name("right");
    let left = node.child_by_field_name("left");
    let body = node.child_by_field_name("body");
    if let Some(r) = right {
        compile_expr(ctx, r, depth, rec)?;
    }
    ctx.em.push(Instruction::simple(Opcode::GetIter, ln));
    let loop_start = ctx.em.next_index();
    let for_iter_idx = ctx.em.push_jump_placeholder(Opcode::ForIter, ln);
    if let Some(l) = left {
        compile_store_target(ctx, l, depth, rec)?;
    }
    if let Some(b) = body {
        compile_block(ctx, b, depth, rec, target_children)?;
    }
    ctx.em.push(Instruction::with_jump(Opcode::JumpBackward, ln, loop_start));
    let end = ctx.em.next_index();
    ctx.em.patch_jump(for_iter_idx, end);
    Ok(())
}

fn compile_while(
    ctx: &mut Ctx,
    node: Node,
    depth: u32,
    rec: usize,
    target_children: &mut Vec<CodeObjectId>,
) -> Result<()> {
    let ln = line(node);
    let cond = node.child_by_field_name("condition");
    let body = node.child_by_field_name("body");
    let loop_start = ctx.em.next_index();
    if let Some(c) = cond {
        compile_expr(ctx, c, depth, rec)?;
    }
    let exit_jmp = ctx.em.push_jump_placeholder(Opcode::PopJumpIfFalse, ln);
    if let Some(b) = body {
        compile_block(ctx, b, depth, rec, target_children)?;
    }
    ctx.em.push(Instruction::with_jump(Opcode::JumpBackward, ln, loop_start));
    let end = ctx.em.next_index();
    ctx.em.patch_jump(exit_jmp, end);
    Ok(())
}

fn compile_try(
    ctx: &mut Ctx,
    node: Node,
    depth: u32,
    rec: usize,
    target_children: &mut Vec<CodeObjectId>,
) -> Result<()> {
    let ln = line(node);
    ctx.em.push(Instruction::simple(Opcode::SetupFinally, ln));
    let mut c = node.walk();
    for child in node.named_children(&mut c) {
        match child.kind() {
            "block" => compile_block(ctx, child, depth, rec, target_children)?,
            "except_clause" => {
                ctx.em.push(Instruction::simple(Opcode::PopExcept, line(child)));
                if let Some(body) = child.named_children(&mut child.walk()).last() {
                    if body.kind() == "block" {
                        compile_block(ctx, body, depth, rec, target_children)?;
                    }
                }
            }
            "finally_clause" => {
                if let Some(body) = child.named_child(0) {
                    compile_block(ctx, body, depth, rec, target_children)?;
                }
            }
            "else_clause" => {
                if let Some(body) = child.named_child(0) {
                    compile_block(ctx, body, depth, rec, target_children)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn compile_with(
    ctx: &mut Ctx,
    node: Node,
    depth: u32,
    rec: usize,
    target_children: &mut Vec<CodeObjectId>,
) -> Result<()> {
    let ln = line(node);
    let mut stack = vec![node];
    let mut items = Vec::new();
    while let Some(n) = stack.pop() {
        if n.kind() == "with_item" {
            items.push(n);
            continue;
        }
        let mut c = n.walk();
        for child in n.children(&mut c) {
            stack.push(child);
        }
    }
    items.reverse();
    for item in &items {
        if let Some(value) = item.child_by_field_name("value").or_else(|| item.named_child(0)) {
            compile_expr(ctx, value, depth, rec)?;
        }
        ctx.em.push(Instruction::simple(Opcode::BeforeWith, ln));
        if let Some(alias) = item.child_by_field_name("alias") {
            compile_store_target(ctx, alias, depth, rec)?;
        }
    }
    let mut c = node.walk();
    for child in node.named_children(&mut c) {
        if child.kind() == "block" {
            compile_block(ctx, child, depth, rec, target_children)?;
        }
    }
    for _ in &items {
        ctx.em.push(Instruction::simple(Opcode::WithExit, ln));
    }
    Ok(())
}

fn compile_import(ctx: &mut Ctx, node: Node, ln: u32) -> Result<()> {
    let mut c = node.walk();
    for child in node.named_children(&mut c) {
        match child.kind() {
            "dotted_name" => {
                let name = child.utf8_text(ctx.code.as_bytes()).unwrap_or("").to_string();
                ctx.em.push(Instruction::new(Opcode::ImportName, Arg::Symbol(name.clone()), ln));
                let bound = name.split('.').next().unwrap_or(&name).to_string();
                emit_store(ctx, &bound, ln);
            }
            "aliased_import" => {
                let dotted = child
                    .child_by_field_name("name")
                    .map(|n| n.utf8_text(ctx.code.as_bytes()).unwrap_or("").to_string())
                    .unwrap_or_default();
                let alias = child
                    .child_by_field_name("alias")
                    .map(|n| ident_text(ctx.code, n))
                    .unwrap_or_default();
                ctx.em.push(Instruction::new(Opcode::ImportName, Arg::Symbol(dotted), ln));
                emit_store(ctx, &alias, ln);
            }
            _ => {}
        }
    }
    Ok(())
}

fn compile_import_from(ctx: &mut Ctx, node: Node, ln: u32) -> Result<()> {
    let module_name = node
        .child_by_field_name("module_name")
        .map(|n| n.utf8_text(ctx.code.as_bytes()).unwrap_or("").to_string())
        .unwrap_or_default();
    ctx.em.push(Instruction::new(Opcode::ImportName, Arg::Symbol(module_name), ln));
    let mut c = node.walk();
    let mut any = false;
    for child in node.named_children(&mut c) {
        match child.kind() {
            "wildcard_import" => {
                ctx.em.push(Instruction::simple(Opcode::ImportStar, ln));
                any = true;
            }
            "dotted_name" | "identifier" => {
                let name = ident_text(ctx.code, child);
                ctx.em.push(Instruction::new(Opcode::ImportFrom, Arg::Symbol(name.clone()), ln));
                emit_store(ctx, &name, ln);
                any = true;
            }
            "aliased_import" => {
                let name = child
                    .child_by_field_name("name")
                    .map(|n| ident_text(ctx.code, n))
                    .unwrap_or_default();
                let alias = child
                    .child_by_field_name("alias")
                    .map(|n| ident_text(ctx.code, n))
                    .unwrap_or_default();
                ctx.em.push(Instruction::new(Opcode::ImportFrom, Arg::Symbol(name), ln));
                emit_store(ctx, &alias, ln);
                any = true;
            }
            _ => {}
        }
    }
    let _ = any;
    Ok(())
}

fn compile_expr(ctx: &mut Ctx, node: Node, depth: u32, rec: usize) -> Result<()> {
    if rec >= ctx.recursion_limit {
        ctx.em.warn_truncation(format!("recursion limit reached at {}", node.kind()));
        ctx.em.push(Instruction::new(Opcode::Nop, Arg::Category(crate::types::Category::StringCode), line(node)));
        return Ok(());
    }
    let ln = line(node);
    match node.kind() {
        "identifier" => {
            let name = ident_text(ctx.code, node);
            let ops = resolve(ctx, &name);
            let category = category::lookup(LANG, &name.to_ascii_lowercase());
            let arg = category.map(Arg::Category).unwrap_or(Arg::Symbol(name));
            ctx.em.push(Instruction::new(ops.load, arg, ln));
        }
        "attribute" => compile_attr_chain(ctx, node, depth, rec)?,
        "call" => compile_call(ctx, node, depth, rec)?,
        "subscript" => {
            let value = node.child_by_field_name("value").unwrap_or(node);
            compile_expr(ctx, value, depth, rec)?;
            if let Some(idx) = node.child_by_field_name("subscript") {
                compile_expr(ctx, idx, depth, rec)?;
            }
            ctx.em.push(Instruction::simple(Opcode::BinarySubscr, ln));
        }
        "string" => {
            let text = string_literal_text(ctx.code, node);
            let arg = value::classify_string(&text, ctx.em.short_literal_threshold);
            ctx.em.push(Instruction::new(Opcode::LoadConst, arg, ln));
        }
        "integer" => {
            let text = text(ctx.code, node).replace('_', "");
            let v = parse_py_int(&text);
            ctx.em.push(Instruction::new(Opcode::LoadConst, value::classify_integer(v), ln));
        }
        "float" => {
            let text = text(ctx.code, node).replace('_', "");
            let v: f64 = text.parse().unwrap_or(0.0);
            ctx.em.push(Instruction::new(Opcode::LoadConst, value::classify_float(v), ln));
        }
        "true" => ctx.em.push(Instruction::new(Opcode::LoadConst, value::classify_bool(true), ln)),
        "false" => ctx.em.push(Instruction::new(Opcode::LoadConst, value::classify_bool(false), ln)),
        "none" => ctx.em.push(Instruction::new(Opcode::LoadConst, Arg::None, ln)),
        "binary_operator" => {
            let left = node.child_by_field_name("left");
            let right = node.child_by_field_name("right");
            if let (Some(l), Some(r)) = (left, right) {
                compile_expr(ctx, l, depth, rec + 1)?;
                compile_expr(ctx, r, depth, rec + 1)?;
                let op = operator_between(ctx.code, l, r);
                ctx.em.push(Instruction::simple(binary_opcode(&op), ln));
            }
        }
        "boolean_operator" => {
            let left = node.child_by_field_name("left");
            let right = node.child_by_field_name("right");
            if let (Some(l), Some(r)) = (left, right) {
                compile_expr(ctx, l, depth, rec + 1)?;
                compile_expr(ctx, r, depth, rec + 1)?;
                ctx.em.push(Instruction::simple(Opcode::BinaryOr, ln));
            }
        }
        "comparison_operator" => {
            let mut c = node.walk();
            let operands: Vec<Node> = node.named_children(&mut c).collect();
            if operands.len() >= 2 {
                compile_expr(ctx, operands[0], depth, rec + 1)?;
                compile_expr(ctx, operands[1], depth, rec + 1)?;
                let op = operator_between(ctx.code, operands[0], operands[1]);
                ctx.em.push(Instruction::new(Opcode::CompareOp, Arg::CompareOp(compare_op(&op)), ln));
            }
        }
        "not_operator" => {
            if let Some(arg) = node.named_child(0) {
                compile_expr(ctx, arg, depth, rec + 1)?;
            }
            ctx.em.push(Instruction::simple(Opcode::UnaryNot, ln));
        }
        "unary_operator" => {
            if let Some(arg) = node.child_by_field_name("argument") {
                compile_expr(ctx, arg, depth, rec + 1)?;
            }
            let op = node
                .child(0)
                .map(|n| text(ctx.code, n).to_string())
                .unwrap_or_default();
            ctx.em.push(Instruction::simple(if op == "~" { Opcode::UnaryInv } else { Opcode::UnaryNeg }, ln));
        }
        "list" => compile_container(ctx, node, depth, rec, Opcode::BuildList)?,
        "tuple" => compile_container(ctx, node, depth, rec, Opcode::BuildTuple)?,
        "set" => compile_container(ctx, node, depth, rec, Opcode::BuildSet)?,
        "dictionary" => compile_dict(ctx, node, depth, rec)?,
        "parenthesized_expression" => {
            if let Some(inner) = node.named_child(0) {
                compile_expr(ctx, inner, depth, rec + 1)?;
            }
        }
        "lambda" => compile_lambda(ctx, node, depth, rec)?,
        "list_comprehension" | "set_comprehension" | "dictionary_comprehension" | "generator_expression" => {
            compile_comprehension(ctx, node, depth, rec)?
        }
        "keyword_argument" => {
            if let Some(v) = node.child_by_field_name("value") {
                compile_expr(ctx, v, depth, rec + 1)?;
            }
        }
        "yield" => {
            if let Some(v) = node.named_child(0) {
                compile_expr(ctx, v, depth, rec + 1)?;
            } else {
                ctx.em.push(Instruction::new(Opcode::LoadConst, Arg::None, ln));
            }
            ctx.em.push(Instruction::simple(Opcode::YieldValue, ln));
        }
        "await" => {
            if let Some(v) = node.named_child(0) {
                compile_expr(ctx, v, depth, rec + 1)?;
            }
            ctx.em.push(Instruction::simple(Opcode::Await, ln));
        }
        "conditional_expression" => {
            let mut c = node.walk();
            let parts: Vec<Node> = node.named_children(&mut c).collect();
            if parts.len() == 3 {
                compile_expr(ctx, parts[1], depth, rec + 1)?;
                let jmp = ctx.em.push_jump_placeholder(Opcode::PopJumpIfFalse, ln);
                compile_expr(ctx, parts[0], depth, rec + 1)?;
                let jmp_end = ctx.em.push_jump_placeholder(Opcode::JumpForward, ln);
                let else_at = ctx.em.next_index();
                ctx.em.patch_jump(jmp, else_at);
                compile_expr(ctx, parts[2], depth, rec + 1)?;
                let end = ctx.em.next_index();
                ctx.em.patch_jump(jmp_end, end);
            }
        }
        _ => {
            ctx.em.warn(format!("unsupported expression kind: {}", node.kind()));
            ctx.em.push(Instruction::simple(Opcode::Nop, ln));
        }
    }
    Ok(())
}

fn compile_container(ctx: &mut Ctx, node: Node, depth: u32, rec: usize, opcode: Opcode) -> Result<()> {
    let mut c = node.walk();
    let mut count = 0i64;
    for child in node.named_children(&mut c) {
        compile_expr(ctx, child, depth, rec + 1)?;
        count += 1;
    }
    ctx.em.push(Instruction::new(opcode, Arg::Int(count), line(node)));
    Ok(())
}

fn compile_dict(ctx: &mut Ctx, node: Node, depth: u32, rec: usize) -> Result<()> {
    let mut c = node.walk();
    let mut count = 0i64;
    for pair in node.named_children(&mut c) {
        if pair.kind() == "pair" {
            if let Some(k) = pair.child_by_field_name("key") {
                compile_expr(ctx, k, depth, rec + 1)?;
            }
            if let Some(v) = pair.child_by_field_name("value") {
                compile_expr(ctx, v, depth, rec + 1)?;
            }
            count += 1;
        }
    }
    ctx.em.push(Instruction::new(Opcode::BuildMap, Arg::Int(count), line(node)));
    Ok(())
}

fn compile_lambda(ctx: &mut Ctx, node: Node, depth: u32, rec: usize) -> Result<()> {
    let ln = line(node);
    let params = params_from(node, ctx.code);
    let body = node.child_by_field_name("body");
    if depth == 0 {
        let mut child_em = Emitter::new(
            ctx.em.arena,
            ctx.em.file.clone(),
            LANG,
            ctx.em.short_literal_threshold,
            ctx.em.recursion_limit,
        );
        let mut scope = Scope::function(params, HashSet::new(), HashSet::new(), HashSet::new());
        if let Some(b) = body {
            scope = {
                let mut s = prescan_scope(b, ctx.code, false);
                s.params = scope.params;
                s
            };
        }
        child_em.push(Instruction::simple(Opcode::Resume, ln));
        let mut child_ctx = Ctx {
            em: &mut child_em,
            scopes: vec![scope],
            code: ctx.code,
            recursion_limit: ctx.recursion_limit,
        };
        if let Some(b) = body {
            compile_expr(&mut child_ctx, b, 0, rec + 1)?;
        }
        child_em.push(Instruction::simple(Opcode::ReturnValue, ln));
        let start = node.start_position().row as u32 + 1;
        let end = node.end_position().row as u32 + 1;
        let id = child_em.finish("<lambda>".to_string(), Vec::new(), Some((start, end)), depth + 1);
        ctx.em.push(Instruction::new(Opcode::MakeFunction, Arg::CodeObjectRef(id), ln));
    } else {
        ctx.scopes.push(Scope::function(params, HashSet::new(), HashSet::new(), HashSet::new()));
        ctx.em.push(Instruction::simple(Opcode::Resume, ln));
        if let Some(b) = body {
            compile_expr(ctx, b, depth + 1, rec + 1)?;
        }
        ctx.em.push(Instruction::simple(Opcode::ReturnValue, ln));
        ctx.scopes.pop();
    }
    Ok(())
}

/// Comprehensions get a synthetic child object only at depth 0 of their
/// enclosing definition; otherwise they inline like any other expression.
fn compile_comprehension(ctx: &mut Ctx, node: Node, depth: u32, rec: usize) -> Result<()> {
    let ln = line(node);
    let opcode = match node.kind() {
        "list_comprehension" => Opcode::ListAppend,
        "set_comprehension" => Opcode::SetAdd,
        "dictionary_comprehension" => Opcode::MapAdd,
        _ => Opcode::ListAppend,
    };
    let run = |ctx: &mut Ctx| -> Result<()> {
        let body = node.child_by_field_name("body");
        let mut c = node.walk();
        let clauses: Vec<Node> = node
            .named_children(&mut c)
            .filter(|n| n.kind() == "for_in_clause" || n.kind() == "if_clause")
            .collect();
        ctx.em.push(Instruction::new(
            match opcode {
                Opcode::MapAdd => Opcode::BuildMap,
                Opcode::SetAdd => Opcode::BuildSet,
                _ => Opcode::BuildList,
            },
            Arg::Int(0),
            ln,
        ));
        for clause in &clauses {
            if clause.kind() == "for_in_clause" {
                if let Some(right) = clause.child_by_field_name("right") {
                    compile_expr(ctx, right, depth, rec + 1)?;
                }
                ctx.em.push(Instruction::simple(Opcode::GetIter, ln));
                let idx = ctx.em.next_index();
                let exit = ctx.em.push_jump_placeholder(Opcode::ForIter, ln);
                if let Some(left) = clause.child_by_field_name("left") {
                    compile_store_target(ctx, left, depth, rec)?;
                }
                if let Some(body) = body {
                    compile_expr(ctx, body, depth, rec + 1)?;
                    ctx.em.push(Instruction::simple(opcode, ln));
                }
                ctx.em.push(Instruction::with_jump(Opcode::JumpBackward, ln, idx));
                let end = ctx.em.next_index();
                ctx.em.patch_jump(exit, end);
            } else if clause.kind() == "if_clause" {
                if let Some(cond) = clause.named_child(0) {
                    compile_expr(ctx, cond, depth, rec + 1)?;
                }
                ctx.em.push(Instruction::simple(Opcode::PopJumpIfFalse, ln));
            }
        }
        Ok(())
    };

    if depth == 0 {
        let mut child_em = Emitter::new(
            ctx.em.arena,
            ctx.em.file.clone(),
            LANG,
            ctx.em.short_literal_threshold,
            ctx.em.recursion_limit,
        );
        child_em.push(Instruction::simple(Opcode::Resume, ln));
        let mut child_ctx = Ctx {
            em: &mut child_em,
            scopes: vec![Scope::function(HashSet::new(), HashSet::new(), HashSet::new(), HashSet::new())],
            code: ctx.code,
            recursion_limit: ctx.recursion_limit,
        };
        run(&mut child_ctx)?;
        child_em.push(Instruction::simple(Opcode::ReturnValue, ln));
        let start = node.start_position().row as u32 + 1;
        let end = node.end_position().row as u32 + 1;
        let id = child_em.finish("<comprehension>".to_string(), Vec::new(), Some((start, end)), depth + 1);
        ctx.em.push(Instruction::new(Opcode::MakeFunction, Arg::CodeObjectRef(id), ln));
        ctx.em.push(Instruction::new(Opcode::Call, Arg::Int(0), ln));
    } else {
        run(ctx)?;
    }
    Ok(())
}

fn compile_attr_chain(ctx: &mut Ctx, node: Node, depth: u32, rec: usize) -> Result<()> {
    let dotted = dotted_path(node, ctx.code);
    compile_attr_chain_inner(ctx, node, depth, rec, dotted.as_deref())
}

fn compile_attr_chain_inner(
    ctx: &mut Ctx,
    node: Node,
    depth: u32,
    rec: usize,
    full_dotted: Option<&str>,
) -> Result<()> {
    let ln = line(node);
    match node.kind() {
        "identifier" => {
            let name = ident_text(ctx.code, node);
            let ops = resolve(ctx, &name);
            let category = full_dotted.and_then(|d| category::lookup(LANG, d));
            let arg = category.map(Arg::Category).unwrap_or(Arg::Symbol(name));
            ctx.em.push(Instruction::new(ops.load, arg, ln));
        }
        "attribute" => {
            let object = node.child_by_field_name("object");
            let attr = node
                .child_by_field_name("attribute")
                .map(|n| ident_text(ctx.code, n))
                .unwrap_or_default();
            if let Some(obj) = object {
                compile_attr_chain_inner(ctx, obj, depth, rec + 1, full_dotted)?;
            }
            ctx.em.push(Instruction::new(Opcode::LoadAttr, Arg::Symbol(attr), ln));
        }
        _ => compile_expr(ctx, node, depth, rec)?,
    }
    Ok(())
}

fn compile_call(ctx: &mut Ctx, node: Node, depth: u32, rec: usize) -> Result<()> {
    let ln = line(node);
    let function = node.child_by_field_name("function");
    let arguments = node.child_by_field_name("arguments");

    if let Some(f) = function {
        compile_attr_chain(ctx, f, depth, rec + 1)?;
    }

    let mut positional = 0i64;
    let mut kw_names = Vec::new();
    let mut kw_values = Vec::new();
    if let Some(args) = arguments {
        let mut c = args.walk();
        for arg in args.named_children(&mut c) {
            if arg.kind() == "keyword_argument" {
                let name = arg
                    .child_by_field_name("name")
                    .map(|n| ident_text(ctx.code, n))
                    .unwrap_or_default();
                kw_names.push(name);
                kw_values.push(arg);
            } else {
                compile_expr(ctx, arg, depth, rec + 1)?;
                positional += 1;
            }
        }
    }
    for kv in &kw_values {
        compile_expr(ctx, *kv, depth, rec + 1)?;
    }
    if !kw_names.is_empty() {
        ctx.em.push(Instruction::new(Opcode::KwNames, Arg::KwNameList(kw_names), ln));
    }
    ctx.em.push(Instruction::new(Opcode::Call, Arg::Int(positional), ln));
    Ok(())
}

fn dotted_path(node: Node, code: &str) -> Option<String> {
    match node.kind() {
        "identifier" => Some(ident_text(code, node).to_ascii_lowercase()),
        "attribute" => {
            let object = node.child_by_field_name("object")?;
            let attr = node.child_by_field_name("attribute")?;
            let base = dotted_path(object, code)?;
            Some(format!("{base}.{}", ident_text(code, attr).to_ascii_lowercase()))
        }
        _ => None,
    }
}

fn augmented_opcode(op: &str) -> Opcode {
    binary_opcode(op.trim_end_matches('='))
}

fn binary_opcode(op: &str) -> Opcode {
    match op {
        "+" => Opcode::BinaryAdd,
        "-" => Opcode::BinarySub,
        "*" => Opcode::BinaryMul,
        "/" | "//" => Opcode::BinaryDiv,
        "%" => Opcode::BinaryMod,
        "**" => Opcode::BinaryPow,
        "&" => Opcode::BinaryAnd,
        "|" => Opcode::BinaryOr,
        "^" => Opcode::BinaryXor,
        "<<" => Opcode::BinaryLshift,
        ">>" => Opcode::BinaryRshift,
        _ => Opcode::BinaryAdd,
    }
}

fn compare_op(op: &str) -> CompareOp {
    match op {
        "==" => CompareOp::Eq,
        "!=" | "<>" => CompareOp::NotEq,
        "<" => CompareOp::Lt,
        "<=" => CompareOp::LtEq,
        ">" => CompareOp::Gt,
        ">=" => CompareOp::GtEq,
        "in" => CompareOp::In,
        "not in" => CompareOp::NotIn,
        "is" => CompareOp::Is,
        "is not" => CompareOp::IsNot,
        _ => CompareOp::Eq,
    }
}

fn operator_between(code: &str, left: Node, right: Node) -> String {
    code.get(left.end_byte()..right.start_byte())
        .unwrap_or("")
        .trim()
        .to_string()
}

fn line(node: Node) -> u32 {
    node.start_position().row as u32 + 1
}

fn text<'a>(code: &'a str, node: Node) -> &'a str {
    node.utf8_text(code.as_bytes()).unwrap_or("")
}

fn ident_text(code: &str, node: Node) -> String {
    text(code, node).to_string()
}

/// Strips Python string-literal quoting/prefixes to get the inner text,
/// used only for value classification (not for reconstructing the source).
fn string_literal_text(code: &str, node: Node) -> String {
    let raw = text(code, node);
    let mut s = raw;
    for prefix in ["rb", "rB", "Rb", "RB", "br", "bR", "Br", "BR", "r", "R", "b", "B", "f", "F", "u", "U"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            if rest.starts_with('"') || rest.starts_with('\'') {
                s = rest;
                break;
            }
        }
    }
    for quote in ["\"\"\"", "'''"] {
        if s.starts_with(quote) && s.ends_with(quote) && s.len() >= quote.len() * 2 {
            return s[quote.len()..s.len() - quote.len()].to_string();
        }
    }
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        if (bytes[0] == b'"' || bytes[0] == b'\'') && bytes[s.len() - 1] == bytes[0] {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

fn parse_py_int(text: &str) -> i64 {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).unwrap_or(0);
    }
    if let Some(oct) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
        return i64::from_str_radix(oct, 8).unwrap_or(0);
    }
    if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        return i64::from_str_radix(bin, 2).unwrap_or(0);
    }
    text.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Arena;

    fn compile(code: &str) -> Vec<crate::types::CodeObject> {
        let mut arena = Arena::new();
        compile_module(&mut arena, "t.py", code, 15, 256).unwrap();
        arena.into_vec()
    }

    #[test]
    fn simple_assignment_matches_s1() {
        let objs = compile("x = 5\n");
        let module = &objs[0];
        let tokens: Vec<&str> = module.instructions.iter().map(|i| i.opcode.token()).collect();
        assert_eq!(tokens, vec!["targeted_file", "load_const", "store_name", "return_const"]);
    }

    #[test]
    fn empty_file_yields_minimal_stream() {
        let objs = compile("# just a comment\n");
        assert_eq!(objs.len(), 1);
        let tokens: Vec<&str> = objs[0].instructions.iter().map(|i| i.opcode.token()).collect();
        assert_eq!(tokens, vec!["targeted_file", "return_const"]);
    }

    #[test]
    fn top_level_function_becomes_separate_object() {
        let objs = compile("def f():\n    return 1\n");
        assert_eq!(objs.len(), 2);
        assert!(objs[0]
            .instructions
            .iter()
            .any(|i| i.opcode == Opcode::MakeFunction));
    }

    #[test]
    fn nested_function_is_inlined() {
        let objs = compile("def outer():\n    def inner():\n        return 1\n    return inner\n");
        assert_eq!(objs.len(), 2);
    }

    #[test]
    fn jump_targets_are_always_valid() {
        let objs = compile("def f(x):\n    if x:\n        return 1\n    else:\n        return 2\n");
        for obj in &objs {
            for (i, instr) in obj.instructions.iter().enumerate() {
                if let Some(t) = instr.jump_target {
                    assert!(t <= obj.instructions.len(), "jump from {i} targets {t} out of bounds");
                }
            }
        }
    }

    #[test]
    fn import_emits_import_name_and_store() {
        let objs = compile("import os\n");
        let ops: Vec<Opcode> = objs[0].instructions.iter().map(|i| i.opcode).collect();
        assert!(ops.contains(&Opcode::ImportName));
    }

    #[test]
    fn dotted_call_substitutes_category_on_base_load() {
        let objs = compile("import os\nos.system(\"ls\")\n");
        let found = objs[0].instructions.iter().any(|i| {
            matches!(&i.arg, Arg::Category(c) if *c == crate::types::Category::ProcessManagement)
                && i.opcode == Opcode::LoadGlobal
        });
        assert!(found, "expected os.system's base load to carry process_management");
    }

    #[test]
    fn recompiling_same_source_is_deterministic() {
        let src = "def f(a, b=1, *args, **kw):\n    return a + b\n";
        let a = compile(src);
        let b = compile(src);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.instructions, y.instructions);
        }
    }

    #[test]
    fn kw_names_precede_call_with_correct_positional_count() {
        let objs = compile("f(1, 2, shell=True)\n");
        let ops: Vec<(&Opcode, &Arg)> = objs[0]
            .instructions
            .iter()
            .map(|i| (&i.opcode, &i.arg))
            .collect();
        let kw_idx = ops.iter().position(|(op, _)| **op == Opcode::KwNames).unwrap();
        let (call_op, call_arg) = ops[kw_idx + 1];
        assert_eq!(*call_op, Opcode::Call);
        assert_eq!(*call_arg, Arg::Int(2));
    }
}
