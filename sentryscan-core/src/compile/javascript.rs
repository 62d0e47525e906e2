//! Emission rules for the curly-brace scripting language family, over the
//! tree-sitter-javascript grammar. Mirrors `compile/python.rs`'s shape;
//! only node kinds, call conventions (`require`/ESM import forms) and
//! operator spellings differ.

use super::{Emitter, NameOpcodes, Scope};
use crate::category;
use crate::errors::Result;
use crate::parser::javascript::JavascriptAdapter;
use crate::parser::Adapter;
use crate::types::{Arena, Arg, CodeObjectId, CompareOp, Instruction, Language, Opcode};
use crate::value;
use std::collections::HashSet;
use tree_sitter::Node;

const LANG: Language = Language::ScriptCurly;

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
    let tree = match JavascriptAdapter::parse(code) {
        Ok(t) => t,
        Err(e) => {
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

fn prescan_scope(scope_node: Node, code: &str, is_module: bool) -> Scope {
    let mut locals = HashSet::new();
    let mut stack = vec![scope_node];
    let mut first = true;
    while let Some(n) = stack.pop() {
        let entering_nested = !first
            && matches!(
                n.kind(),
                "function_declaration"
                    | "function_expression"
                    | "arrow_function"
                    | "method_definition"
                    | "class_declaration"
                    | "class"
            );
        first = false;
        if entering_nested {
            continue;
        }
        match n.kind() {
            "variable_declarator" => {
                if let Some(name) = n.child_by_field_name("name") {
                    collect_assign_targets(name, code, &mut locals);
                }
            }
            "assignment_expression" => {
                if let Some(left) = n.child_by_field_name("left") {
                    collect_assign_targets(left, code, &mut locals);
                }
            }
            "catch_clause" => {
                if let Some(param) = n.child_by_field_name("parameter") {
                    collect_assign_targets(param, code, &mut locals);
                }
            }
            "for_in_statement" => {
                if let Some(left) = n.child_by_field_name("left") {
                    collect_assign_targets(left, code, &mut locals);
                }
            }
            "import_statement" => {
                // ESM bindings behave like locals of the module scope.
                let mut c = n.walk();
                for child in n.named_children(&mut c) {
                    collect_import_binding(child, code, &mut locals);
                }
            }
            _ => {}
        }
        let mut c = n.walk();
        for child in n.children(&mut c) {
            stack.push(child);
        }
    }
    if is_module {
        Scope::module()
    } else {
        Scope::function(HashSet::new(), locals, HashSet::new(), HashSet::new())
    }
}

fn collect_import_binding(node: Node, code: &str, locals: &mut HashSet<String>) {
    match node.kind() {
        "identifier" => {
            locals.insert(node.utf8_text(code.as_bytes()).unwrap_or("").to_string());
        }
        "import_clause" | "named_imports" | "import_specifier" | "namespace_import" => {
            let mut c = node.walk();
            for child in node.named_children(&mut c) {
                collect_import_binding(child, code, locals);
            }
        }
        _ => {}
    }
}

fn collect_assign_targets(node: Node, code: &str, locals: &mut HashSet<String>) {
    match node.kind() {
        "identifier" | "shorthand_property_identifier_pattern" => {
            locals.insert(node.utf8_text(code.as_bytes()).unwrap_or("").to_string());
        }
        "array_pattern" | "object_pattern" => {
            let mut c = node.walk();
            for child in node.named_children(&mut c) {
                collect_assign_targets(child, code, locals);
            }
        }
        "pair_pattern" => {
            if let Some(v) = node.child_by_field_name("value") {
                collect_assign_targets(v, code, locals);
            }
        }
        "assignment_pattern" => {
            if let Some(l) = node.child_by_field_name("left") {
                collect_assign_targets(l, code, locals);
            }
        }
        "rest_pattern" => {
            if let Some(inner) = node.named_child(0) {
                collect_assign_targets(inner, code, locals);
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
            collect_assign_targets(p, code, &mut out);
        }
    } else if let Some(single) = node.child_by_field_name("parameter") {
        collect_assign_targets(single, code, &mut out);
    }
    out
}

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
    let ln = line(node);
    match node.kind() {
        "function_declaration" => compile_function_def(ctx, node, depth, rec, target_children, None)?,
        "class_declaration" => compile_class_def(ctx, node, depth, rec, target_children)?,
        "lexical_declaration" | "variable_declaration" => {
            let mut c = node.walk();
            for decl in node.named_children(&mut c) {
                if decl.kind() == "variable_declarator" {
                    compile_declarator(ctx, decl, depth, rec + 1)?;
                }
            }
        }
        "expression_statement" => {
            if let Some(inner) = node.named_child(0) {
                if inner.kind() == "assignment_expression" {
                    compile_assignment(ctx, inner, depth, rec + 1)?;
                } else {
                    compile_expr(ctx, inner, depth, rec + 1)?;
                    ctx.em.push(Instruction::simple(Opcode::PopTop, ln));
                }
            }
        }
        "return_statement" => {
            if let Some(value) = node.named_child(0) {
                compile_expr(ctx, value, depth, rec + 1)?;
                ctx.em.push(Instruction::simple(Opcode::ReturnValue, ln));
            } else {
                ctx.em.push(Instruction::new(Opcode::ReturnConst, Arg::None, ln));
            }
        }
        "if_statement" => compile_if(ctx, node, depth, rec + 1, target_children)?,
        "for_statement" => compile_for_c_style(ctx, node, depth, rec + 1, target_children)?,
        "for_in_statement" => compile_for_in(ctx, node, depth, rec + 1, target_children)?,
        "while_statement" => compile_while(ctx, node, depth, rec + 1, target_children)?,
        "try_statement" => compile_try(ctx, node, depth, rec + 1, target_children)?,
        "import_statement" => compile_import(ctx, node, ln)?,
        "export_statement" => {
            let mut c = node.walk();
            for child in node.named_children(&mut c) {
                compile_stmt(ctx, child, depth, rec + 1, target_children)?;
            }
        }
        "throw_statement" => {
            if let Some(v) = node.named_child(0) {
                compile_expr(ctx, v, depth, rec + 1)?;
            }
            ctx.em.push(Instruction::simple(Opcode::Raise, ln));
        }
        "break_statement" => ctx.em.push(Instruction::simple(Opcode::JumpForward, ln)),
        "continue_statement" => ctx.em.push(Instruction::simple(Opcode::JumpBackward, ln)),
        "empty_statement" => ctx.em.push(Instruction::simple(Opcode::Nop, ln)),
        "statement_block" | "program" => {
            let mut c = node.walk();
            for child in node.named_children(&mut c) {
                compile_stmt(ctx, child, depth, rec + 1, target_children)?;
            }
        }
        _ => {
            ctx.em.warn(format!("unsupported statement kind: {}", node.kind()));
            ctx.em.push(Instruction::simple(Opcode::Nop, ln));
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
    if node.kind() == "statement_block" || node.kind() == "program" {
        let mut c = node.walk();
        for stmt in node.named_children(&mut c) {
            compile_stmt(ctx, stmt, depth, rec, target_children)?;
        }
    } else {
        compile_stmt(ctx, node, depth, rec, target_children)?;
    }
    Ok(())
}

fn compile_declarator(ctx: &mut Ctx, node: Node, depth: u32, rec: usize) -> Result<()> {
    let ln = line(node);
    let name = node.child_by_field_name("name");
    let value = node.child_by_field_name("value");
    if let Some(v) = value {
        compile_expr(ctx, v, depth, rec)?;
    } else {
        ctx.em.push(Instruction::new(Opcode::LoadConst, Arg::None, ln));
    }
    if let Some(n) = name {
        compile_store_target(ctx, n, depth, rec)?;
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

fn compile_function_def(
    ctx: &mut Ctx,
    node: Node,
    depth: u32,
    rec: usize,
    target_children: &mut Vec<CodeObjectId>,
    bind_name: Option<String>,
) -> Result<()> {
    let name = bind_name
        .or_else(|| node.child_by_field_name("name").map(|n| ident_text(ctx.code, n)))
        .unwrap_or_else(|| "<anonymous>".to_string());
    let body = node.child_by_field_name("body");

    if depth == 0 {
        let child_id = compile_nested_object(ctx, node, body, &name, depth, rec)?;
        target_children.push(child_id);
        let ln = line(node);
        ctx.em.push(Instruction::new(Opcode::MakeFunction, Arg::CodeObjectRef(child_id), ln));
        if node.child_by_field_name("name").is_some() {
            emit_store(ctx, &name, ln);
        }
    } else {
        let params = params_from(node, ctx.code);
        let body_node = body.unwrap_or(node);
        let mut scope = prescan_scope(body_node, ctx.code, false);
        scope.params = params;
        ctx.scopes.push(scope);
        let ln = line(node);
        ctx.em.push(Instruction::simple(Opcode::Resume, ln));
        if let Some(b) = body {
            compile_block(ctx, b, depth + 1, rec + 1, &mut Vec::new())?;
        }
        ctx.em.push(Instruction::new(Opcode::ReturnConst, Arg::None, ln));
        ctx.scopes.pop();
        if node.child_by_field_name("name").is_some() {
            emit_store(ctx, &name, ln);
        }
    }
    Ok(())
}

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
    match body {
        Some(b) if b.kind() == "statement_block" => {
            compile_block(&mut child_ctx, b, 0, rec + 1, &mut grandchildren)?;
            child_em.push(Instruction::new(Opcode::ReturnConst, Arg::None, ln));
        }
        Some(expr) => {
            // Arrow function with an expression body: implicit return.
            compile_expr(&mut child_ctx, expr, 0, rec + 1)?;
            child_em.push(Instruction::simple(Opcode::ReturnValue, ln));
        }
        None => {
            child_em.push(Instruction::new(Opcode::ReturnConst, Arg::None, ln));
        }
    }
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
        .map(|n| ident_text(ctx.code, n))
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
            let mut c = b.walk();
            for member in b.named_children(&mut c) {
                if member.kind() == "method_definition" {
                    compile_method(&mut child_ctx, member, 1, rec + 1, &mut grandchildren)?;
                }
            }
        }
        child_em.push(Instruction::new(Opcode::ReturnConst, Arg::None, ln));
        let start = node.start_position().row as u32 + 1;
        let end = node.end_position().row as u32 + 1;
        let child_id = child_em.finish(name.clone(), grandchildren, Some((start, end)), depth + 1);

        target_children.push(child_id);
        ctx.em.push(Instruction::new(Opcode::MakeClass, Arg::CodeObjectRef(child_id), ln));
        emit_store(ctx, &name, ln);
    } else {
        let ln = line(node);
        if let Some(b) = body {
            let mut c = b.walk();
            for member in b.named_children(&mut c) {
                if member.kind() == "method_definition" {
                    compile_method(ctx, member, depth + 1, rec + 1, target_children)?;
                }
            }
        }
        emit_store(ctx, &name, ln);
    }
    Ok(())
}

/// A method body inlines into the enclosing class object, just
/// like a nested function inlines into its enclosing function.
fn compile_method(
    ctx: &mut Ctx,
    node: Node,
    depth: u32,
    rec: usize,
    target_children: &mut Vec<CodeObjectId>,
) -> Result<()> {
    let name = node
        .child_by_field_name("name")
        .map(|n| ident_text(ctx.code, n))
        .unwrap_or_else(|| "<method>".to_string());
    let params = params_from(node, ctx.code);
    let body = node.child_by_field_name("body");
    let mut scope = body
        .map(|b| prescan_scope(b, ctx.code, false))
        .unwrap_or_default();
    scope.params = params;
    ctx.scopes.push(scope);
    let ln = line(node);
    ctx.em.push(Instruction::simple(Opcode::Resume, ln));
    if let Some(b) = body {
        compile_block(ctx, b, depth, rec + 1, target_children)?;
    }
    ctx.em.push(Instruction::new(Opcode::ReturnConst, Arg::None, ln));
    ctx.scopes.pop();
    let _ = name;
    Ok(())
}

fn compile_assignment(ctx: &mut Ctx, node: Node, depth: u32, rec: usize) -> Result<()> {
    let ln = line(node);
    let left = node.child_by_field_name("left");
    let right = node.child_by_field_name("right");
    let op = node
        .child_by_field_name("operator")
        .map(|n| text(ctx.code, n).to_string())
        .unwrap_or_else(|| "=".to_string());
    if op != "=" {
        if let (Some(l), Some(r)) = (left, right) {
            compile_expr(ctx, l, depth, rec)?;
            compile_expr(ctx, r, depth, rec)?;
            ctx.em.push(Instruction::simple(binary_opcode(op.trim_end_matches('=')), ln));
            compile_store_target(ctx, l, depth, rec)?;
        }
        return Ok(());
    }
    if let Some(r) = right {
        compile_expr(ctx, r, depth, rec)?;
    }
    if let Some(l) = left {
        compile_store_target(ctx, l, depth, rec)?;
    }
    Ok(())
}

fn compile_store_target(ctx: &mut Ctx, node: Node, depth: u32, rec: usize) -> Result<()> {
    let ln = line(node);
    match node.kind() {
        "identifier" => emit_store(ctx, &ident_text(ctx.code, node), ln),
        "member_expression" => {
            let object = node.child_by_field_name("object").unwrap_or(node);
            let property = node
                .child_by_field_name("property")
                .map(|n| ident_text(ctx.code, n))
                .unwrap_or_default();
            compile_expr(ctx, object, depth, rec)?;
            ctx.em.push(Instruction::new(Opcode::StoreAttr, Arg::Symbol(property), ln));
        }
        "subscript_expression" => {
            let object = node.child_by_field_name("object").unwrap_or(node);
            let index = node.child_by_field_name("index");
            compile_expr(ctx, object, depth, rec)?;
            if let Some(idx) = index {
                compile_expr(ctx, idx, depth, rec)?;
            }
            ctx.em.push(Instruction::simple(Opcode::StoreSubscr, ln));
        }
        "array_pattern" | "object_pattern" => {
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
    let ln = line(node);
    if let Some(c) = node.child_by_field_name("condition") {
        compile_expr(ctx, c, depth, rec)?;
    }
    let jmp_else = ctx.em.push_jump_placeholder(Opcode::PopJumpIfFalse, ln);
    if let Some(body) = node.child_by_field_name("consequence") {
        compile_block(ctx, body, depth, rec, target_children)?;
    }
    let alt = node.child_by_field_name("alternative");
    if let Some(a) = alt {
        let jmp_end = ctx.em.push_jump_placeholder(Opcode::JumpForward, ln);
        let else_start = ctx.em.next_index();
        ctx.em.patch_jump(jmp_else, else_start);
        compile_block(ctx, a, depth, rec, target_children)?;
        let end = ctx.em.next_index();
        ctx.em.patch_jump(jmp_end, end);
    } else {
        let end = ctx.em.next_index();
        ctx.em.patch_jump(jmp_else, end);
    }
    Ok(())
}

fn compile_for_c_style(
    ctx: &mut Ctx,
    node: Node,
    depth: u32,
    rec: usize,
    target_children: &mut Vec<CodeObjectId>,
) -> Result<()> {
    let ln = line(node);
    if let Some(init) = node.child_by_field_name("initializer") {
        match init.kind() {
            "variable_declaration" | "lexical_declaration" => compile_stmt(ctx, init, depth, rec, target_children)?,
            _ => {
                compile_expr(ctx, init, depth, rec)?;
                ctx.em.push(Instruction::simple(Opcode::PopTop, ln));
            }
        }
    }
    let loop_start = ctx.em.next_index();
    let mut exit_jmp = None;
    if let Some(cond) = node.child_by_field_name("condition") {
        compile_expr(ctx, cond, depth, rec)?;
        exit_jmp = Some(ctx.em.push_jump_placeholder(Opcode::PopJumpIfFalse, ln));
    }
    if let Some(body) = node.child_by_field_name("body") {
        compile_block(ctx, body, depth, rec, target_children)?;
    }
    if let Some(update) = node.child_by_field_name("increment") {
        compile_expr(ctx, update, depth, rec)?;
        ctx.em.push(Instruction::simple(Opcode::PopTop, ln));
    }
    ctx.em.push(Instruction::with_jump(Opcode::JumpBackward, ln, loop_start));
    let end = ctx.em.next_index();
    if let Some(idx) = exit_jmp {
        ctx.em.patch_jump(idx, end);
    }
    Ok(())
}

fn compile_for_in(
    ctx: &mut Ctx,
    node: Node,
    depth: u32,
    rec: usize,
    target_children: &mut Vec<CodeObjectId>,
) -> Result<()> {
    let ln = line(node);
    let left = node.child_by_field_name("left");
    let right = node.child_by_field_name("right");
    let body = node.child_by_field_name("body");
    if let Some(r) = right {
        compile_expr(ctx, r, depth, rec)?;
    }
    ctx.em.push(Instruction::simple(Opcode::GetIter, ln));
    let loop_start = ctx.em.next_index();
    let exit_jmp = ctx.em.push_jump_placeholder(Opcode::ForIter, ln);
    if let Some(l) = left {
        compile_store_target(ctx, l, depth, rec)?;
    }
    if let Some(b) = body {
        compile_block(ctx, b, depth, rec, target_children)?;
    }
    ctx.em.push(Instruction::with_jump(Opcode::JumpBackward, ln, loop_start));
    let end = ctx.em.next_index();
    ctx.em.patch_jump(exit_jmp, end);
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
    let loop_start = ctx.em.next_index();
    if let Some(c) = node.child_by_field_name("condition") {
        compile_expr(ctx, c, depth, rec)?;
    }
    let exit_jmp = ctx.em.push_jump_placeholder(Opcode::PopJumpIfFalse, ln);
    if let Some(body) = node.child_by_field_name("body") {
        compile_block(ctx, body, depth, rec, target_children)?;
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
    if let Some(body) = node.child_by_field_name("body") {
        compile_block(ctx, body, depth, rec, target_children)?;
    }
    if let Some(handler) = node.child_by_field_name("handler") {
        ctx.em.push(Instruction::simple(Opcode::PopExcept, line(handler)));
        if let Some(param) = handler.child_by_field_name("parameter") {
            compile_store_target(ctx, param, depth, rec)?;
        }
        if let Some(body) = handler.child_by_field_name("body") {
            compile_block(ctx, body, depth, rec, target_children)?;
        }
    }
    if let Some(finalizer) = node.child_by_field_name("finalizer") {
        compile_block(ctx, finalizer, depth, rec, target_children)?;
    }
    Ok(())
}

fn compile_import(ctx: &mut Ctx, node: Node, ln: u32) -> Result<()> {
    let source = node
        .child_by_field_name("source")
        .map(|n| string_literal_text(ctx.code, n))
        .unwrap_or_default();
    ctx.em.push(Instruction::new(Opcode::ImportName, Arg::Symbol(source), ln));
    let mut stack = vec![node];
    while let Some(n) = stack.pop() {
        match n.kind() {
            "namespace_import" => {
                if let Some(ident) = n.named_child(0) {
                    let name = ident_text(ctx.code, ident);
                    ctx.em.push(Instruction::simple(Opcode::ImportStar, ln));
                    emit_store(ctx, &name, ln);
                }
                continue;
            }
            "import_specifier" => {
                let local = n
                    .child_by_field_name("alias")
                    .or_else(|| n.child_by_field_name("name"))
                    .map(|x| ident_text(ctx.code, x))
                    .unwrap_or_default();
                let imported = n
                    .child_by_field_name("name")
                    .map(|x| ident_text(ctx.code, x))
                    .unwrap_or_else(|| local.clone());
                ctx.em.push(Instruction::new(Opcode::ImportFrom, Arg::Symbol(imported), ln));
                emit_store(ctx, &local, ln);
                continue;
            }
            "identifier" if n != node => {
                // Bare default import binding: `import fs from "fs"`.
                let name = ident_text(ctx.code, n);
                ctx.em.push(Instruction::new(Opcode::ImportFrom, Arg::Symbol("default".to_string()), ln));
                emit_store(ctx, &name, ln);
                continue;
            }
            _ => {}
        }
        let mut c = n.walk();
        for child in n.children(&mut c) {
            stack.push(child);
        }
    }
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
        "identifier" | "shorthand_property_identifier" => {
            let name = ident_text(ctx.code, node);
            let ops = resolve(ctx, &name);
            let category = category::lookup(LANG, &name.to_ascii_lowercase());
            let arg = category.map(Arg::Category).unwrap_or(Arg::Symbol(name));
            ctx.em.push(Instruction::new(ops.load, arg, ln));
        }
        "this" => ctx.em.push(Instruction::new(Opcode::LoadFast, Arg::Symbol("this".to_string()), ln)),
        "member_expression" => compile_attr_chain(ctx, node, depth, rec)?,
        "call_expression" => compile_call(ctx, node, depth, rec)?,
        "subscript_expression" => {
            let object = node.child_by_field_name("object").unwrap_or(node);
            compile_expr(ctx, object, depth, rec)?;
            if let Some(idx) = node.child_by_field_name("index") {
                compile_expr(ctx, idx, depth, rec)?;
            }
            ctx.em.push(Instruction::simple(Opcode::BinarySubscr, ln));
        }
        "string" | "template_string" => {
            let text = string_literal_text(ctx.code, node);
            let arg = value::classify_string(&text, ctx.em.short_literal_threshold);
            ctx.em.push(Instruction::new(Opcode::LoadConst, arg, ln));
        }
        "number" => {
            let text = text(ctx.code, node).replace('_', "");
            if text.contains('.') || text.contains('e') || text.contains('E') {
                let v: f64 = text.parse().unwrap_or(0.0);
                ctx.em.push(Instruction::new(Opcode::LoadConst, value::classify_float(v), ln));
            } else {
                let v = parse_js_int(&text);
                ctx.em.push(Instruction::new(Opcode::LoadConst, value::classify_integer(v), ln));
            }
        }
        "true" => ctx.em.push(Instruction::new(Opcode::LoadConst, value::classify_bool(true), ln)),
        "false" => ctx.em.push(Instruction::new(Opcode::LoadConst, value::classify_bool(false), ln)),
        "null" | "undefined" => ctx.em.push(Instruction::new(Opcode::LoadConst, Arg::None, ln)),
        "binary_expression" => {
            let left = node.child_by_field_name("left");
            let right = node.child_by_field_name("right");
            let operator = node
                .child_by_field_name("operator")
                .map(|n| text(ctx.code, n).to_string())
                .unwrap_or_else(|| operator_between(ctx.code, left.unwrap_or(node), right.unwrap_or(node)));
            if let (Some(l), Some(r)) = (left, right) {
                compile_expr(ctx, l, depth, rec + 1)?;
                compile_expr(ctx, r, depth, rec + 1)?;
                if is_comparison(&operator) {
                    ctx.em.push(Instruction::new(Opcode::CompareOp, Arg::CompareOp(compare_op(&operator)), ln));
                } else if operator == "&&" || operator == "||" {
                    ctx.em.push(Instruction::simple(Opcode::BinaryOr, ln));
                } else {
                    ctx.em.push(Instruction::simple(binary_opcode(&operator), ln));
                }
            }
        }
        "unary_expression" => {
            let operator = node
                .child_by_field_name("operator")
                .map(|n| text(ctx.code, n).to_string())
                .unwrap_or_default();
            if let Some(arg) = node.child_by_field_name("argument") {
                compile_expr(ctx, arg, depth, rec + 1)?;
            }
            ctx.em.push(Instruction::simple(
                match operator.as_str() {
                    "!" => Opcode::UnaryNot,
                    "~" => Opcode::UnaryInv,
                    _ => Opcode::UnaryNeg,
                },
                ln,
            ));
        }
        "array" => compile_container(ctx, node, depth, rec, Opcode::BuildList)?,
        "object" => compile_object(ctx, node, depth, rec)?,
        "parenthesized_expression" => {
            if let Some(inner) = node.named_child(0) {
                compile_expr(ctx, inner, depth, rec + 1)?;
            }
        }
        "arrow_function" => compile_arrow(ctx, node, depth, rec)?,
        "function_expression" | "function" => compile_function_value(ctx, node, depth, rec)?,
        "assignment_expression" => compile_assignment(ctx, node, depth, rec)?,
        "new_expression" => {
            if let Some(ctor) = node.child_by_field_name("constructor") {
                compile_expr(ctx, ctor, depth, rec + 1)?;
            }
            let mut count = 0i64;
            if let Some(args) = node.child_by_field_name("arguments") {
                let mut c = args.walk();
                for a in args.named_children(&mut c) {
                    compile_expr(ctx, a, depth, rec + 1)?;
                    count += 1;
                }
            }
            ctx.em.push(Instruction::new(Opcode::Call, Arg::Int(count), ln));
        }
        "await_expression" => {
            if let Some(v) = node.named_child(0) {
                compile_expr(ctx, v, depth, rec + 1)?;
            }
            ctx.em.push(Instruction::simple(Opcode::Await, ln));
        }
        "yield_expression" => {
            if let Some(v) = node.named_child(0) {
                compile_expr(ctx, v, depth, rec + 1)?;
            } else {
                ctx.em.push(Instruction::new(Opcode::LoadConst, Arg::None, ln));
            }
            ctx.em.push(Instruction::simple(Opcode::YieldValue, ln));
        }
        "ternary_expression" => {
            let cond = node.child_by_field_name("condition");
            let conseq = node.child_by_field_name("consequence");
            let alt = node.child_by_field_name("alternative");
            if let Some(c) = cond {
                compile_expr(ctx, c, depth, rec + 1)?;
            }
            let jmp = ctx.em.push_jump_placeholder(Opcode::PopJumpIfFalse, ln);
            if let Some(c) = conseq {
                compile_expr(ctx, c, depth, rec + 1)?;
            }
            let jmp_end = ctx.em.push_jump_placeholder(Opcode::JumpForward, ln);
            let else_at = ctx.em.next_index();
            ctx.em.patch_jump(jmp, else_at);
            if let Some(a) = alt {
                compile_expr(ctx, a, depth, rec + 1)?;
            }
            let end = ctx.em.next_index();
            ctx.em.patch_jump(jmp_end, end);
        }
        "spread_element" => {
            if let Some(inner) = node.named_child(0) {
                compile_expr(ctx, inner, depth, rec + 1)?;
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

fn compile_object(ctx: &mut Ctx, node: Node, depth: u32, rec: usize) -> Result<()> {
    let mut c = node.walk();
    let mut count = 0i64;
    for pair in node.named_children(&mut c) {
        match pair.kind() {
            "pair" => {
                if let Some(k) = pair.child_by_field_name("key") {
                    compile_expr(ctx, k, depth, rec + 1)?;
                }
                if let Some(v) = pair.child_by_field_name("value") {
                    compile_expr(ctx, v, depth, rec + 1)?;
                }
                count += 1;
            }
            "shorthand_property_identifier" => {
                let name = ident_text(ctx.code, pair);
                let arg = Arg::Str(name.to_lowercase());
                ctx.em.push(Instruction::new(Opcode::LoadConst, arg, line(pair)));
                let ops = resolve(ctx, &name);
                ctx.em.push(Instruction::new(ops.load, Arg::Symbol(name), line(pair)));
                count += 1;
            }
            "spread_element" => {
                if let Some(inner) = pair.named_child(0) {
                    compile_expr(ctx, inner, depth, rec + 1)?;
                }
            }
            _ => {}
        }
    }
    ctx.em.push(Instruction::new(Opcode::BuildMap, Arg::Int(count), line(node)));
    Ok(())
}

fn compile_arrow(ctx: &mut Ctx, node: Node, depth: u32, rec: usize) -> Result<()> {
    let ln = line(node);
    let body = node.child_by_field_name("body");
    if depth == 0 {
        let id = compile_nested_object(ctx, node, body, "<arrow>", depth, rec)?;
        ctx.em.push(Instruction::new(Opcode::MakeFunction, Arg::CodeObjectRef(id), ln));
    } else {
        let params = params_from(node, ctx.code);
        let mut scope = body
            .map(|b| prescan_scope(b, ctx.code, false))
            .unwrap_or_default();
        scope.params = params;
        ctx.scopes.push(scope);
        ctx.em.push(Instruction::simple(Opcode::Resume, ln));
        match body {
            Some(b) if b.kind() == "statement_block" => {
                compile_block(ctx, b, depth + 1, rec + 1, &mut Vec::new())?;
                ctx.em.push(Instruction::new(Opcode::ReturnConst, Arg::None, ln));
            }
            Some(expr) => {
                compile_expr(ctx, expr, depth + 1, rec + 1)?;
                ctx.em.push(Instruction::simple(Opcode::ReturnValue, ln));
            }
            None => ctx.em.push(Instruction::new(Opcode::ReturnConst, Arg::None, ln)),
        }
        ctx.scopes.pop();
    }
    Ok(())
}

/// A function expression used as a value (`const f = function() {...}`):
/// unlike a declaration, nothing is stored here — the caller (a declarator
/// or call argument) consumes the pushed value.
fn compile_function_value(ctx: &mut Ctx, node: Node, depth: u32, rec: usize) -> Result<()> {
    let ln = line(node);
    let name = node
        .child_by_field_name("name")
        .map(|n| ident_text(ctx.code, n))
        .unwrap_or_else(|| "<function>".to_string());
    let body = node.child_by_field_name("body");
    if depth == 0 {
        let id = compile_nested_object(ctx, node, body, &name, depth, rec)?;
        ctx.em.push(Instruction::new(Opcode::MakeFunction, Arg::CodeObjectRef(id), ln));
    } else {
        let params = params_from(node, ctx.code);
        let mut scope = body
            .map(|b| prescan_scope(b, ctx.code, false))
            .unwrap_or_default();
        scope.params = params;
        ctx.scopes.push(scope);
        ctx.em.push(Instruction::simple(Opcode::Resume, ln));
        if let Some(b) = body {
            compile_block(ctx, b, depth + 1, rec + 1, &mut Vec::new())?;
        }
        ctx.em.push(Instruction::new(Opcode::ReturnConst, Arg::None, ln));
        ctx.scopes.pop();
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
        "member_expression" => {
            let object = node.child_by_field_name("object");
            let property = node
                .child_by_field_name("property")
                .map(|n| ident_text(ctx.code, n))
                .unwrap_or_default();
            if let Some(obj) = object {
                compile_attr_chain_inner(ctx, obj, depth, rec + 1, full_dotted)?;
            }
            ctx.em.push(Instruction::new(Opcode::LoadAttr, Arg::Symbol(property), ln));
        }
        _ => compile_expr(ctx, node, depth, rec)?,
    }
    Ok(())
}

fn compile_call(ctx: &mut Ctx, node: Node, depth: u32, rec: usize) -> Result<()> {
    let ln = line(node);
    let function = node.child_by_field_name("function");

    // `require("x")` behaves like a CommonJS import rather than an
    // ordinary call.
    if let Some(f) = function {
        if f.kind() == "identifier" && ident_text(ctx.code, f) == "require" {
            if let Some(args) = node.child_by_field_name("arguments") {
                if let Some(first) = args.named_child(0) {
                    let module = string_literal_text(ctx.code, first);
                    ctx.em.push(Instruction::new(Opcode::ImportName, Arg::Symbol(module), ln));
                    return Ok(());
                }
            }
        }
        compile_attr_chain(ctx, f, depth, rec + 1)?;
    }

    let mut positional = 0i64;
    if let Some(args) = node.child_by_field_name("arguments") {
        let mut c = args.walk();
        for arg in args.named_children(&mut c) {
            compile_expr(ctx, arg, depth, rec + 1)?;
            positional += 1;
        }
    }
    ctx.em.push(Instruction::new(Opcode::Call, Arg::Int(positional), ln));
    Ok(())
}

fn dotted_path(node: Node, code: &str) -> Option<String> {
    match node.kind() {
        "identifier" => Some(ident_text(code, node).to_ascii_lowercase()),
        "member_expression" => {
            let object = node.child_by_field_name("object")?;
            let property = node.child_by_field_name("property")?;
            let base = dotted_path(object, code)?;
            Some(format!("{base}.{}", ident_text(code, property).to_ascii_lowercase()))
        }
        _ => None,
    }
}

fn is_comparison(op: &str) -> bool {
    matches!(op, "==" | "===" | "!=" | "!==" | "<" | "<=" | ">" | ">=")
}

fn compare_op(op: &str) -> CompareOp {
    match op {
        "==" | "===" => CompareOp::Eq,
        "!=" | "!==" => CompareOp::NotEq,
        "<" => CompareOp::Lt,
        "<=" => CompareOp::LtEq,
        ">" => CompareOp::Gt,
        ">=" => CompareOp::GtEq,
        _ => CompareOp::Eq,
    }
}

fn binary_opcode(op: &str) -> Opcode {
    match op {
        "+" => Opcode::BinaryAdd,
        "-" => Opcode::BinarySub,
        "*" => Opcode::BinaryMul,
        "/" => Opcode::BinaryDiv,
        "%" => Opcode::BinaryMod,
        "**" => Opcode::BinaryPow,
        "&" => Opcode::BinaryAnd,
        "|" => Opcode::BinaryOr,
        "^" => Opcode::BinaryXor,
        "<<" => Opcode::BinaryLshift,
        ">>" | ">>>" => Opcode::BinaryRshift,
        _ => Opcode::BinaryAdd,
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

fn string_literal_text(code: &str, node: Node) -> String {
    let raw = text(code, node);
    if raw.len() >= 2 {
        let bytes = raw.as_bytes();
        let first = bytes[0];
        if (first == b'"' || first == b'\'' || first == b'`') && bytes[raw.len() - 1] == first {
            return raw[1..raw.len() - 1].to_string();
        }
    }
    raw.to_string()
}

fn parse_js_int(text: &str) -> i64 {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).unwrap_or(0);
    }
    if let Some(oct) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
        return i64::from_str_radix(oct, 8).unwrap_or(0);
    }
    if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        return i64::from_str_radix(bin, 2).unwrap_or(0);
    }
    text.parse::<f64>().unwrap_or(0.0) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Arena;

    fn compile(code: &str) -> Vec<crate::types::CodeObject> {
        let mut arena = Arena::new();
        compile_module(&mut arena, "t.js", code, 15, 256).unwrap();
        arena.into_vec()
    }

    #[test]
    fn simple_assignment_emits_targeted_file_first() {
        let objs = compile("let x = 5;\n");
        assert_eq!(objs[0].instructions[0].opcode, Opcode::TargetedFile);
    }

    #[test]
    fn top_level_function_becomes_separate_object() {
        let objs = compile("function f() {\n  return 1;\n}\n");
        assert_eq!(objs.len(), 2);
    }

    #[test]
    fn require_call_emits_import_name() {
        let objs = compile("const fs = require('fs');\n");
        let ops: Vec<Opcode> = objs[0].instructions.iter().map(|i| i.opcode).collect();
        assert!(ops.contains(&Opcode::ImportName));
    }

    #[test]
    fn child_process_exec_is_categorized() {
        let objs = compile("const cp = require('child_process');\ncp.exec('ls');\n");
        let has_category = objs[0].instructions.iter().any(|i| {
            matches!(&i.arg, Arg::Category(c) if *c == crate::types::Category::ProcessManagement)
        });
        assert!(has_category);
    }

    #[test]
    fn arrow_function_at_depth_zero_is_its_own_object() {
        let objs = compile("const f = () => 1;\n");
        assert_eq!(objs.len(), 2);
    }

    #[test]
    fn jump_targets_are_always_valid() {
        let objs = compile("function f(x) {\n  if (x) {\n    return 1;\n  } else {\n    return 2;\n  }\n}\n");
        for obj in &objs {
            for instr in &obj.instructions {
                if let Some(t) = instr.jump_target {
                    assert!(t <= obj.instructions.len());
                }
            }
        }
    }
}
