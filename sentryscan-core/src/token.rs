//! Token Projector: turns one [`Instruction`] into one or more lowercase
//! strings for the downstream sequence classifier.

use crate::category;
use crate::types::{Arg, CodeObject, CodeObjectId, CompareOp, Instruction, Language};
use std::collections::HashMap;

/// Projects a single instruction to its token(s), in emission order: the
/// opcode name always comes first, followed by any argument token(s).
/// `names` resolves a `MAKE_FUNCTION`/`MAKE_CLASS` target to the referenced
/// child's name, per spec: "project the referenced child's name only (not
/// the child's stream)".
pub fn project_instruction(
    instr: &Instruction,
    language: Language,
    threshold: usize,
    names: &HashMap<CodeObjectId, String>,
) -> Vec<String> {
    let mut out = Vec::with_capacity(2);
    out.push(instr.opcode.token().to_string());
    if let Some(arg_token) = project_arg(&instr.arg, language, threshold, names) {
        out.extend(arg_token);
    }
    out
}

fn project_arg(
    arg: &Arg,
    language: Language,
    threshold: usize,
    names: &HashMap<CodeObjectId, String>,
) -> Option<Vec<String>> {
    match arg {
        Arg::None => None,
        Arg::Int(v) => Some(vec![v.to_string()]),
        Arg::Float(v) => Some(vec![format_float(*v)]),
        // Booleans are always the BOOLEAN category, never the literal
        // `true`/`false` spelling.
        Arg::Bool(_) => Some(vec!["boolean".to_string()]),
        Arg::Str(s) => Some(vec![s.to_lowercase()]),
        Arg::Symbol(s) => Some(vec![project_symbol(s, language, threshold)]),
        Arg::Category(c) => Some(vec![c.token().to_string()]),
        Arg::CodeObjectRef(id) => names.get(id).map(|name| vec![project_symbol(name, language, threshold)]),
        Arg::KwNameList(names) => Some(names.iter().map(|n| n.to_lowercase()).collect()),
        Arg::CompareOp(op) => Some(vec![compare_op_token(*op).to_string()]),
    }
}

/// A bare (non-dotted-call) identifier: looked up against the category
/// table on its own, then size-bucketed like any other long literal.
fn project_symbol(name: &str, language: Language, threshold: usize) -> String {
    let lower = name.to_ascii_lowercase();
    if let Some(category) = category::lookup(language, &lower) {
        return category.token().to_string();
    }
    if lower.chars().count() < threshold {
        lower
    } else {
        crate::value::size_bucket_token(&lower).to_string()
    }
}

fn compare_op_token(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "eq",
        CompareOp::NotEq => "not_eq",
        CompareOp::Lt => "lt",
        CompareOp::LtEq => "lt_eq",
        CompareOp::Gt => "gt",
        CompareOp::GtEq => "gt_eq",
        CompareOp::In => "in",
        CompareOp::NotIn => "not_in",
        CompareOp::Is => "is",
        CompareOp::IsNot => "is_not",
    }
}

fn format_float(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

/// Flattens one `CodeObject`'s instructions into the token sequence handed
/// to the classifier: one token sequence per Code Object. `names` resolves
/// `CodeObjectRef` arguments to the referenced child's name.
pub fn project_code_object(obj: &CodeObject, threshold: usize, names: &HashMap<CodeObjectId, String>) -> Vec<String> {
    obj.instructions
        .iter()
        .flat_map(|i| project_instruction(i, obj.language, threshold, names))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, Opcode};

    fn no_names() -> HashMap<CodeObjectId, String> {
        HashMap::new()
    }

    #[test]
    fn boolean_const_projects_to_boolean_category() {
        let instr = Instruction::new(Opcode::LoadConst, Arg::Bool(true), 1);
        assert_eq!(
            project_instruction(&instr, Language::ScriptDynamic, 15, &no_names()),
            vec!["load_const".to_string(), "boolean".to_string()]
        );
    }

    #[test]
    fn small_integer_projects_verbatim() {
        let instr = Instruction::new(Opcode::LoadConst, Arg::Int(5), 1);
        assert_eq!(
            project_instruction(&instr, Language::ScriptDynamic, 15, &no_names()),
            vec!["load_const".to_string(), "5".to_string()]
        );
    }

    #[test]
    fn known_sink_symbol_projects_to_category() {
        let instr = Instruction::new(Opcode::LoadGlobal, Arg::Symbol("eval".to_string()), 1);
        assert_eq!(
            project_instruction(&instr, Language::ScriptDynamic, 15, &no_names()),
            vec!["load_global".to_string(), Category::DynamicCodeExecution.token().to_string()]
        );
    }

    #[test]
    fn make_function_projects_the_referenced_childs_name() {
        let id = CodeObjectId(3);
        let mut names = HashMap::new();
        names.insert(id, "helper".to_string());
        let instr = Instruction::new(Opcode::MakeFunction, Arg::CodeObjectRef(id), 1);
        assert_eq!(
            project_instruction(&instr, Language::ScriptDynamic, 15, &names),
            vec!["make_function".to_string(), "helper".to_string()]
        );
    }

    #[test]
    fn kw_names_expand_to_one_token_each() {
        let instr = Instruction::new(
            Opcode::KwNames,
            Arg::KwNameList(vec!["Shell".to_string(), "Check".to_string()]),
            1,
        );
        assert_eq!(
            project_instruction(&instr, Language::ScriptDynamic, 15, &no_names()),
            vec!["kw_names".to_string(), "shell".to_string(), "check".to_string()]
        );
    }
}
