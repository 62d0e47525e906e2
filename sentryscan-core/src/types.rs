//! Language-neutral instruction set and code-object tree.
//!
//! `CodeObject`s live in a per-scan [`Arena`] and reference children by
//! stable index rather than by pointer: a child is always created before the
//! `MAKE_FUNCTION`/`MAKE_CLASS` that references it, so the tree is acyclic by
//! construction: there are no cyclic child references.

use serde::{Deserialize, Serialize};

/// Source language family. A closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    /// Dynamic scripting family (e.g. Python).
    ScriptDynamic,
    /// Curly-brace scripting family (e.g. JavaScript/TypeScript).
    ScriptCurly,
}

impl Language {
    /// Maps a file extension to a language, or `None` if unsupported.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "py" => Some(Language::ScriptDynamic),
            "js" => Some(Language::ScriptCurly),
            _ => None,
        }
    }
}

/// Comparison operator carried by `COMPARE_OP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    NotIn,
    Is,
    IsNot,
}

/// Closed opcode set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Opcode {
    // Control
    Resume,
    ReturnValue,
    ReturnConst,
    PopTop,
    Nop,
    // Constants/loads
    LoadConst,
    LoadName,
    LoadGlobal,
    LoadFast,
    LoadParam,
    LoadAttr,
    LoadMethod,
    LoadClosure,
    // Stores/deletes
    StoreName,
    StoreGlobal,
    StoreFast,
    StoreAttr,
    StoreSubscr,
    DeleteName,
    DeleteSubscr,
    // Calls
    Call,
    KwNames,
    MakeFunction,
    MakeClass,
    // Binary/unary
    BinaryAdd,
    BinarySub,
    BinaryMul,
    BinaryDiv,
    BinaryMod,
    BinaryPow,
    BinaryAnd,
    BinaryOr,
    BinaryXor,
    BinaryLshift,
    BinaryRshift,
    BinarySubscr,
    CompareOp,
    UnaryNeg,
    UnaryNot,
    UnaryInv,
    // Containers
    BuildList,
    BuildTuple,
    BuildSet,
    BuildMap,
    BuildString,
    BuildSlice,
    // Iteration
    GetIter,
    ForIter,
    ListAppend,
    SetAdd,
    MapAdd,
    // Branching
    PopJumpIfTrue,
    PopJumpIfFalse,
    JumpForward,
    JumpBackward,
    // Exceptions/context
    SetupFinally,
    PopExcept,
    Raise,
    BeforeWith,
    WithExit,
    // Imports
    ImportName,
    ImportFrom,
    ImportStar,
    // Async/generator
    YieldValue,
    Await,
    AsyncFor,
    // Special
    TargetedFile,
}

impl Opcode {
    /// Lowercase token name used by the projector.
    pub fn token(self) -> &'static str {
        match self {
            Opcode::Resume => "resume",
            Opcode::ReturnValue => "return_value",
            Opcode::ReturnConst => "return_const",
            Opcode::PopTop => "pop_top",
            Opcode::Nop => "nop",
            Opcode::LoadConst => "load_const",
            Opcode::LoadName => "load_name",
            Opcode::LoadGlobal => "load_global",
            Opcode::LoadFast => "load_fast",
            Opcode::LoadParam => "load_param",
            Opcode::LoadAttr => "load_attr",
            Opcode::LoadMethod => "load_method",
            Opcode::LoadClosure => "load_closure",
            Opcode::StoreName => "store_name",
            Opcode::StoreGlobal => "store_global",
            Opcode::StoreFast => "store_fast",
            Opcode::StoreAttr => "store_attr",
            Opcode::StoreSubscr => "store_subscr",
            Opcode::DeleteName => "delete_name",
            Opcode::DeleteSubscr => "delete_subscr",
            Opcode::Call => "call",
            Opcode::KwNames => "kw_names",
            Opcode::MakeFunction => "make_function",
            Opcode::MakeClass => "make_class",
            Opcode::BinaryAdd => "binary_add",
            Opcode::BinarySub => "binary_sub",
            Opcode::BinaryMul => "binary_mul",
            Opcode::BinaryDiv => "binary_div",
            Opcode::BinaryMod => "binary_mod",
            Opcode::BinaryPow => "binary_pow",
            Opcode::BinaryAnd => "binary_and",
            Opcode::BinaryOr => "binary_or",
            Opcode::BinaryXor => "binary_xor",
            Opcode::BinaryLshift => "binary_lshift",
            Opcode::BinaryRshift => "binary_rshift",
            Opcode::BinarySubscr => "binary_subscr",
            Opcode::CompareOp => "compare_op",
            Opcode::UnaryNeg => "unary_neg",
            Opcode::UnaryNot => "unary_not",
            Opcode::UnaryInv => "unary_inv",
            Opcode::BuildList => "build_list",
            Opcode::BuildTuple => "build_tuple",
            Opcode::BuildSet => "build_set",
            Opcode::BuildMap => "build_map",
            Opcode::BuildString => "build_string",
            Opcode::BuildSlice => "build_slice",
            Opcode::GetIter => "get_iter",
            Opcode::ForIter => "for_iter",
            Opcode::ListAppend => "list_append",
            Opcode::SetAdd => "set_add",
            Opcode::MapAdd => "map_add",
            Opcode::PopJumpIfTrue => "pop_jump_if_true",
            Opcode::PopJumpIfFalse => "pop_jump_if_false",
            Opcode::JumpForward => "jump_forward",
            Opcode::JumpBackward => "jump_backward",
            Opcode::SetupFinally => "setup_finally",
            Opcode::PopExcept => "pop_except",
            Opcode::Raise => "raise",
            Opcode::BeforeWith => "before_with",
            Opcode::WithExit => "with_exit",
            Opcode::ImportName => "import_name",
            Opcode::ImportFrom => "import_from",
            Opcode::ImportStar => "import_star",
            Opcode::YieldValue => "yield_value",
            Opcode::Await => "await",
            Opcode::AsyncFor => "async_for",
            Opcode::TargetedFile => "targeted_file",
        }
    }
}

/// Stable index of a `CodeObject` within a scan's [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CodeObjectId(pub usize);

/// Security-relevant category token substituted for a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    StringXs,
    StringS,
    StringM,
    StringL,
    StringXl,
    StringVersion,
    StringUrlInsecure,
    StringUrl,
    StringInsecureProtocol,
    StringEmail,
    StringIp,
    StringPath,
    StringBase64,
    StringHex,
    StringBash,
    StringSql,
    StringCode,
    Integer,
    IntegerLarge,
    Float,
    Boolean,
    // Function-name categories, also the curated "activity" subfamily
    // except where noted.
    FilesystemAccess,
    NetworkHttpRequest,
    ProcessManagement,
    Deserialization,
    EncodingDecoding,
    PackageInstallationExecution,
    FsLinking,
    SystemInteraction,
    UserIo,
    ArchiveCompression,
    DynamicCodeExecution,
}

impl Category {
    pub fn token(self) -> &'static str {
        match self {
            Category::StringXs => "string_xs",
            Category::StringS => "string_s",
            Category::StringM => "string_m",
            Category::StringL => "string_l",
            Category::StringXl => "string_xl",
            Category::StringVersion => "string_version",
            Category::StringUrlInsecure => "string_url_insecure",
            Category::StringUrl => "string_url",
            Category::StringInsecureProtocol => "string_insecure_protocol",
            Category::StringEmail => "string_email",
            Category::StringIp => "string_ip",
            Category::StringPath => "string_path",
            Category::StringBase64 => "string_base64",
            Category::StringHex => "string_hex",
            Category::StringBash => "string_bash",
            Category::StringSql => "string_sql",
            Category::StringCode => "string_code",
            Category::Integer => "integer",
            Category::IntegerLarge => "integer_large",
            Category::Float => "float",
            Category::Boolean => "boolean",
            Category::FilesystemAccess => "filesystem_access",
            Category::NetworkHttpRequest => "network_http_request",
            Category::ProcessManagement => "process_management",
            Category::Deserialization => "deserialization",
            Category::EncodingDecoding => "encoding_decoding",
            Category::PackageInstallationExecution => "package_installation_execution",
            Category::FsLinking => "fs_linking",
            Category::SystemInteraction => "system_interaction",
            Category::UserIo => "user_io",
            Category::ArchiveCompression => "archive_compression",
            Category::DynamicCodeExecution => "dynamic_code_execution",
        }
    }

    /// Whether this category belongs to the curated "activity" subfamily
    /// surfaced in `Report.activities`.
    pub fn is_activity(self) -> bool {
        matches!(
            self,
            Category::FilesystemAccess
                | Category::NetworkHttpRequest
                | Category::ProcessManagement
                | Category::Deserialization
                | Category::PackageInstallationExecution
                | Category::FsLinking
                | Category::SystemInteraction
                | Category::ArchiveCompression
                | Category::DynamicCodeExecution
        )
    }
}

/// Tagged-union argument of an [`Instruction`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    None,
    Int(i64),
    Float(f64),
    Bool(bool),
    /// A short literal, emitted verbatim and lower-cased.
    Str(String),
    /// An identifier (name, attribute, module, keyword-argument name, ...).
    Symbol(String),
    Category(Category),
    CodeObjectRef(CodeObjectId),
    /// Ordered keyword-argument names for the following `CALL`.
    KwNameList(Vec<String>),
    CompareOp(CompareOp),
}

/// A single instruction: opcode, optional argument, source line, optional
/// jump target. Ordering within a `CodeObject` is significant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub arg: Arg,
    pub line: u32,
    /// Instruction index within the same code object, for branch/loop ops.
    pub jump_target: Option<usize>,
}

impl Instruction {
    pub fn new(opcode: Opcode, arg: Arg, line: u32) -> Self {
        Self {
            opcode,
            arg,
            line,
            jump_target: None,
        }
    }

    pub fn simple(opcode: Opcode, line: u32) -> Self {
        Self::new(opcode, Arg::None, line)
    }

    pub fn with_jump(opcode: Opcode, line: u32, target: usize) -> Self {
        Self {
            opcode,
            arg: Arg::None,
            line,
            jump_target: Some(target),
        }
    }
}

/// An immutable, named, linear instruction stream from one syntactic scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeObject {
    pub id: CodeObjectId,
    pub name: String,
    pub instructions: Vec<Instruction>,
    pub children: Vec<CodeObjectId>,
    /// (start_line, end_line), 1-indexed inclusive.
    pub location: Option<(u32, u32)>,
    /// 0 = top-level of the file.
    pub depth: u32,
    pub file: String,
    pub language: Language,
    pub warnings: Vec<crate::errors::Warning>,
}

/// Owns every `CodeObject` produced while compiling one file. Indices are
/// stable for the lifetime of the arena.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Arena {
    objects: Vec<CodeObject>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a slot for a code object that will be filled in shortly
    /// after (needed so a function can reference its own id before its
    /// body is fully emitted, while still never creating a forward
    /// reference to an *unfinished sibling*).
    pub fn push(&mut self, object: CodeObject) -> CodeObjectId {
        let id = CodeObjectId(self.objects.len());
        self.objects.push(object);
        id
    }

    pub fn get(&self, id: CodeObjectId) -> &CodeObject {
        &self.objects[id.0]
    }

    pub fn get_mut(&mut self, id: CodeObjectId) -> &mut CodeObject {
        &mut self.objects[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &CodeObject> {
        self.objects.iter()
    }

    pub fn into_vec(self) -> Vec<CodeObject> {
        self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
