//! AST produced by the parser and consumed by the emitter.

/// One parsed statement or nested reporter, with its 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AstBlock {
    pub line: usize,
    pub kind: AstKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstKind {
    Command(CommandNode),
    ProcDef(ProcDefNode),
    ProcCall(ProcCallNode),
}

/// Catalog-backed command invocation. `args` holds the non-substack slots in
/// schema order; substacks arrive through braces and land in `substacks`
/// (one for c-shapes, two after an else retarget).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandNode {
    /// Resolved dotted path (aliases applied, `ifelse` retarget applied).
    pub path: String,
    pub args: Vec<(String, AstArg)>,
    pub substacks: Vec<Vec<AstBlock>>,
    pub comment: Option<String>,
}

/// `func:Name(warp=..., a[Type], ...) { body }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcDefNode {
    pub name: String,
    pub warp: bool,
    pub params: Vec<ProcParam>,
    pub body: Vec<AstBlock>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcParam {
    pub name: String,
    pub ty: ProcParamType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcParamType {
    /// String/number argument (`%s` in the proccode).
    Exp,
    /// Boolean argument (`%b` in the proccode).
    Bool,
}

/// `fn.Name(arg:value, ...)` — may reference a procedure defined later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcCallNode {
    pub name: String,
    pub args: Vec<(String, AstArg)>,
    pub comment: Option<String>,
}

/// A resolved argument value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstArg {
    Number(String),
    Str(String),
    Variable(String),
    List(String),
    Dict(String),
    /// `a.name` procedure-argument reference.
    FuncArg(String),
    /// Nested reporter call.
    Reporter(Box<AstBlock>),
}

impl AstArg {
    /// Dotted path of a nested reporter, if this is one.
    pub fn reporter_path(&self) -> Option<&str> {
        match self {
            AstArg::Reporter(block) => match &block.kind {
                AstKind::Command(node) => Some(&node.path),
                _ => None,
            },
            _ => None,
        }
    }
}
