//! Error accumulation and phase-boundary reporting.
//!
//! Each compilation owns one [`Reporter`]. Components record errors as they
//! scan (so a user sees every problem in a phase, not just the first) and the
//! pipeline driver calls [`Reporter::checkpoint`] between phases; a non-empty
//! error list aborts the compile there. The reporter also keeps the journal
//! that ends up in the per-compilation `log_<id>.txt`.

use std::fmt;
use tracing::{debug, error};

/// Stable taxonomy of compile errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unterminated string, unbalanced brace/paren, malformed argument.
    Syntax,
    UnknownCommand,
    ArgCountMismatch,
    ArgKindMismatch,
    InvalidFieldChoice,
    /// Only raised at project end, after all scripts were emitted.
    UndefinedProcedure,
    /// Bad warp flag, malformed `name[Type]` pair, `%s`/`%d` in a name.
    InvalidProcedureHeader,
    UnsupportedAsset,
    /// Depth exceeded or undeclared placeholder during macro expansion.
    MacroExpansion,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Syntax => "syntax error",
            ErrorKind::UnknownCommand => "unknown command",
            ErrorKind::ArgCountMismatch => "argument count mismatch",
            ErrorKind::ArgKindMismatch => "argument kind mismatch",
            ErrorKind::InvalidFieldChoice => "invalid field choice",
            ErrorKind::UndefinedProcedure => "undefined procedure",
            ErrorKind::InvalidProcedureHeader => "invalid procedure header",
            ErrorKind::UnsupportedAsset => "unsupported asset",
            ErrorKind::MacroExpansion => "macro expansion error",
        };
        f.write_str(name)
    }
}

/// Compilation phases, in pipeline order. Used to label checkpoint failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lex,
    Parse,
    Emit,
    Package,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Lex => "lex",
            Phase::Parse => "parse",
            Phase::Emit => "emit",
            Phase::Package => "package",
        };
        f.write_str(name)
    }
}

/// One recorded error: what went wrong, the offending source fragment and the
/// 1-based line it came from (`None` when no line applies, e.g. project-end
/// checks).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub fragment: String,
    pub line: Option<usize>,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(
                f,
                "{}: {} in code '{}' on line [{}]",
                self.kind, self.message, self.fragment, line
            ),
            None => write!(f, "{}: {} in code '{}'", self.kind, self.message, self.fragment),
        }
    }
}

/// A phase checkpoint that found accumulated errors. Carries every error the
/// phase recorded so callers can surface all of them at once.
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{}] error(s) in {phase} phase; see log for details", errors.len())]
pub struct PhaseFailure {
    pub phase: Phase,
    pub errors: Vec<CompileError>,
}

/// Per-compilation error and journal sink.
#[derive(Debug, Default)]
pub struct Reporter {
    errors: Vec<CompileError>,
    journal: Vec<String>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error without aborting; the current phase keeps scanning.
    pub fn report(
        &mut self,
        kind: ErrorKind,
        message: impl Into<String>,
        fragment: impl Into<String>,
        line: Option<usize>,
    ) {
        let err = CompileError {
            kind,
            message: message.into(),
            fragment: fragment.into(),
            line,
        };
        error!(target: "report", %err, "compile_error");
        self.journal.push(err.to_string());
        self.errors.push(err);
    }

    /// Append a journal line destined for the compilation log file.
    pub fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!(target: "report", msg = message.as_str(), "journal");
        self.journal.push(message);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Phase boundary: drain accumulated errors. `Err` means the pipeline
    /// must not enter the next phase.
    pub fn checkpoint(&mut self, phase: Phase) -> Result<(), PhaseFailure> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let errors = std::mem::take(&mut self.errors);
        self.journal
            .push(format!("[{}] error(s) found in {phase} phase", errors.len()));
        Err(PhaseFailure { phase, errors })
    }

    /// The full journal accumulated so far (log lines plus error renderings).
    pub fn journal(&self) -> &[String] {
        &self.journal
    }
}
