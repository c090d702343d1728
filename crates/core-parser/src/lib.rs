//! Token-stream parser: reduces the lexer's flat stream against the command
//! catalog into a list of top-level stacks.
//!
//! The reduction is a recursive descent over a handful of states: top level,
//! inside a call's argument run, inside a brace-delimited statement list,
//! and the two procedure forms (`func:` headers, `fn.` calls). Macros are
//! rewritten here: the caller's argument tokens are serialized back to
//! canonical text, spliced into the descriptor's template, re-lexed, and
//! parsed through this same code path.

use core_catalog::{Catalog, CommandSpec, FieldKind, InputType, ReturnType, Shape, SlotKind};
use core_lexer::{ArgValue, Token, serialize_tokens, tokenize, tokenize_expression};
use core_report::{ErrorKind, Reporter};
use tracing::trace;

mod ast;

pub use ast::{
    AstArg, AstBlock, AstKind, CommandNode, ProcCallNode, ProcDefNode, ProcParam, ProcParamType,
};

/// Macro rewrites deeper than this abort with a `MacroExpansion` error.
const MACRO_DEPTH_LIMIT: usize = 32;

/// Parse a token stream into top-level stacks. Errors accumulate on the
/// reporter; the pipeline checkpoints them before emitting.
pub fn parse(tokens: Vec<Token>, catalog: &Catalog, reporter: &mut Reporter) -> Vec<Vec<AstBlock>> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        line: 1,
        macro_depth: 0,
        catalog,
        reporter,
    };
    parser.parse_top()
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    line: usize,
    macro_depth: usize,
    catalog: &'a Catalog,
    reporter: &'a mut Reporter,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            if matches!(token, Some(Token::Newline)) {
                self.line += 1;
            }
            self.pos += 1;
        }
        token
    }

    fn error(&mut self, kind: ErrorKind, message: impl Into<String>, fragment: impl Into<String>) {
        self.reporter.report(kind, message, fragment, Some(self.line));
    }

    /// Consume tokens through the end of the current statement.
    fn skip_statement(&mut self) {
        while let Some(token) = self.bump() {
            if token == Token::Newline {
                break;
            }
        }
    }

    /// Consume a balanced `( ... )` group without interpreting it.
    fn skip_group(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.bump() {
            match token {
                Token::LParen => depth += 1,
                Token::RParen => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                Token::Newline => return,
                _ => {}
            }
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Some(Token::Newline)) {
            self.bump();
        }
    }

    // ---------------------------------------------------------------------
    // Top level
    // ---------------------------------------------------------------------

    fn parse_top(&mut self) -> Vec<Vec<AstBlock>> {
        let mut stacks: Vec<Vec<AstBlock>> = Vec::new();
        while let Some(token) = self.peek() {
            match token {
                Token::Newline => {
                    self.bump();
                }
                Token::LCurly => {
                    self.error(
                        ErrorKind::Syntax,
                        "substack braces must follow a hat or c-shape command",
                        "{",
                    );
                    self.bump();
                    // Drain the orphaned body so its statements do not float.
                    self.parse_body();
                }
                Token::RCurly => {
                    self.error(ErrorKind::Syntax, "unexpected '}'", "}");
                    self.bump();
                }
                Token::FunctionDef(_) => {
                    // A definition owns its braced body; it never chains with
                    // the statements that follow its close.
                    let (block, _) = self.parse_statement();
                    if let Some(block) = block {
                        stacks.push(vec![block]);
                    }
                }
                Token::Function(_) | Token::FunctionCall(_) => {
                    let (block, opened_body) = self.parse_statement();
                    let Some(block) = block else { continue };
                    let mut stack = vec![block];
                    if opened_body {
                        stack.extend(self.parse_body());
                    } else {
                        self.chain_following(&mut stack);
                    }
                    stacks.push(stack);
                }
                other => {
                    let fragment = format!("{other:?}");
                    self.error(ErrorKind::Syntax, "unexpected token", fragment);
                    self.bump();
                }
            }
        }
        stacks
    }

    /// Chain subsequent plain statements onto a hatless stack until a hat,
    /// a definition, a brace or end of input.
    fn chain_following(&mut self, stack: &mut Vec<AstBlock>) {
        loop {
            self.skip_newlines();
            let next_is_chainable = match self.peek() {
                Some(Token::FunctionCall(_)) => true,
                Some(Token::Function(name)) => self
                    .catalog
                    .lookup(name)
                    .is_none_or(|spec| spec.shape != Shape::Hat),
                _ => false,
            };
            if !next_is_chainable {
                return;
            }
            let (block, opened_body) = self.parse_statement();
            if let Some(block) = block {
                stack.push(block);
            }
            if opened_body {
                // A hat slipped through lookup failure; treat its body as part
                // of this stack rather than dropping statements.
                stack.extend(self.parse_body());
                return;
            }
        }
    }

    /// Statement list inside braces. Consumes the closing `}`.
    fn parse_body(&mut self) -> Vec<AstBlock> {
        let mut blocks = Vec::new();
        loop {
            match self.peek() {
                None => {
                    self.error(ErrorKind::Syntax, "unexpected end of code block; expected '}'", "");
                    return blocks;
                }
                Some(Token::RCurly) => {
                    self.bump();
                    return blocks;
                }
                Some(Token::Newline) => {
                    self.bump();
                }
                Some(Token::Comment(_)) => {
                    self.bump();
                }
                Some(Token::Function(_) | Token::FunctionCall(_) | Token::FunctionDef(_)) => {
                    let (block, opened_body) = self.parse_statement();
                    if let Some(block) = block {
                        blocks.push(block);
                    }
                    if opened_body {
                        blocks.extend(self.parse_body());
                    }
                }
                Some(Token::LCurly) => {
                    self.error(
                        ErrorKind::Syntax,
                        "substack braces must follow a hat or c-shape command",
                        "{",
                    );
                    self.bump();
                    blocks.extend(self.parse_body());
                }
                Some(other) => {
                    let fragment = format!("{other:?}");
                    self.error(ErrorKind::Syntax, "unexpected token", fragment);
                    self.bump();
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    /// Parse one statement. The boolean is true when the statement was a hat
    /// that opened a brace body the caller must now collect.
    fn parse_statement(&mut self) -> (Option<AstBlock>, bool) {
        let line = self.line;
        match self.bump() {
            Some(Token::Function(name)) => self.parse_command_statement(&name, line),
            Some(Token::FunctionCall(name)) => (self.parse_proc_call(&name, line), false),
            Some(Token::FunctionDef(name)) => (self.parse_proc_def(&name, line), false),
            _ => (None, false),
        }
    }

    fn parse_command_statement(&mut self, name: &str, line: usize) -> (Option<AstBlock>, bool) {
        let Some(spec) = self.catalog.lookup(name) else {
            self.error(
                ErrorKind::UnknownCommand,
                format!("invalid command '{name}'"),
                name,
            );
            self.skip_statement();
            return (None, false);
        };
        let spec = spec.clone();
        trace!(target: "parser", line, path = spec.path.as_str(), "statement");

        if spec.is_macro() {
            let block = self.expand_macro_call(&spec, line, false);
            self.finish_statement_trailer(&block);
            return (block, false);
        }

        let Some(mut node) = self.build_command(&spec, line) else {
            self.skip_statement();
            return (None, false);
        };

        // Trailer: optional return annotation, then braces for shapes that
        // take them, then the line comment.
        if matches!(self.peek(), Some(Token::FuncType(_))) {
            self.bump();
        }

        let mut opened_body = false;
        match spec.shape {
            Shape::Hat => {
                if matches!(self.peek(), Some(Token::LCurly)) {
                    self.bump();
                    opened_body = true;
                }
            }
            Shape::C => {
                if matches!(self.peek(), Some(Token::LCurly)) {
                    self.bump();
                    node.comment = self.take_comment();
                    node.substacks.push(self.parse_body());
                    // A second brace immediately after the close is the else
                    // branch; the command retargets to its else variant.
                    self.skip_newlines();
                    if matches!(self.peek(), Some(Token::LCurly)) {
                        self.bump();
                        node.substacks.push(self.parse_body());
                        let else_path = format!("{}else", node.path);
                        if self.catalog.lookup(&else_path).is_some() {
                            node.path = else_path;
                        } else {
                            self.error(
                                ErrorKind::Syntax,
                                format!("'{}' has no else form", node.path),
                                &node.path,
                            );
                        }
                    }
                } else {
                    self.error(
                        ErrorKind::Syntax,
                        format!("'{}' expects a '{{' substack", node.path),
                        &node.path,
                    );
                }
            }
            _ => {
                if matches!(self.peek(), Some(Token::LCurly)) {
                    self.error(
                        ErrorKind::Syntax,
                        format!("'{}' received a substack but does not expect one", node.path),
                        &node.path,
                    );
                    self.bump();
                    self.parse_body();
                }
            }
        }

        if node.comment.is_none() {
            node.comment = self.take_comment();
        }
        (
            Some(AstBlock {
                line,
                kind: AstKind::Command(node),
            }),
            opened_body,
        )
    }

    fn take_comment(&mut self) -> Option<String> {
        if let Some(Token::Comment(text)) = self.peek() {
            let text = text.clone();
            self.bump();
            Some(text)
        } else {
            None
        }
    }

    // ---------------------------------------------------------------------
    // Calls and arguments
    // ---------------------------------------------------------------------

    /// Parse `( args )` for a non-macro command and validate against its
    /// schema. The cursor sits on the `(`.
    fn build_command(&mut self, spec: &CommandSpec, line: usize) -> Option<CommandNode> {
        if !matches!(self.peek(), Some(Token::LParen)) {
            self.error(ErrorKind::Syntax, "expected '('", &spec.path);
            return None;
        }
        self.bump();

        let mut units: Vec<Unit> = Vec::new();
        let mut unit_failed = false;
        loop {
            match self.peek() {
                None | Some(Token::Newline) => {
                    self.error(ErrorKind::Syntax, "unbalanced '('", &spec.path);
                    return None;
                }
                Some(Token::RParen) => {
                    self.bump();
                    break;
                }
                _ => match self.parse_unit() {
                    Some(unit) => units.push(unit),
                    None => unit_failed = true,
                },
            }
        }
        if unit_failed {
            // The failing unit already reported; an arity complaint on top
            // would be noise.
            return None;
        }

        let schema: Vec<_> = spec.call_args().cloned().collect();
        if units.len() != schema.len() {
            self.error(
                ErrorKind::ArgCountMismatch,
                format!(
                    "'{}' expects [{}] arguments, but got [{}]",
                    spec.path,
                    schema.len(),
                    units.len()
                ),
                &spec.path,
            );
            return None;
        }

        let mut args = Vec::with_capacity(units.len());
        for (slot, unit) in schema.iter().zip(units) {
            let value = self.check_slot(spec, slot, unit)?;
            args.push((slot.name.clone(), value));
        }

        Some(CommandNode {
            path: spec.path.clone(),
            args,
            substacks: Vec::new(),
            comment: None,
        })
    }

    /// One argument unit: a literal token or a nested call.
    fn parse_unit(&mut self) -> Option<Unit> {
        match self.bump() {
            Some(Token::Argument(value)) => Some(Unit::Literal(value)),
            Some(Token::Reporter(name)) => {
                let line = self.line;
                let Some(spec) = self.catalog.lookup(&name) else {
                    self.error(
                        ErrorKind::UnknownCommand,
                        format!("invalid command '{name}'"),
                        &name,
                    );
                    self.skip_group();
                    return None;
                };
                let spec = spec.clone();
                if spec.is_macro() {
                    let block = self.expand_macro_call(&spec, line, true)?;
                    return Some(Unit::Call(Box::new(block)));
                }
                if spec.shape != Shape::Reporter {
                    self.error(
                        ErrorKind::ArgKindMismatch,
                        format!("'{}' is not a reporter", spec.path),
                        &spec.path,
                    );
                    self.skip_group();
                    return None;
                }
                let node = self.build_command(&spec, line)?;
                Some(Unit::Call(Box::new(AstBlock {
                    line,
                    kind: AstKind::Command(node),
                })))
            }
            Some(other) => {
                let fragment = format!("{other:?}");
                self.error(ErrorKind::Syntax, "unexpected token in argument list", fragment);
                None
            }
            None => None,
        }
    }

    /// Validate one unit against one schema slot and produce the AST value.
    fn check_slot(&mut self, spec: &CommandSpec, slot: &core_catalog::ArgSpec, unit: Unit) -> Option<AstArg> {
        let value = match unit {
            Unit::Literal(ArgValue::Number(text)) => AstArg::Number(text),
            Unit::Literal(ArgValue::Str(text)) => AstArg::Str(text),
            Unit::Literal(ArgValue::Variable(name)) => AstArg::Variable(name),
            Unit::Literal(ArgValue::List(name)) => AstArg::List(name),
            Unit::Literal(ArgValue::Dict(name)) => AstArg::Dict(name),
            Unit::Literal(ArgValue::FuncArg(name)) => AstArg::FuncArg(name),
            Unit::Literal(ArgValue::ArgDef { .. }) => {
                self.error(
                    ErrorKind::ArgKindMismatch,
                    "argument definitions belong in 'func:' headers",
                    &slot.name,
                );
                return None;
            }
            Unit::Literal(ArgValue::Kwarg { key, .. }) => {
                self.error(
                    ErrorKind::ArgKindMismatch,
                    format!("named argument '{key}' is not valid for '{}'", spec.path),
                    key,
                );
                return None;
            }
            Unit::Call(block) => AstArg::Reporter(block),
        };

        match &slot.kind {
            SlotKind::Input(InputType::Bool) => {
                let ok = match &value {
                    AstArg::Reporter(block) => self.reporter_returns_bool(block),
                    AstArg::FuncArg(_) => true,
                    _ => false,
                };
                if !ok {
                    self.error(
                        ErrorKind::ArgKindMismatch,
                        format!(
                            "slot '{}' of '{}' needs a boolean reporter",
                            slot.name, spec.path
                        ),
                        &slot.name,
                    );
                    return None;
                }
            }
            SlotKind::Input(_) => {
                if matches!(value, AstArg::Dict(_)) {
                    self.error(
                        ErrorKind::ArgKindMismatch,
                        "no command accepts a dictionary argument",
                        &slot.name,
                    );
                    return None;
                }
            }
            SlotKind::Field(kind) => {
                let ok = match kind {
                    FieldKind::Choice(options) => match &value {
                        AstArg::Str(text) => {
                            if let Some(options) = options {
                                if !options.iter().any(|o| o == text) {
                                    self.error(
                                        ErrorKind::InvalidFieldChoice,
                                        format!(
                                            "'{text}' is not a valid choice for '{}' of '{}'",
                                            slot.name, spec.path
                                        ),
                                        text.clone(),
                                    );
                                    return None;
                                }
                            }
                            true
                        }
                        AstArg::Number(_) => options.is_none(),
                        _ => false,
                    },
                    FieldKind::Variable => {
                        matches!(value, AstArg::Str(_) | AstArg::Variable(_))
                    }
                    FieldKind::List => matches!(value, AstArg::Str(_) | AstArg::List(_)),
                    FieldKind::Broadcast => {
                        matches!(value, AstArg::Str(_) | AstArg::Number(_))
                    }
                };
                if !ok {
                    self.error(
                        ErrorKind::ArgKindMismatch,
                        format!(
                            "slot '{}' of '{}' takes a fixed field value",
                            slot.name, spec.path
                        ),
                        &slot.name,
                    );
                    return None;
                }
            }
            SlotKind::Macro(_) => unreachable!("macro slots never reach emission schemas"),
        }

        Some(value)
    }

    fn reporter_returns_bool(&self, block: &AstBlock) -> bool {
        match &block.kind {
            AstKind::Command(node) => self
                .catalog
                .lookup(&node.path)
                .and_then(|spec| spec.return_type)
                == Some(ReturnType::Bool),
            // A user procedure used as a reporter is not expressible here.
            _ => false,
        }
    }

    // ---------------------------------------------------------------------
    // Macros
    // ---------------------------------------------------------------------

    /// Capture the call's raw argument units, splice them into the template,
    /// and run the expansion through the lexer and this parser again.
    fn expand_macro_call(
        &mut self,
        spec: &CommandSpec,
        line: usize,
        expression: bool,
    ) -> Option<AstBlock> {
        if self.macro_depth >= MACRO_DEPTH_LIMIT {
            self.error(
                ErrorKind::MacroExpansion,
                format!("macro expansion deeper than {MACRO_DEPTH_LIMIT} levels"),
                &spec.path,
            );
            self.skip_group();
            return None;
        }

        if !matches!(self.peek(), Some(Token::LParen)) {
            self.error(ErrorKind::Syntax, "expected '('", &spec.path);
            return None;
        }
        self.bump();

        let mut spans: Vec<(usize, usize)> = Vec::new();
        loop {
            match self.peek() {
                None | Some(Token::Newline) => {
                    self.error(ErrorKind::Syntax, "unbalanced '('", &spec.path);
                    return None;
                }
                Some(Token::RParen) => {
                    self.bump();
                    break;
                }
                _ => {
                    let start = self.pos;
                    self.capture_unit();
                    spans.push((start, self.pos));
                }
            }
        }

        let params: Vec<_> = spec.args.iter().map(|a| a.name.clone()).collect();
        if spans.len() != params.len() {
            self.error(
                ErrorKind::ArgCountMismatch,
                format!(
                    "'{}' expects [{}] arguments, but got [{}]",
                    spec.path,
                    params.len(),
                    spans.len()
                ),
                &spec.path,
            );
            return None;
        }

        let template = spec
            .template
            .as_deref()
            .expect("expand_macro_call only runs for macros");
        let mut instantiated = template.to_string();
        for (param, (start, end)) in params.iter().zip(&spans) {
            let text = serialize_tokens(&self.tokens[*start..*end]);
            instantiated = instantiated.replace(&format!("{{{param}}}"), &text);
        }
        trace!(target: "parser", macro_path = spec.path.as_str(), expansion = instantiated.as_str(), "macro_expanded");

        let expanded = if expression {
            tokenize_expression(&instantiated, self.reporter)
        } else {
            tokenize(&instantiated, self.reporter)
        };

        // Parse the expansion in place by swapping the token buffer, the way
        // a nested stream would be.
        let saved_tokens = std::mem::replace(&mut self.tokens, expanded);
        let saved_pos = std::mem::replace(&mut self.pos, 0);
        let saved_line = self.line;
        self.macro_depth += 1;

        let result = if expression {
            match self.parse_unit() {
                Some(Unit::Call(block)) => Some(*block),
                _ => {
                    self.error(
                        ErrorKind::MacroExpansion,
                        format!("macro '{}' did not expand to a reporter", spec.path),
                        &spec.path,
                    );
                    None
                }
            }
        } else {
            self.parse_statement().0
        };

        self.macro_depth -= 1;
        self.tokens = saved_tokens;
        self.pos = saved_pos;
        self.line = saved_line;
        result.map(|mut block| {
            block.line = line;
            block
        })
    }

    /// Skip one argument unit (literal or call) without interpreting it.
    fn capture_unit(&mut self) {
        if let Some(Token::Reporter(_)) = self.bump() {
            self.skip_group();
        }
    }

    /// Consume the statement trailer after a macro in statement position.
    fn finish_statement_trailer(&mut self, block: &Option<AstBlock>) {
        if block.is_none() {
            self.skip_statement();
            return;
        }
        while matches!(
            self.peek(),
            Some(Token::FuncType(_)) | Some(Token::Comment(_))
        ) {
            self.bump();
        }
    }

    // ---------------------------------------------------------------------
    // Procedures
    // ---------------------------------------------------------------------

    /// `func:Name(warp=bool, a[Type], ...) { body }`
    fn parse_proc_def(&mut self, name: &str, line: usize) -> Option<AstBlock> {
        if name.contains("%s") || name.contains("%d") {
            self.error(
                ErrorKind::InvalidProcedureHeader,
                format!("invalid procedure name '{name}'"),
                name,
            );
            self.skip_statement();
            return None;
        }

        if !matches!(self.peek(), Some(Token::LParen)) {
            self.error(ErrorKind::Syntax, "expected '('", name);
            return None;
        }
        self.bump();

        let mut warp: Option<bool> = None;
        let mut params: Vec<ProcParam> = Vec::new();
        let mut first = true;
        loop {
            match self.bump() {
                None | Some(Token::Newline) => {
                    self.error(ErrorKind::Syntax, "unbalanced '('", name);
                    return None;
                }
                Some(Token::RParen) => break,
                Some(Token::Argument(ArgValue::Kwarg { key, value })) if first => {
                    if key != "warp" || !matches!(value.as_str(), "true" | "false") {
                        self.error(
                            ErrorKind::InvalidProcedureHeader,
                            format!("procedure '{name}' must open with warp=true|false"),
                            format!("{key}={value}"),
                        );
                    } else {
                        warp = Some(value == "true");
                    }
                }
                Some(Token::Argument(ArgValue::ArgDef { name: arg, ty })) if !first => {
                    let ty = match ty.as_str() {
                        "exp" => ProcParamType::Exp,
                        "bool" => ProcParamType::Bool,
                        other => {
                            self.error(
                                ErrorKind::InvalidProcedureHeader,
                                format!("unexpected argument type '{other}' for procedure '{name}'"),
                                arg.clone(),
                            );
                            continue;
                        }
                    };
                    params.push(ProcParam { name: arg, ty });
                }
                Some(other) => {
                    let fragment = format!("{other:?}");
                    self.error(
                        ErrorKind::InvalidProcedureHeader,
                        format!("malformed header for procedure '{name}'"),
                        fragment,
                    );
                }
            }
            first = false;
        }

        let warp = match warp {
            Some(warp) => warp,
            None => {
                self.error(
                    ErrorKind::InvalidProcedureHeader,
                    format!("procedure '{name}' must open with warp=true|false"),
                    name,
                );
                false
            }
        };

        if matches!(self.peek(), Some(Token::FuncType(_))) {
            self.bump();
        }
        let comment = self.take_comment();

        if !matches!(self.peek(), Some(Token::LCurly)) {
            self.error(
                ErrorKind::Syntax,
                format!("procedure '{name}' expects a '{{' body"),
                name,
            );
            return None;
        }
        self.bump();
        let body = self.parse_body();

        Some(AstBlock {
            line,
            kind: AstKind::ProcDef(ProcDefNode {
                name: name.to_string(),
                warp,
                params,
                body,
                comment,
            }),
        })
    }

    /// `fn.Name(arg:value, ...)` — values re-lex as expressions.
    fn parse_proc_call(&mut self, name: &str, line: usize) -> Option<AstBlock> {
        if !matches!(self.peek(), Some(Token::LParen)) {
            self.error(ErrorKind::Syntax, "expected '('", name);
            return None;
        }
        self.bump();

        let mut args: Vec<(String, AstArg)> = Vec::new();
        loop {
            match self.bump() {
                None | Some(Token::Newline) => {
                    self.error(ErrorKind::Syntax, "unbalanced '('", name);
                    return None;
                }
                Some(Token::RParen) => break,
                Some(Token::Argument(ArgValue::Kwarg { key, value })) => {
                    if let Some(arg) = self.parse_expression_text(&value) {
                        args.push((key, arg));
                    }
                }
                Some(other) => {
                    let fragment = format!("{other:?}");
                    self.error(
                        ErrorKind::Syntax,
                        format!(
                            "procedure call '{name}' takes name:value pairs"
                        ),
                        fragment,
                    );
                }
            }
        }

        if matches!(self.peek(), Some(Token::FuncType(_))) {
            self.bump();
        }
        let comment = self.take_comment();

        Some(AstBlock {
            line,
            kind: AstKind::ProcCall(ProcCallNode {
                name: name.to_string(),
                args,
                comment,
            }),
        })
    }

    /// Lex and parse one expression given as raw text (kwarg values).
    fn parse_expression_text(&mut self, text: &str) -> Option<AstArg> {
        let expanded = tokenize_expression(text, self.reporter);
        if expanded.is_empty() {
            return None;
        }
        let saved_tokens = std::mem::replace(&mut self.tokens, expanded);
        let saved_pos = std::mem::replace(&mut self.pos, 0);
        let unit = self.parse_unit();
        self.tokens = saved_tokens;
        self.pos = saved_pos;
        match unit {
            Some(Unit::Call(block)) => Some(AstArg::Reporter(block)),
            Some(Unit::Literal(value)) => match value {
                ArgValue::Number(text) => Some(AstArg::Number(text)),
                ArgValue::Str(text) => Some(AstArg::Str(text)),
                ArgValue::Variable(name) => Some(AstArg::Variable(name)),
                ArgValue::List(name) => Some(AstArg::List(name)),
                ArgValue::Dict(name) => Some(AstArg::Dict(name)),
                ArgValue::FuncArg(name) => Some(AstArg::FuncArg(name)),
                ArgValue::ArgDef { .. } | ArgValue::Kwarg { .. } => {
                    self.error(ErrorKind::Syntax, "invalid argument value", text);
                    None
                }
            },
            None => None,
        }
    }
}

/// One argument unit as it comes off the token stream.
enum Unit {
    Literal(ArgValue),
    Call(Box<AstBlock>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_catalog::CatalogOptions;
    use core_report::Phase;

    fn catalog() -> Catalog {
        Catalog::builtin(CatalogOptions::default()).unwrap()
    }

    fn parse_ok(code: &str) -> Vec<Vec<AstBlock>> {
        let catalog = catalog();
        let mut reporter = Reporter::new();
        let tokens = tokenize(code, &mut reporter);
        let stacks = parse(tokens, &catalog, &mut reporter);
        if let Err(failure) = reporter.checkpoint(Phase::Parse) {
            panic!("unexpected errors: {:?}", failure.errors);
        }
        stacks
    }

    fn parse_errors(code: &str) -> Vec<core_report::CompileError> {
        let catalog = catalog();
        let mut reporter = Reporter::new();
        let tokens = tokenize(code, &mut reporter);
        parse(tokens, &catalog, &mut reporter);
        reporter
            .checkpoint(Phase::Parse)
            .err()
            .map(|f| f.errors)
            .unwrap_or_default()
    }

    fn command(block: &AstBlock) -> &CommandNode {
        match &block.kind {
            AstKind::Command(node) => node,
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn hat_with_body_chains_blocks() {
        let stacks = parse_ok("events.onflag() {\nmotion.move(10)\nlooks.show()\n}");
        assert_eq!(stacks.len(), 1);
        let stack = &stacks[0];
        assert_eq!(stack.len(), 3);
        assert_eq!(command(&stack[0]).path, "events.onflag");
        assert_eq!(command(&stack[1]).path, "motion.move");
        assert_eq!(command(&stack[1]).args[0].1, AstArg::Number("10".into()));
    }

    #[test]
    fn empty_script_has_no_stacks() {
        assert!(parse_ok("").is_empty());
        assert!(parse_ok("\n\n# only a comment\n").is_empty());
    }

    #[test]
    fn lone_hat_has_no_next() {
        let stacks = parse_ok("events.onflag()");
        assert_eq!(stacks.len(), 1);
        assert_eq!(stacks[0].len(), 1);
    }

    #[test]
    fn nested_reporter_arguments() {
        let stacks = parse_ok("var.set(\"x\", op.add(1, 2))");
        let node = command(&stacks[0][0]);
        assert_eq!(node.path, "var.set");
        let AstArg::Reporter(inner) = &node.args[1].1 else {
            panic!("expected nested reporter");
        };
        assert_eq!(command(inner).path, "op.add");
    }

    #[test]
    fn if_with_two_substacks_becomes_ifelse() {
        let stacks =
            parse_ok("control.if(op.gt($a, 0)) {\nlooks.say(\"+\")\n} {\nlooks.say(\"-\")\n}");
        let node = command(&stacks[0][0]);
        assert_eq!(node.path, "control.ifelse");
        assert_eq!(node.substacks.len(), 2);
        assert_eq!(command(&node.substacks[0][0]).path, "looks.say");
        assert_eq!(command(&node.substacks[1][0]).path, "looks.say");
    }

    #[test]
    fn if_with_one_substack_stays_if() {
        let stacks = parse_ok("control.if(op.gt($a, 0)) {\nlooks.say(\"+\")\n}");
        let node = command(&stacks[0][0]);
        assert_eq!(node.path, "control.if");
        assert_eq!(node.substacks.len(), 1);
    }

    #[test]
    fn nested_c_blocks() {
        let stacks = parse_ok(
            "control.repeat(3) {\ncontrol.if(op.lt($i, 2)) {\nmotion.move(1)\n}\nlooks.show()\n}",
        );
        let repeat = command(&stacks[0][0]);
        assert_eq!(repeat.substacks.len(), 1);
        assert_eq!(repeat.substacks[0].len(), 2);
        let inner_if = command(&repeat.substacks[0][0]);
        assert_eq!(inner_if.substacks[0].len(), 1);
    }

    #[test]
    fn unknown_command_reports_one_error() {
        let errors = parse_errors("foo.bar()");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::UnknownCommand);
        assert!(errors[0].message.contains("foo.bar"));
        assert_eq!(errors[0].line, Some(1));
    }

    #[test]
    fn arg_count_mismatch() {
        let errors = parse_errors("motion.move(1, 2)");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::ArgCountMismatch);
    }

    #[test]
    fn bool_slot_rejects_plain_literal() {
        let errors = parse_errors("control.waituntil(5)");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::ArgKindMismatch);
    }

    #[test]
    fn bool_slot_accepts_bool_reporter_and_funcarg() {
        parse_ok("control.waituntil(op.gt(1, 2))");
        parse_ok("func:F(warp=false, flag[bool]) {\ncontrol.waituntil(a.flag)\n}");
    }

    #[test]
    fn field_choice_is_validated() {
        let errors = parse_errors("motion.rotationstyle(\"sideways\")");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::InvalidFieldChoice);
        parse_ok("motion.rotationstyle(\"left-right\")");
    }

    #[test]
    fn macro_expands_to_mathop() {
        let stacks = parse_ok("var.set(\"x\", op.sqrt(9))");
        let node = command(&stacks[0][0]);
        let AstArg::Reporter(inner) = &node.args[1].1 else {
            panic!("expected reporter");
        };
        let mathop = command(inner);
        assert_eq!(mathop.path, "op.mathop");
        assert_eq!(mathop.args[0].1, AstArg::Str("sqrt".into()));
        assert_eq!(mathop.args[1].1, AstArg::Number("9".into()));
    }

    #[test]
    fn macro_argument_expressions_survive_expansion() {
        let stacks = parse_ok("var.set(\"x\", op.sqrt(op.add($a, 1)))");
        let node = command(&stacks[0][0]);
        let AstArg::Reporter(mathop) = &node.args[1].1 else {
            panic!("expected reporter");
        };
        let AstArg::Reporter(add) = &command(mathop).args[1].1 else {
            panic!("expected nested add");
        };
        assert_eq!(command(add).path, "op.add");
    }

    #[test]
    fn comparison_macros_expand_to_not_forms() {
        let stacks = parse_ok("control.waituntil($a <= 3)");
        let node = command(&stacks[0][0]);
        let AstArg::Reporter(not) = &node.args[0].1 else {
            panic!("expected reporter");
        };
        assert_eq!(command(not).path, "op.not");
        let AstArg::Reporter(gt) = &command(not).args[0].1 else {
            panic!("expected gt");
        };
        assert_eq!(command(gt).path, "op.gt");
    }

    #[test]
    fn proc_def_header_parses() {
        let stacks = parse_ok("func:Half(warp=true, n[exp], flag[bool]) {\nlooks.say(a.n)\n}");
        let AstKind::ProcDef(def) = &stacks[0][0].kind else {
            panic!("expected proc def");
        };
        assert_eq!(def.name, "Half");
        assert!(def.warp);
        assert_eq!(def.params.len(), 2);
        assert_eq!(def.params[1].ty, ProcParamType::Bool);
        assert_eq!(def.body.len(), 1);
    }

    #[test]
    fn proc_def_bad_warp_flag() {
        let errors = parse_errors("func:F(warp=maybe) {\n}");
        assert_eq!(errors[0].kind, ErrorKind::InvalidProcedureHeader);
    }

    #[test]
    fn proc_def_percent_name_rejected() {
        let errors = parse_errors("func:Bad%s(warp=false) {\n}");
        assert_eq!(errors[0].kind, ErrorKind::InvalidProcedureHeader);
    }

    #[test]
    fn proc_call_parses_named_expressions() {
        let stacks = parse_ok("fn.Half(n:op.add(1, 2))");
        let AstKind::ProcCall(call) = &stacks[0][0].kind else {
            panic!("expected proc call");
        };
        assert_eq!(call.name, "Half");
        assert_eq!(call.args.len(), 1);
        assert_eq!(call.args[0].0, "n");
        assert!(matches!(call.args[0].1, AstArg::Reporter(_)));
    }

    #[test]
    fn forward_reference_is_allowed() {
        let stacks = parse_ok("fn.F(n:1)\nfunc:F(warp=false, n[exp]) {\nlooks.say(a.n)\n}");
        assert_eq!(stacks.len(), 2);
        assert!(matches!(stacks[0][0].kind, AstKind::ProcCall(_)));
        assert!(matches!(stacks[1][0].kind, AstKind::ProcDef(_)));
    }

    #[test]
    fn comment_attaches_to_statement() {
        let stacks = parse_ok("motion.move(10) # onward");
        assert_eq!(command(&stacks[0][0]).comment.as_deref(), Some("onward"));
    }

    #[test]
    fn comment_attaches_to_c_block_head() {
        let stacks = parse_ok("control.forever() { # spin\nmotion.turn(1)\n}");
        assert_eq!(command(&stacks[0][0]).comment.as_deref(), Some("spin"));
    }

    #[test]
    fn missing_close_brace_reports() {
        let errors = parse_errors("events.onflag() {\nmotion.move(1)\n");
        assert!(errors.iter().any(|e| e.kind == ErrorKind::Syntax));
    }

    #[test]
    fn source_lines_are_recorded() {
        let stacks = parse_ok("events.onflag() {\nmotion.move(10)\n}");
        assert_eq!(stacks[0][0].line, 1);
        assert_eq!(stacks[0][1].line, 2);
    }

    #[test]
    fn deeply_nested_reporters_parse() {
        let mut expr = String::from("1");
        for _ in 0..9 {
            expr = format!("op.add(1, {expr})");
        }
        let stacks = parse_ok(&format!("var.set(\"x\", {expr})"));
        let mut depth = 0;
        let mut arg = &command(&stacks[0][0]).args[1].1;
        while let AstArg::Reporter(block) = arg {
            depth += 1;
            arg = &command(block).args[1].1;
        }
        assert_eq!(depth, 9);
    }
}
