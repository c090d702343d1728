//! Per-statement tokenizer for Katnip source.
//!
//! Statements are separated by newlines or `;` outside strings. Each
//! statement lexes to a head token (`function` / `functionCall` /
//! `functionDef`, or bare braces), a parenthesised argument run, optional
//! return-type and brace tokens from the trailer, an optional trailing
//! comment, and a terminating `newline`.
//!
//! Operator glyphs in arguments are resolved here: an argument containing
//! top-level operators is rewritten into the equivalent reporter call
//! (`1+2` lexes exactly like `op.add(1, 2)`), so the parser only ever sees
//! call-shaped expressions. Splitting is right-to-left per precedence tier,
//! which yields left-associative evaluation.

use core_report::{ErrorKind, Reporter};
use core_scan::{
    CallParts, extract_call, find_all_outside_strings, find_all_top_level, is_numeric_literal,
    replace_outside_strings, split_outside_strings, strings_balanced, strip_comment,
};
use tracing::trace;

mod ops;
mod serialize;

pub use serialize::{escape_string, serialize_tokens, unescape_string};

/// Payload of an `argument` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Number(String),
    Str(String),
    /// `$name`
    Variable(String),
    /// `@l:name`
    List(String),
    /// `@d:name`
    Dict(String),
    /// `a.name` — reference to an enclosing procedure's argument.
    FuncArg(String),
    /// `name[Type]` — procedure header parameter.
    ArgDef { name: String, ty: String },
    /// `key=value` or `key:value`; the value is kept raw and re-lexed by the
    /// consumer that knows what it should be.
    Kwarg { key: String, value: String },
}

/// One token of the flat statement stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Plain command head (`motion.move`, `events.onflag`, ...).
    Function(String),
    /// `fn.Name` procedure call head.
    FunctionCall(String),
    /// `func:Name` procedure definition head.
    FunctionDef(String),
    /// Nested call inside an argument position.
    Reporter(String),
    Argument(ArgValue),
    LParen,
    RParen,
    LCurly,
    RCurly,
    Newline,
    Comment(String),
    /// `-> T` return annotation from a statement trailer.
    FuncType(String),
}

/// Tokenize a whole script. Errors accumulate on the reporter; the caller
/// checkpoints them at the phase boundary.
pub fn tokenize(code: &str, reporter: &mut Reporter) -> Vec<Token> {
    let mut lexer = Lexer {
        tokens: Vec::new(),
        line: 0,
        reporter,
    };
    lexer.run(code);
    lexer.tokens
}

/// Tokenize a single expression (one argument position). Used for kwarg
/// values and macro template instantiation.
pub fn tokenize_expression(text: &str, reporter: &mut Reporter) -> Vec<Token> {
    let mut lexer = Lexer {
        tokens: Vec::new(),
        line: 0,
        reporter,
    };
    let cleaned = replace_outside_strings(text, " ", "");
    lexer.tokenize_arg(cleaned.trim());
    lexer.tokens
}

struct Lexer<'r> {
    tokens: Vec<Token>,
    line: usize,
    reporter: &'r mut Reporter,
}

impl Lexer<'_> {
    fn run(&mut self, code: &str) {
        // `;` separates statements within a line; normalising it to a newline
        // first lets one loop handle both. `;\n` collapses so a terminator at
        // end of line does not produce a phantom statement.
        let code = replace_outside_strings(code, ";\n", "\n");
        let code = replace_outside_strings(&code, ";", "\n");
        for (idx, line) in split_outside_strings(&code, "\n").into_iter().enumerate() {
            self.line = idx + 1;
            self.tokenize_line(line);
            self.tokens.push(Token::Newline);
        }
    }

    fn error(&mut self, kind: ErrorKind, message: impl Into<String>, fragment: &str) {
        self.reporter
            .report(kind, message, fragment, Some(self.line));
    }

    fn tokenize_line(&mut self, raw: &str) {
        let line = raw.trim();
        let line = replace_outside_strings(line, " ", "");
        let line = replace_outside_strings(&line, "\t", "");
        if line.is_empty() || line.starts_with('#') {
            return;
        }
        if !strings_balanced(&line) {
            // Fatal for this statement only; scanning continues on the next.
            self.error(ErrorKind::Syntax, "unterminated string", raw.trim());
            return;
        }

        let (code, comment) = strip_comment(&line);
        if code.is_empty() {
            return;
        }
        let parts = extract_call(code);
        trace!(target: "lexer", line = self.line, head = parts.name.as_str(), "statement");

        if parts.name.chars().all(|c| c == '{' || c == '}') && !parts.name.is_empty() {
            // Bare brace statement(s): `}`, `{`, or `} {` squeezed together.
            for c in parts.name.chars() {
                self.tokens.push(if c == '{' {
                    Token::LCurly
                } else {
                    Token::RCurly
                });
            }
            self.trailing_braces(&parts.trailer);
            return;
        }

        self.tokens.push(identify_head(&parts.name));
        self.tokens.push(Token::LParen);
        for arg in &parts.args {
            self.tokenize_arg(arg);
        }
        self.tokens.push(Token::RParen);

        if let Some(annotation) = parts.trailer.split_once("->").map(|(_, rest)| rest) {
            let ty = match annotation.split_once('{') {
                Some((ty, _)) => ty,
                None => annotation,
            };
            self.tokens.push(Token::FuncType(ty.trim().to_string()));
        }
        self.trailing_braces(&parts.trailer);

        if let Some(comment) = comment {
            self.tokens.push(Token::Comment(comment.to_string()));
        }
    }

    fn trailing_braces(&mut self, trailer: &str) {
        if trailer.contains('{') {
            self.tokens.push(Token::LCurly);
        } else if trailer.contains('}') {
            self.tokens.push(Token::RCurly);
        }
    }

    /// Classify one raw argument and append its token run.
    fn tokenize_arg(&mut self, arg: &str) {
        if arg.is_empty() {
            return;
        }

        // Top-level binary operators first, lowest tier first, rightmost
        // occurrence first; the recursion makes each tier left-associative.
        if let Some(split) = ops::split_binary(arg) {
            if split.lhs.is_empty() || split.rhs.is_empty() {
                self.error(
                    ErrorKind::Syntax,
                    format!("operator '{}' is missing an operand", split.glyph),
                    arg,
                );
                return;
            }
            self.tokens.push(Token::Reporter(split.command.to_string()));
            self.tokens.push(Token::LParen);
            self.tokenize_arg(split.lhs);
            self.tokenize_arg(split.rhs);
            self.tokens.push(Token::RParen);
            return;
        }

        // Unary `!` binds tighter than every binary tier.
        if let Some(operand) = arg.strip_prefix('!') {
            if operand.is_empty() {
                self.error(ErrorKind::Syntax, "'!' is missing an operand", arg);
                return;
            }
            self.tokens.push(Token::Reporter("op.not".to_string()));
            self.tokens.push(Token::LParen);
            self.tokenize_arg(operand);
            self.tokens.push(Token::RParen);
            return;
        }

        if let Some(name) = arg.strip_prefix('$') {
            self.push_arg(ArgValue::Variable(name.to_string()));
            return;
        }
        if let Some(name) = arg.strip_prefix("@l:") {
            self.push_arg(ArgValue::List(name.to_string()));
            return;
        }
        if let Some(name) = arg.strip_prefix("@d:") {
            self.push_arg(ArgValue::Dict(name.to_string()));
            return;
        }
        if arg.starts_with('@') {
            // Bare `@` is not a list; the sigil is `@l:`.
            self.error(
                ErrorKind::Syntax,
                "invalid sigil; lists are '@l:name' and dictionaries '@d:name'",
                arg,
            );
            return;
        }
        if let Some(name) = arg.strip_prefix("a.") {
            self.push_arg(ArgValue::FuncArg(name.to_string()));
            return;
        }
        if arg.starts_with('"') {
            if arg.len() >= 2 && arg.ends_with('"') {
                self.push_arg(ArgValue::Str(unescape_string(&arg[1..arg.len() - 1])));
            } else {
                self.error(ErrorKind::Syntax, "unterminated string", arg);
            }
            return;
        }
        if is_numeric_literal(arg) {
            self.push_arg(ArgValue::Number(arg.to_string()));
            return;
        }

        let first_paren = find_all_outside_strings(arg, "(").first().copied();

        // `name[Type]` procedure-header pair; brackets must not belong to a
        // nested call.
        if let (Some(open), Some(close)) = (arg.find('['), arg.rfind(']')) {
            if open < close && first_paren.is_none_or(|p| open < p) {
                self.push_arg(ArgValue::ArgDef {
                    name: arg[..open].to_string(),
                    ty: arg[open + 1..close].to_string(),
                });
                return;
            }
        }

        // `key=value` / `key:value` pairs, when the separator sits before any
        // call syntax. The value stays raw; consumers re-lex it in context.
        let separator = ['=', ':']
            .iter()
            .filter_map(|sep| {
                find_all_top_level(arg, &sep.to_string())
                    .into_iter()
                    .find(|&p| p > 0 && first_paren.is_none_or(|paren| p < paren))
            })
            .min();
        if let Some(pos) = separator {
            self.push_arg(ArgValue::Kwarg {
                key: arg[..pos].to_string(),
                value: arg[pos + 1..].to_string(),
            });
            return;
        }

        // Reporter call: `name(args)` where the name is non-empty.
        if first_paren.is_some_and(|p| p > 0) && arg.contains(')') {
            let CallParts { name, args, trailer } = extract_call(arg);
            if !trailer.is_empty() {
                self.error(
                    ErrorKind::Syntax,
                    "unexpected text after reporter call",
                    arg,
                );
                return;
            }
            self.tokens.push(Token::Reporter(name));
            self.tokens.push(Token::LParen);
            for inner in &args {
                self.tokenize_arg(inner);
            }
            self.tokens.push(Token::RParen);
            return;
        }

        // Parenthesised group: strip one pair and retry.
        if arg.starts_with('(') && arg.ends_with(')') {
            self.tokenize_arg(&arg[1..arg.len() - 1]);
            return;
        }

        self.error(ErrorKind::Syntax, "invalid argument", arg);
    }

    fn push_arg(&mut self, value: ArgValue) {
        self.tokens.push(Token::Argument(value));
    }
}

fn identify_head(name: &str) -> Token {
    if let Some(rest) = name.strip_prefix("fn.") {
        Token::FunctionCall(rest.to_string())
    } else if let Some(rest) = name.strip_prefix("func:") {
        Token::FunctionDef(rest.to_string())
    } else {
        Token::Function(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(code: &str) -> Vec<Token> {
        let mut reporter = Reporter::new();
        let tokens = tokenize(code, &mut reporter);
        assert!(!reporter.has_errors(), "unexpected lex errors");
        tokens
    }

    fn lex_errors(code: &str) -> usize {
        let mut reporter = Reporter::new();
        tokenize(code, &mut reporter);
        reporter.checkpoint(core_report::Phase::Lex).err().map_or(0, |f| f.errors.len())
    }

    #[test]
    fn simple_statement() {
        let tokens = lex("motion.move(10)");
        assert_eq!(
            tokens,
            vec![
                Token::Function("motion.move".into()),
                Token::LParen,
                Token::Argument(ArgValue::Number("10".into())),
                Token::RParen,
                Token::Newline,
            ]
        );
    }

    #[test]
    fn semicolons_split_statements() {
        let tokens = lex("looks.show();looks.hide()");
        let newlines = tokens.iter().filter(|t| **t == Token::Newline).count();
        assert_eq!(newlines, 2);
        assert!(tokens.contains(&Token::Function("looks.show".into())));
        assert!(tokens.contains(&Token::Function("looks.hide".into())));
    }

    #[test]
    fn hat_with_brace_trailer() {
        let tokens = lex("events.onflag() {");
        assert_eq!(tokens.last(), Some(&Token::Newline));
        assert!(tokens.contains(&Token::LCurly));
    }

    #[test]
    fn bare_closing_brace() {
        let tokens = lex("}");
        assert_eq!(tokens, vec![Token::RCurly, Token::Newline]);
    }

    #[test]
    fn else_brace_pair_on_one_line() {
        let tokens = lex("} {");
        assert_eq!(tokens, vec![Token::RCurly, Token::LCurly, Token::Newline]);
    }

    #[test]
    fn comment_extracted() {
        let tokens = lex("motion.move(10) # onward");
        assert!(tokens.contains(&Token::Comment("onward".into())));
    }

    #[test]
    fn comment_only_line_is_skipped() {
        let tokens = lex("# nothing here");
        assert_eq!(tokens, vec![Token::Newline]);
    }

    #[test]
    fn string_argument_keeps_spaces_and_unescapes() {
        let tokens = lex("looks.say(\"hello there \\\"world\\\"\")");
        assert!(tokens.contains(&Token::Argument(ArgValue::Str(
            "hello there \"world\"".into()
        ))));
    }

    #[test]
    fn sigil_arguments() {
        let tokens = lex("list.add(@l:items, $count)");
        assert!(tokens.contains(&Token::Argument(ArgValue::List("items".into()))));
        assert!(tokens.contains(&Token::Argument(ArgValue::Variable("count".into()))));
    }

    #[test]
    fn bare_at_sigil_is_rejected() {
        assert_eq!(lex_errors("list.add(@items, 1)"), 1);
    }

    #[test]
    fn reporter_call_argument() {
        let tokens = lex("var.set(\"x\", op.add(1, 2))");
        assert_eq!(
            tokens,
            vec![
                Token::Function("var.set".into()),
                Token::LParen,
                Token::Argument(ArgValue::Str("x".into())),
                Token::Reporter("op.add".into()),
                Token::LParen,
                Token::Argument(ArgValue::Number("1".into())),
                Token::Argument(ArgValue::Number("2".into())),
                Token::RParen,
                Token::RParen,
                Token::Newline,
            ]
        );
    }

    #[test]
    fn infix_add_lexes_like_reporter_call() {
        assert_eq!(
            lex("var.set(\"x\", 1 + 2)"),
            lex("var.set(\"x\", op.add(1, 2))")
        );
    }

    #[test]
    fn precedence_mul_binds_tighter_than_add() {
        assert_eq!(
            lex("var.set(\"x\", 1 + 2 * 3)"),
            lex("var.set(\"x\", op.add(1, op.multiply(2, 3)))")
        );
    }

    #[test]
    fn same_tier_is_left_associative() {
        assert_eq!(
            lex("var.set(\"x\", 10 - 4 - 3)"),
            lex("var.set(\"x\", op.subtract(op.subtract(10, 4), 3))")
        );
    }

    #[test]
    fn comparison_and_logic_tiers() {
        assert_eq!(
            lex("control.waituntil($a > 0 && $b < 5)"),
            lex("control.waituntil(op.and(op.gt($a, 0), op.lt($b, 5)))")
        );
    }

    #[test]
    fn two_char_comparators_not_split_as_single() {
        assert_eq!(
            lex("control.waituntil($a <= 3)"),
            lex("control.waituntil(op.lte($a, 3))")
        );
        assert_eq!(
            lex("control.waituntil($a != 3)"),
            lex("control.waituntil(op.nequals($a, 3))")
        );
    }

    #[test]
    fn unary_not_binds_tightest() {
        assert_eq!(
            lex("control.waituntil(!$a && $b)"),
            lex("control.waituntil(op.and(op.not($a), $b))")
        );
    }

    #[test]
    fn negative_number_is_a_literal_not_subtraction() {
        let tokens = lex("motion.move(-5)");
        assert!(tokens.contains(&Token::Argument(ArgValue::Number("-5".into()))));
    }

    #[test]
    fn operators_inside_strings_are_opaque() {
        let tokens = lex("looks.say(\"1+2\")");
        assert!(tokens.contains(&Token::Argument(ArgValue::Str("1+2".into()))));
    }

    #[test]
    fn operators_inside_nested_call_not_split_at_outer_level() {
        assert_eq!(
            lex("var.set(\"x\", op.add(1, 2) * 3)"),
            lex("var.set(\"x\", op.multiply(op.add(1, 2), 3))")
        );
    }

    #[test]
    fn parenthesised_group_overrides_precedence() {
        assert_eq!(
            lex("var.set(\"x\", (1 + 2) * 3)"),
            lex("var.set(\"x\", op.multiply(op.add(1, 2), 3))")
        );
    }

    #[test]
    fn function_def_header_tokens() {
        let tokens = lex("func:Half(warp=false, n[exp]) {");
        assert_eq!(tokens[0], Token::FunctionDef("Half".into()));
        assert!(tokens.contains(&Token::Argument(ArgValue::Kwarg {
            key: "warp".into(),
            value: "false".into(),
        })));
        assert!(tokens.contains(&Token::Argument(ArgValue::ArgDef {
            name: "n".into(),
            ty: "exp".into(),
        })));
        assert!(tokens.contains(&Token::LCurly));
    }

    #[test]
    fn function_call_with_named_expression_value() {
        let tokens = lex("fn.Half(n:op.add(1, 2))");
        assert_eq!(tokens[0], Token::FunctionCall("Half".into()));
        assert!(tokens.contains(&Token::Argument(ArgValue::Kwarg {
            key: "n".into(),
            value: "op.add(1,2)".into(),
        })));
    }

    #[test]
    fn return_type_annotation() {
        let tokens = lex("fn.Half(n:4) -> num");
        assert!(tokens.contains(&Token::FuncType("num".into())));
    }

    #[test]
    fn unterminated_string_is_fatal_for_statement_only() {
        let mut reporter = Reporter::new();
        let tokens = tokenize("looks.say(\"oops\nmotion.move(1)", &mut reporter);
        assert!(reporter.has_errors());
        assert!(tokens.contains(&Token::Function("motion.move".into())));
    }

    #[test]
    fn invalid_argument_recovers_and_reports() {
        assert_eq!(lex_errors("motion.gotoxy(&wat, ~huh)"), 2);
    }

    #[test]
    fn expression_entry_point() {
        let mut reporter = Reporter::new();
        let tokens = tokenize_expression("op.add(1, 2)", &mut reporter);
        assert_eq!(tokens[0], Token::Reporter("op.add".into()));
    }
}
