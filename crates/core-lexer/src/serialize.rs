//! Canonical re-serialization of token runs.
//!
//! The canonical text drops all optional whitespace and writes kwargs with
//! `=`; re-lexing it yields the original token stream. Macro expansion leans
//! on this to splice caller arguments into templates, and the idempotence
//! property test pins the round trip.

use crate::{ArgValue, Token};

/// Render a token run back into canonical source text.
pub fn serialize_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    // One separator flag per open paren: set once a complete argument unit
    // has been written at that depth.
    let mut frames: Vec<bool> = Vec::new();

    fn separate(out: &mut String, frames: &mut [bool]) {
        if let Some(top) = frames.last_mut() {
            if *top {
                out.push(',');
                *top = false;
            }
        }
    }

    fn complete(frames: &mut [bool]) {
        if let Some(top) = frames.last_mut() {
            *top = true;
        }
    }

    for token in tokens {
        match token {
            Token::Function(name) => out.push_str(name),
            Token::FunctionCall(name) => {
                out.push_str("fn.");
                out.push_str(name);
            }
            Token::FunctionDef(name) => {
                out.push_str("func:");
                out.push_str(name);
            }
            Token::Reporter(name) => {
                separate(&mut out, &mut frames);
                out.push_str(name);
            }
            Token::Argument(value) => {
                separate(&mut out, &mut frames);
                out.push_str(&serialize_arg(value));
                complete(&mut frames);
            }
            Token::LParen => {
                out.push('(');
                frames.push(false);
            }
            Token::RParen => {
                out.push(')');
                frames.pop();
                complete(&mut frames);
            }
            Token::LCurly => out.push('{'),
            Token::RCurly => out.push('}'),
            Token::FuncType(ty) => {
                out.push_str("->");
                out.push_str(ty);
            }
            Token::Comment(text) => {
                out.push('#');
                out.push_str(text);
            }
            Token::Newline => out.push('\n'),
        }
    }
    out
}

fn serialize_arg(value: &ArgValue) -> String {
    match value {
        ArgValue::Number(text) => text.clone(),
        ArgValue::Str(text) => format!("\"{}\"", escape_string(text)),
        ArgValue::Variable(name) => format!("${name}"),
        ArgValue::List(name) => format!("@l:{name}"),
        ArgValue::Dict(name) => format!("@d:{name}"),
        ArgValue::FuncArg(name) => format!("a.{name}"),
        ArgValue::ArgDef { name, ty } => format!("{name}[{ty}]"),
        ArgValue::Kwarg { key, value } => format!("{key}={value}"),
    }
}

/// Escape a string payload for embedding between quotes.
pub fn escape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out
}

/// Undo [`escape_string`]: a backslash escapes the character after it.
pub fn unescape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => out.push(next),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenize;
    use core_report::Reporter;

    fn roundtrip(code: &str) {
        let mut reporter = Reporter::new();
        let first = tokenize(code, &mut reporter);
        assert!(!reporter.has_errors(), "lex errors in fixture");
        let canonical = serialize_tokens(&first);
        let second = tokenize(&canonical, &mut reporter);
        assert!(!reporter.has_errors(), "canonical text failed to re-lex");
        assert_eq!(first, second, "canonical form changed the stream");
    }

    #[test]
    fn roundtrip_simple_statement() {
        roundtrip("motion.move(10)");
    }

    #[test]
    fn roundtrip_nested_reporters_and_strings() {
        roundtrip("var.set(\"x\", op.join(\"a, b\", op.add(1, 2)))");
    }

    #[test]
    fn roundtrip_operators_normalise_once() {
        let mut reporter = Reporter::new();
        let infix = tokenize("var.set(\"x\", 1 + 2 * 3)", &mut reporter);
        let canonical = serialize_tokens(&infix);
        assert_eq!(canonical, "var.set(\"x\",op.add(1,op.multiply(2,3)))\n");
        roundtrip(&canonical);
    }

    #[test]
    fn roundtrip_full_script() {
        roundtrip(
            "events.onflag() {\nmotion.move(10) # forward\ncontrol.if(op.gt($a, 0)) {\nlooks.say(\"+\")\n} {\nlooks.say(\"-\")\n}\n}",
        );
    }

    #[test]
    fn roundtrip_procedure_definition_and_call() {
        roundtrip("func:Half(warp=false, n[exp]) {\nlooks.say(a.n)\n}\nfn.Half(n:4)");
    }

    #[test]
    fn escape_unescape_inverse() {
        let original = "say \"hi\" \\ done";
        assert_eq!(unescape_string(&escape_string(original)), original);
    }

    #[test]
    fn string_with_escaped_quote_roundtrips() {
        roundtrip("looks.say(\"he said \\\"hi\\\"\")");
    }
}
