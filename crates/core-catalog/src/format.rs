//! Parser for the human-readable catalog text format.
//!
//! One command per line: `useName:opcode:shape:inputSpec[,inputSpec...]`.
//! Each `inputSpec` is `section.name[type]` with an optional `{a;b;...}`
//! choice set for fields; `alias:name:target` lines register aliases.

use crate::{ArgSpec, CommandSpec, FieldKind, InputType, ReturnType, Shape, SlotKind};

#[derive(Debug)]
pub(crate) enum Entry {
    Command(CommandSpec),
    Alias { name: String, target: String },
}

pub(crate) fn parse_line(line: &str) -> Result<Entry, String> {
    if let Some(rest) = line.strip_prefix("alias:") {
        let (name, target) = rest
            .split_once(':')
            .ok_or_else(|| "alias line needs alias:name:target".to_string())?;
        if name.is_empty() || target.is_empty() {
            return Err("alias name and target must be non-empty".into());
        }
        return Ok(Entry::Alias {
            name: name.to_ascii_lowercase(),
            target: target.to_ascii_lowercase(),
        });
    }

    let parts: Vec<&str> = line.splitn(4, ':').collect();
    let [name, opcode, shape, args] = parts[..] else {
        return Err("expected useName:opcode:shape:args".into());
    };
    if name.is_empty() {
        return Err("empty use-name".into());
    }
    if opcode.is_empty() {
        return Err("empty opcode".into());
    }
    let (shape, return_type) = parse_shape(shape)?;
    let args = if args.is_empty() {
        Vec::new()
    } else {
        args.split(',')
            .map(parse_arg_spec)
            .collect::<Result<Vec<_>, _>>()?
    };
    Ok(Entry::Command(CommandSpec {
        path: name.to_ascii_lowercase(),
        opcode: Some(opcode.to_string()),
        shape,
        args,
        return_type,
        template: None,
    }))
}

fn parse_shape(text: &str) -> Result<(Shape, Option<ReturnType>), String> {
    let (shape, ret) = match text.split_once("->") {
        Some((shape, ret)) => (shape, Some(ret)),
        None => (text, None),
    };
    let shape = match shape {
        "hat" => Shape::Hat,
        "stack" => Shape::Stack,
        "reporter" => Shape::Reporter,
        "cap" => Shape::Cap,
        "c" => Shape::C,
        "extension_stack" => Shape::ExtensionStack,
        "menu_reporter" => Shape::MenuReporter,
        other => return Err(format!("unknown shape '{other}'")),
    };
    let return_type = match ret {
        None => {
            // Reporters without an annotation return a generic expression.
            if shape == Shape::Reporter {
                Some(ReturnType::Exp)
            } else {
                None
            }
        }
        Some("num") => Some(ReturnType::Num),
        Some("exp") => Some(ReturnType::Exp),
        Some("bool") => Some(ReturnType::Bool),
        Some(other) => return Err(format!("unknown return type '{other}'")),
    };
    if return_type.is_some() && !matches!(shape, Shape::Reporter | Shape::MenuReporter) {
        return Err(format!("shape '{text}' cannot carry a return type"));
    }
    Ok((shape, return_type))
}

/// Parse one `section.name[type]{choices}` slot.
pub fn parse_arg_spec(spec: &str) -> Result<ArgSpec, String> {
    let spec = spec.trim();
    let (section, rest) = spec
        .split_once('.')
        .ok_or_else(|| format!("slot '{spec}' is missing its i./f. section"))?;

    let name_end = rest
        .find(['[', '{'])
        .unwrap_or(rest.len());
    let name = &rest[..name_end];
    if name.is_empty() {
        return Err(format!("slot '{spec}' has no name"));
    }

    let bracket = between(rest, '[', ']')?;
    let braces = between(rest, '{', '}')?;

    let kind = match section {
        "i" => {
            let ty = match bracket {
                None => InputType::Exp,
                Some("num") => InputType::Num,
                Some("exp") => InputType::Exp,
                Some("str") => InputType::Str,
                Some("bool") => InputType::Bool,
                Some("substack") => InputType::Substack,
                Some(menu) if menu.starts_with("menu:") => {
                    InputType::Menu(menu["menu:".len()..].to_ascii_lowercase())
                }
                Some(other) => return Err(format!("unknown input type '{other}'")),
            };
            SlotKind::Input(ty)
        }
        "f" => {
            let kind = match bracket {
                Some("var") => FieldKind::Variable,
                Some("list") => FieldKind::List,
                Some("broadcast") => FieldKind::Broadcast,
                Some(other) => return Err(format!("unknown field type '{other}'")),
                None => match braces {
                    None => FieldKind::Choice(None),
                    Some(choices) => {
                        let values: Vec<String> =
                            choices.split(';').map(str::to_string).collect();
                        if values.iter().any(|v| v == "...") {
                            FieldKind::Choice(None)
                        } else {
                            FieldKind::Choice(Some(values))
                        }
                    }
                },
            };
            SlotKind::Field(kind)
        }
        other => return Err(format!("unknown slot section '{other}'")),
    };

    Ok(ArgSpec {
        name: name.to_string(),
        kind,
    })
}

fn between(text: &str, open: char, close: char) -> Result<Option<&str>, String> {
    match text.find(open) {
        None => Ok(None),
        Some(start) => {
            let end = text[start..]
                .find(close)
                .ok_or_else(|| format!("'{open}' without matching '{close}' in '{text}'"))?;
            Ok(Some(&text[start + open.len_utf8()..start + end]))
        }
    }
}

/// All `{name}` placeholders appearing in a macro template.
pub(crate) fn placeholders(template: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        found.push(rest[start + 1..start + len].to_string());
        rest = &rest[start + len + 1..];
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_stack_command() {
        let Entry::Command(spec) = parse_line("motion.move:motion_movesteps:stack:i.steps[num]")
            .unwrap()
        else {
            panic!("expected command entry");
        };
        assert_eq!(spec.path, "motion.move");
        assert_eq!(spec.args.len(), 1);
        assert_eq!(spec.args[0].name, "steps");
        assert_eq!(spec.args[0].kind, SlotKind::Input(InputType::Num));
    }

    #[test]
    fn parses_reporter_with_return_type() {
        let Entry::Command(spec) =
            parse_line("op.gt:operator_gt:reporter->bool:i.operand1[exp],i.operand2[exp]").unwrap()
        else {
            panic!("expected command entry");
        };
        assert_eq!(spec.shape, Shape::Reporter);
        assert_eq!(spec.return_type, Some(ReturnType::Bool));
    }

    #[test]
    fn parses_menu_slot() {
        let arg = parse_arg_spec("i.to[menu:internal.goto_menu]").unwrap();
        assert_eq!(
            arg.kind,
            SlotKind::Input(InputType::Menu("internal.goto_menu".into()))
        );
    }

    #[test]
    fn parses_field_choices_closed_and_open() {
        let closed = parse_arg_spec("f.style{left-right;don't rotate;all around}").unwrap();
        let SlotKind::Field(FieldKind::Choice(Some(values))) = closed.kind else {
            panic!("expected closed choice field");
        };
        assert_eq!(values.len(), 3);

        let open = parse_arg_spec("f.costume{...}").unwrap();
        assert_eq!(open.kind, SlotKind::Field(FieldKind::Choice(None)));
    }

    #[test]
    fn parses_symbol_fields() {
        assert_eq!(
            parse_arg_spec("f.variable[var]").unwrap().kind,
            SlotKind::Field(FieldKind::Variable)
        );
        assert_eq!(
            parse_arg_spec("f.list[list]").unwrap().kind,
            SlotKind::Field(FieldKind::List)
        );
        assert_eq!(
            parse_arg_spec("f.broadcast_option[broadcast]").unwrap().kind,
            SlotKind::Field(FieldKind::Broadcast)
        );
    }

    #[test]
    fn input_without_type_defaults_to_exp() {
        assert_eq!(
            parse_arg_spec("i.value").unwrap().kind,
            SlotKind::Input(InputType::Exp)
        );
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse_line("motion.move:motion_movesteps:stack").is_err());
        assert!(parse_line(":op:stack:").is_err());
        assert!(parse_line("a:op:wiggly:").is_err());
        assert!(parse_arg_spec("steps[num]").is_err());
        assert!(parse_arg_spec("i.steps[wat]").is_err());
    }

    #[test]
    fn alias_lines_parse() {
        let Entry::Alias { name, target } = parse_line("alias:move:motion.move").unwrap() else {
            panic!("expected alias entry");
        };
        assert_eq!(name, "move");
        assert_eq!(target, "motion.move");
    }

    #[test]
    fn placeholder_extraction() {
        assert_eq!(
            placeholders("op.mathop(\"sqrt\", {num})"),
            vec!["num".to_string()]
        );
        assert_eq!(placeholders("a {x} b {y}"), vec!["x".to_string(), "y".to_string()]);
    }
}
