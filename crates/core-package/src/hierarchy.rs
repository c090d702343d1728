//! ASCII rendering of the emitted block graph, written beside the bundle for
//! inspection.

use core_project::{Project, Target};
use serde_json::Value;
use std::fmt::Write;

const LAST: &str = "└─";
const MID: &str = "├─";

/// Render every target's block graph as an indented tree.
pub fn render(project: &Project) -> String {
    let mut out = String::new();
    for target in &project.targets {
        let _ = writeln!(out, "{} >", target.name);
        render_target(&mut out, target);
    }
    out
}

fn render_target(out: &mut String, target: &Target) {
    let tops: Vec<&String> = target
        .blocks
        .iter()
        .filter(|(_, b)| b.top_level)
        .map(|(id, _)| id)
        .collect();
    for (index, id) in tops.iter().enumerate() {
        render_chain(out, target, id, "", index + 1 == tops.len());
    }
}

/// Render a block, its inputs/fields/substacks, then follow its `next` chain
/// at the same indent.
fn render_chain(out: &mut String, target: &Target, id: &str, indent: &str, is_last: bool) {
    let Some(block) = target.blocks.get(id) else {
        return;
    };
    let connector = if is_last { LAST } else { MID };
    let _ = writeln!(out, "{indent}{connector} {id}: {}", block.opcode);
    let child_indent = format!("{indent}{}", if is_last { "    " } else { "│   " });

    let inputs: Vec<(&String, Value)> = block
        .inputs
        .iter()
        .filter(|(name, _)| !name.starts_with("SUBSTACK"))
        .map(|(name, input)| (name, serde_json::to_value(input).expect("inputs serialize")))
        .collect();
    let field_count = block.fields.len();

    for (index, (name, value)) in inputs.iter().enumerate() {
        let last_entry = index + 1 == inputs.len() && field_count == 0;
        let sub = if last_entry { LAST } else { MID };
        match &value[1] {
            Value::Array(literal) => {
                let kind = literal_kind(&literal[0]);
                if literal.len() > 2 {
                    let _ = writeln!(
                        out,
                        "{child_indent}{sub} {name} [{kind}] ({}): {}",
                        flat(&literal[1]),
                        flat(&literal[2])
                    );
                } else {
                    let _ = writeln!(
                        out,
                        "{child_indent}{sub} {name} [{kind}]: {}",
                        flat(&literal[1])
                    );
                }
            }
            Value::String(child_id) if target.blocks.contains_key(child_id) => {
                let _ = writeln!(out, "{child_indent}{sub} {name} [Reporter]:");
                let nested = format!("{child_indent}{}", if last_entry { "    " } else { "│   " });
                render_chain(out, target, child_id, &nested, true);
            }
            other => {
                let _ = writeln!(out, "{child_indent}{sub} {name}: {}", flat(other));
            }
        }
    }

    for (index, (name, field)) in block.fields.iter().enumerate() {
        let sub = if index + 1 == field_count { LAST } else { MID };
        let value = serde_json::to_value(field).expect("fields serialize");
        let _ = writeln!(
            out,
            "{child_indent}{sub} {name} ({}): {}",
            flat(&value[0]),
            flat(&value[1])
        );
    }

    for name in ["SUBSTACK", "SUBSTACK2"] {
        if let Some(input) = block.inputs.get(name) {
            let value = serde_json::to_value(input).expect("inputs serialize");
            if let Value::String(child_id) = &value[1] {
                let last = block.next.is_none();
                let sub = if last { LAST } else { MID };
                let _ = writeln!(out, "{child_indent}{sub} {name}:");
                let nested = format!("{child_indent}{}", if last { "    " } else { "│   " });
                render_chain(out, target, child_id, &nested, last);
            }
        }
    }

    if let Some(next) = &block.next {
        render_chain(out, target, next, indent, is_last);
    }
}

fn literal_kind(tag: &Value) -> &'static str {
    match tag.as_u64() {
        Some(4) => "Number",
        Some(5) => "Positive Number",
        Some(6) => "Positive Integer",
        Some(7) => "Integer",
        Some(8) => "Angle",
        Some(9) => "Color",
        Some(10) => "String",
        Some(11) => "Broadcast",
        Some(12) => "Variable",
        Some(13) => "List",
        _ => "Value",
    }
}

fn flat(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_project::{Block, Field, Input, Meta};

    fn project_with_blocks(blocks: Vec<(&str, Block)>) -> Project {
        let mut target = Target::sprite("S1");
        for (id, block) in blocks {
            target.blocks.insert(id.to_string(), block);
        }
        Project {
            targets: vec![Target::stage(), target],
            monitors: Vec::new(),
            extensions: Vec::new(),
            meta: Meta::default(),
        }
    }

    #[test]
    fn renders_chain_with_inputs_and_fields() {
        let mut hat = Block::new("event_whenflagclicked");
        hat.top_level = true;
        hat.next = Some("block-2".into());

        let mut mv = Block::new("motion_movesteps");
        mv.parent = Some("block-1".into());
        mv.inputs
            .insert("STEPS".into(), Input::Number("10".into()));

        let mut set = Block::new("data_setvariableto");
        set.fields.insert(
            "VARIABLE".into(),
            Field::WithId {
                name: "x".into(),
                id: "var-1".into(),
            },
        );
        set.parent = Some("block-2".into());
        let mut mv = mv;
        mv.next = Some("block-3".into());

        let project =
            project_with_blocks(vec![("block-1", hat), ("block-2", mv), ("block-3", set)]);
        let tree = render(&project);
        assert!(tree.contains("S1 >"));
        assert!(tree.contains("block-1: event_whenflagclicked"));
        assert!(tree.contains("STEPS [Number]: 10"));
        assert!(tree.contains("VARIABLE (x): var-1"));
    }

    #[test]
    fn renders_nested_reporter_and_substack() {
        let mut if_block = Block::new("control_if");
        if_block.top_level = true;
        if_block
            .inputs
            .insert("CONDITION".into(), Input::BoolReporter("block-2".into()));
        if_block
            .inputs
            .insert("SUBSTACK".into(), Input::Substack("block-3".into()));

        let mut gt = Block::new("operator_gt");
        gt.parent = Some("block-1".into());
        let mut say = Block::new("looks_say");
        say.parent = Some("block-1".into());

        gt.inputs
            .insert("OPERAND1".into(), Input::Number("1".into()));
        say.inputs
            .insert("MESSAGE".into(), Input::String("hi".into()));

        let project =
            project_with_blocks(vec![("block-1", if_block), ("block-2", gt), ("block-3", say)]);
        let tree = render(&project);
        assert!(tree.contains("CONDITION [Reporter]:"));
        assert!(tree.contains("block-2: operator_gt"));
        assert!(tree.contains("SUBSTACK:"));
        assert!(tree.contains("block-3: looks_say"));
    }
}
