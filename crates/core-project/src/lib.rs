//! Serde model of the target bundle's `project.json`.
//!
//! The wire format is fussy about shapes: inputs are typed tuples like
//! `[1, [4, "10"]]`, fields are `[value, id-or-null]` pairs, and mutation
//! payloads carry JSON-encoded arrays *as strings*. The `Input` and `Field`
//! enums own those encodings so the emitter never hand-builds JSON.

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Top-level project document: stage first in `targets`, then one target per
/// sprite.
#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub targets: Vec<Target>,
    pub monitors: Vec<Monitor>,
    pub extensions: Vec<String>,
    pub meta: Meta,
}

#[derive(Debug, Clone, Serialize)]
pub struct Meta {
    pub semver: String,
    pub vm: String,
    pub agent: String,
    pub platform: Platform,
}

#[derive(Debug, Clone, Serialize)]
pub struct Platform {
    pub name: String,
    pub url: String,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            semver: "3.0.0".into(),
            vm: "5.0.40".into(),
            agent: String::new(),
            platform: Platform {
                name: "Katnip".into(),
                url: "https://scratch.mit.edu/discuss/topic/769174/".into(),
            },
        }
    }
}

/// `[name, "0"]` variable declaration.
pub type VariableDecl = (String, String);
/// `[name, [...]]` list declaration.
pub type ListDecl = (String, Vec<serde_json::Value>);

/// One stage or sprite.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub is_stage: bool,
    pub name: String,
    pub variables: BTreeMap<String, VariableDecl>,
    pub lists: BTreeMap<String, ListDecl>,
    pub broadcasts: BTreeMap<String, String>,
    pub blocks: BTreeMap<String, Block>,
    pub comments: BTreeMap<String, Comment>,
    pub costumes: Vec<Costume>,
    pub sounds: Vec<Sound>,
    pub volume: u32,
    pub layer_order: u32,
    // Stage-only settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tempo: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_transparency: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_to_speech_language: Option<Option<String>>,
    // Sprite-only settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draggable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_style: Option<String>,
}

impl Target {
    /// The project-root target holding all variables, lists and broadcasts.
    pub fn stage() -> Self {
        Self {
            is_stage: true,
            name: "Stage".into(),
            variables: BTreeMap::new(),
            lists: BTreeMap::new(),
            broadcasts: BTreeMap::new(),
            blocks: BTreeMap::new(),
            comments: BTreeMap::new(),
            costumes: Vec::new(),
            sounds: Vec::new(),
            volume: 100,
            layer_order: 0,
            tempo: Some(60),
            video_transparency: Some(50),
            video_state: Some("on".into()),
            text_to_speech_language: Some(None),
            visible: None,
            x: None,
            y: None,
            size: None,
            direction: None,
            draggable: None,
            rotation_style: None,
        }
    }

    /// A sprite target with the default placement.
    pub fn sprite(name: impl Into<String>) -> Self {
        Self {
            is_stage: false,
            name: name.into(),
            variables: BTreeMap::new(),
            lists: BTreeMap::new(),
            broadcasts: BTreeMap::new(),
            blocks: BTreeMap::new(),
            comments: BTreeMap::new(),
            costumes: Vec::new(),
            sounds: Vec::new(),
            volume: 100,
            layer_order: 1,
            tempo: None,
            video_transparency: None,
            video_state: None,
            text_to_speech_language: None,
            visible: Some(true),
            x: Some(0.0),
            y: Some(0.0),
            size: Some(100.0),
            direction: Some(90.0),
            draggable: Some(false),
            rotation_style: Some("all around".into()),
        }
    }
}

/// One node in the block graph.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub opcode: String,
    pub next: Option<String>,
    pub parent: Option<String>,
    pub inputs: BTreeMap<String, Input>,
    pub fields: BTreeMap<String, Field>,
    pub shadow: bool,
    pub top_level: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mutation: Option<Mutation>,
}

impl Block {
    pub fn new(opcode: impl Into<String>) -> Self {
        Self {
            opcode: opcode.into(),
            next: None,
            parent: None,
            inputs: BTreeMap::new(),
            fields: BTreeMap::new(),
            shadow: false,
            top_level: false,
            x: None,
            y: None,
            comment: None,
            mutation: None,
        }
    }
}

/// Typed input tuple. Literal values keep their source spelling; the target
/// environment coerces as needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// `[1, [10, value]]`
    String(String),
    /// `[1, [4, value]]`
    Number(String),
    /// `[1, [11, name, id]]`
    Broadcast { name: String, id: String },
    /// `[3, [12, name, id], [10, ""]]`
    Variable { name: String, id: String },
    /// `[3, [13, name, id], [10, ""]]`
    List { name: String, id: String },
    /// `[3, block_id, [10, ""]]` — reporter in a value slot.
    Reporter(String),
    /// `[2, block_id]` — reporter in a boolean slot.
    BoolReporter(String),
    /// `[2, block_id]`
    Substack(String),
    /// `[1, block_id]` — menu shadow reference.
    Menu(String),
    /// `[1, block_id]` — prototype reference on a `custom_block` slot.
    Prototype(String),
}

// Input kind tags used by the wire format.
const INPUT_SHADOW: u8 = 1;
const INPUT_NO_SHADOW: u8 = 2;
const INPUT_OBSCURED_SHADOW: u8 = 3;
const LITERAL_NUMBER: u8 = 4;
const LITERAL_STRING: u8 = 10;
const LITERAL_BROADCAST: u8 = 11;
const LITERAL_VARIABLE: u8 = 12;
const LITERAL_LIST: u8 = 13;

impl Input {
    fn to_value(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Input::String(value) => json!([INPUT_SHADOW, [LITERAL_STRING, value]]),
            Input::Number(value) => json!([INPUT_SHADOW, [LITERAL_NUMBER, value]]),
            Input::Broadcast { name, id } => {
                json!([INPUT_SHADOW, [LITERAL_BROADCAST, name, id]])
            }
            Input::Variable { name, id } => json!([
                INPUT_OBSCURED_SHADOW,
                [LITERAL_VARIABLE, name, id],
                [LITERAL_STRING, ""]
            ]),
            Input::List { name, id } => json!([
                INPUT_OBSCURED_SHADOW,
                [LITERAL_LIST, name, id],
                [LITERAL_STRING, ""]
            ]),
            Input::Reporter(block) => {
                json!([INPUT_OBSCURED_SHADOW, block, [LITERAL_STRING, ""]])
            }
            Input::BoolReporter(block) => json!([INPUT_NO_SHADOW, block]),
            Input::Substack(block) => json!([INPUT_NO_SHADOW, block]),
            Input::Menu(block) => json!([INPUT_SHADOW, block]),
            Input::Prototype(block) => json!([INPUT_SHADOW, block]),
        }
    }

    /// The nested block id this input references, if any.
    pub fn referenced_block(&self) -> Option<&str> {
        match self {
            Input::Reporter(id)
            | Input::BoolReporter(id)
            | Input::Substack(id)
            | Input::Menu(id)
            | Input::Prototype(id) => Some(id),
            _ => None,
        }
    }
}

impl Serialize for Input {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// `[value, id-or-null]` field pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// Fixed choice or free text: `[value, null]`.
    Plain(String),
    /// Variable/list/broadcast reference: `[name, id]`.
    WithId { name: String, id: String },
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(2))?;
        match self {
            Field::Plain(value) => {
                seq.serialize_element(value)?;
                seq.serialize_element(&Option::<String>::None)?;
            }
            Field::WithId { name, id } => {
                seq.serialize_element(name)?;
                seq.serialize_element(id)?;
            }
        }
        seq.end()
    }
}

/// Procedure signature metadata attached to prototype and call blocks. The
/// `argument*` members are JSON arrays encoded as strings, as the target
/// format demands.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    pub tag_name: String,
    pub children: Vec<serde_json::Value>,
    pub proccode: String,
    pub argumentids: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub argumentnames: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub argumentdefaults: Option<String>,
    pub warp: String,
}

impl Mutation {
    pub fn new(proccode: impl Into<String>, argument_ids: &[String], warp: bool) -> Self {
        Self {
            tag_name: "mutation".into(),
            children: Vec::new(),
            proccode: proccode.into(),
            argumentids: encode_string_array(argument_ids),
            argumentnames: None,
            argumentdefaults: None,
            warp: if warp { "true".into() } else { "false".into() },
        }
    }
}

/// Encode a string slice as the JSON-array-in-a-string shape mutations use.
pub fn encode_string_array(values: &[String]) -> String {
    serde_json::to_string(values).expect("string arrays always encode")
}

/// Workspace comment attached to a block.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub block_id: Option<String>,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub minimized: bool,
    pub text: String,
}

/// Stage watcher for a variable.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    pub id: String,
    pub mode: String,
    pub opcode: String,
    pub params: BTreeMap<String, String>,
    pub sprite_name: Option<String>,
    pub value: serde_json::Value,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub visible: bool,
    pub slider_min: f64,
    pub slider_max: f64,
    pub is_discrete: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Costume {
    pub name: String,
    pub bitmap_resolution: u32,
    pub data_format: String,
    pub asset_id: String,
    pub md5ext: String,
    pub rotation_center_x: f64,
    pub rotation_center_y: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sound {
    pub name: String,
    pub asset_id: String,
    pub md5ext: String,
    pub data_format: String,
    pub format: String,
    pub rate: u32,
    pub sample_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn input_tuple_shapes() {
        assert_eq!(
            serde_json::to_value(Input::Number("10".into())).unwrap(),
            json!([1, [4, "10"]])
        );
        assert_eq!(
            serde_json::to_value(Input::String("hi".into())).unwrap(),
            json!([1, [10, "hi"]])
        );
        assert_eq!(
            serde_json::to_value(Input::Variable {
                name: "score".into(),
                id: "var-1".into()
            })
            .unwrap(),
            json!([3, [12, "score", "var-1"], [10, ""]])
        );
        assert_eq!(
            serde_json::to_value(Input::Broadcast {
                name: "go".into(),
                id: "broadcast-1".into()
            })
            .unwrap(),
            json!([1, [11, "go", "broadcast-1"]])
        );
        assert_eq!(
            serde_json::to_value(Input::Substack("block-4".into())).unwrap(),
            json!([2, "block-4"])
        );
        assert_eq!(
            serde_json::to_value(Input::Reporter("block-7".into())).unwrap(),
            json!([3, "block-7", [10, ""]])
        );
        assert_eq!(
            serde_json::to_value(Input::BoolReporter("block-7".into())).unwrap(),
            json!([2, "block-7"])
        );
    }

    #[test]
    fn field_pair_shapes() {
        assert_eq!(
            serde_json::to_value(Field::Plain("sqrt".into())).unwrap(),
            json!(["sqrt", null])
        );
        assert_eq!(
            serde_json::to_value(Field::WithId {
                name: "x".into(),
                id: "var-2".into()
            })
            .unwrap(),
            json!(["x", "var-2"])
        );
    }

    #[test]
    fn mutation_encodes_arrays_as_strings() {
        let mut mutation = Mutation::new("F %s", &["procArg-1".to_string()], false);
        mutation.argumentnames = Some(encode_string_array(&["n".to_string()]));
        let value = serde_json::to_value(&mutation).unwrap();
        assert_eq!(value["tagName"], "mutation");
        assert_eq!(value["proccode"], "F %s");
        assert_eq!(value["argumentids"], "[\"procArg-1\"]");
        assert_eq!(value["argumentnames"], "[\"n\"]");
        assert_eq!(value["warp"], "false");
    }

    #[test]
    fn stage_serializes_stage_only_fields() {
        let stage = Target::stage();
        let value = serde_json::to_value(&stage).unwrap();
        assert_eq!(value["isStage"], true);
        assert_eq!(value["tempo"], 60);
        assert_eq!(value["textToSpeechLanguage"], serde_json::Value::Null);
        assert!(value.get("visible").is_none());
    }

    #[test]
    fn sprite_serializes_placement_fields() {
        let sprite = Target::sprite("S1");
        let value = serde_json::to_value(&sprite).unwrap();
        assert_eq!(value["rotationStyle"], "all around");
        assert_eq!(value["layerOrder"], 1);
        assert!(value.get("tempo").is_none());
    }

    #[test]
    fn block_omits_optional_fields_when_unset() {
        let block = Block::new("motion_movesteps");
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["parent"], serde_json::Value::Null);
        assert_eq!(value["topLevel"], false);
        assert!(value.get("x").is_none());
        assert!(value.get("mutation").is_none());
    }
}
