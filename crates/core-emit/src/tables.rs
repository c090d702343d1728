//! Project-scoped symbol tables and deterministic id allocation.

use core_parser::ProcParamType;
use core_project::Monitor;
use std::collections::BTreeMap;
use std::collections::HashMap;

/// Per-kind monotonic counters producing `<kind>-<n>` ids, `n` starting at 1.
#[derive(Debug, Default)]
pub struct IdAllocator {
    counters: HashMap<&'static str, usize>,
}

impl IdAllocator {
    pub fn next(&mut self, kind: &'static str) -> String {
        let counter = self.counters.entry(kind).or_insert(0);
        *counter += 1;
        format!("{kind}-{counter}")
    }
}

/// An argument value captured at a call site, resolved far enough that a
/// later fixup only has to choose the input shape.
#[derive(Debug, Clone)]
pub enum PreArg {
    Number(String),
    Str(String),
    Variable { name: String, id: String },
    List { name: String, id: String },
    /// An already-emitted reporter or argument-reporter block.
    Block(String),
}

/// A call site waiting for its procedure's definition.
#[derive(Debug)]
pub struct CallFixup {
    /// Index of the sprite whose arena holds the call block.
    pub sprite: usize,
    /// String id of the call block.
    pub call_sid: String,
    /// Call arguments by name.
    pub args: Vec<(String, PreArg)>,
    /// Source line of the call, for late diagnostics.
    pub line: usize,
}

/// Everything known about a user procedure.
#[derive(Debug)]
pub struct Procedure {
    pub defined: bool,
    pub proccode: String,
    pub arg_ids: Vec<String>,
    pub arg_names: Vec<String>,
    pub arg_types: Vec<ProcParamType>,
    pub arg_defaults: Vec<String>,
    pub warp: bool,
    pub pending_calls: Vec<CallFixup>,
}

/// Symbol tables for one compilation. Variables, lists and broadcasts are
/// project-global (they live on the stage target); registration order is
/// preserved for monitors.
#[derive(Debug, Default)]
pub struct SymbolTables {
    pub ids: IdAllocator,
    variables: HashMap<String, String>,
    lists: HashMap<String, String>,
    broadcasts: HashMap<String, String>,
    pub procedures: HashMap<String, Procedure>,
    pub monitors: Vec<Monitor>,
}

impl SymbolTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of a variable, creating it (and its hidden monitor) on first use.
    pub fn variable(&mut self, name: &str) -> String {
        if let Some(id) = self.variables.get(name) {
            return id.clone();
        }
        let id = self.ids.next("var");
        self.variables.insert(name.to_string(), id.clone());
        let mut params = BTreeMap::new();
        params.insert("VARIABLE".to_string(), name.to_string());
        self.monitors.push(Monitor {
            id: id.clone(),
            mode: "default".into(),
            opcode: "data_variable".into(),
            params,
            sprite_name: None,
            value: serde_json::Value::from(0),
            x: 5.0,
            y: 5.0 + self.monitors.len() as f64 * 27.0,
            width: 0.0,
            height: 0.0,
            visible: false,
            slider_min: 0.0,
            slider_max: 100.0,
            is_discrete: true,
        });
        id
    }

    pub fn list(&mut self, name: &str) -> String {
        if let Some(id) = self.lists.get(name) {
            return id.clone();
        }
        let id = self.ids.next("list");
        self.lists.insert(name.to_string(), id.clone());
        id
    }

    pub fn broadcast(&mut self, name: &str) -> String {
        if let Some(id) = self.broadcasts.get(name) {
            return id.clone();
        }
        let id = self.ids.next("broadcast");
        self.broadcasts.insert(name.to_string(), id.clone());
        id
    }

    /// Final stage maps, keyed by id.
    pub fn variable_decls(&self) -> BTreeMap<String, (String, String)> {
        self.variables
            .iter()
            .map(|(name, id)| (id.clone(), (name.clone(), "0".to_string())))
            .collect()
    }

    pub fn list_decls(&self) -> BTreeMap<String, (String, Vec<serde_json::Value>)> {
        self.lists
            .iter()
            .map(|(name, id)| (id.clone(), (name.clone(), Vec::new())))
            .collect()
    }

    pub fn broadcast_decls(&self) -> BTreeMap<String, String> {
        self.broadcasts
            .iter()
            .map(|(name, id)| (id.clone(), name.clone()))
            .collect()
    }
}

/// Build a proccode string (`Name %s %b`) from declared parameter types.
pub fn proccode(name: &str, types: &[ProcParamType]) -> String {
    let mut code = name.to_string();
    for ty in types {
        match ty {
            ProcParamType::Exp => code.push_str(" %s"),
            ProcParamType::Bool => code.push_str(" %b"),
        }
    }
    code
}

/// Default shadow value for a parameter type.
pub fn param_default(ty: ProcParamType) -> String {
    match ty {
        ProcParamType::Exp => String::new(),
        ProcParamType::Bool => "false".to_string(),
    }
}
