//! Command catalog: the read-only registry mapping dotted command paths
//! (`motion.move`, `control.clone.create`) to command descriptors.
//!
//! The catalog is a nested mapping: leaf entries are descriptors, interior
//! entries are groups addressable by longer paths. It is built once from the
//! embedded catalog file (plus the built-in macro set) and never mutated
//! afterwards; a compilation only ever reads it.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use tracing::debug;

mod format;

pub use format::parse_arg_spec;

/// Block shapes the target format distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Hat,
    Stack,
    Reporter,
    Cap,
    C,
    /// Extension (pen) stack blocks; taller than regular stacks.
    ExtensionStack,
    /// Shadow reporter carrying a single menu field.
    MenuReporter,
}

/// Return type of a reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    Num,
    Exp,
    Bool,
}

/// Input slot types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputType {
    Num,
    Exp,
    Str,
    Bool,
    Substack,
    /// The slot takes a menu shadow synthesised from the referenced
    /// `menu_reporter` command.
    Menu(String),
}

/// What a field slot holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// A fixed choice; `None` means any string is accepted.
    Choice(Option<Vec<String>>),
    /// A variable name, resolved to `[name, id]` at emit time.
    Variable,
    /// A list name, resolved to `[name, id]` at emit time.
    List,
    /// A broadcast name, resolved to `[name, id]` at emit time.
    Broadcast,
}

/// Which section of the block an argument lands in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotKind {
    Input(InputType),
    Field(FieldKind),
    /// Macro parameter; consumed during expansion, never emitted.
    Macro(InputType),
}

/// One slot in a command's argument schema, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: String,
    pub kind: SlotKind,
}

impl ArgSpec {
    pub fn is_substack(&self) -> bool {
        matches!(self.kind, SlotKind::Input(InputType::Substack))
    }
}

/// Immutable descriptor for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Full dotted use-name (lowercased).
    pub path: String,
    /// Target-format opcode; `None` for macros.
    pub opcode: Option<String>,
    pub shape: Shape,
    pub args: Vec<ArgSpec>,
    pub return_type: Option<ReturnType>,
    /// Rewrite template with `{param}` placeholders; present iff this is a
    /// macro.
    pub template: Option<String>,
}

impl CommandSpec {
    pub fn is_macro(&self) -> bool {
        self.template.is_some()
    }

    /// Schema slots excluding substacks (substacks arrive via braces, not the
    /// argument list).
    pub fn call_args(&self) -> impl Iterator<Item = &ArgSpec> {
        self.args.iter().filter(|a| !a.is_substack())
    }

    pub fn substack_slots(&self) -> impl Iterator<Item = &ArgSpec> {
        self.args.iter().filter(|a| a.is_substack())
    }
}

#[derive(Debug)]
enum Node {
    Group(BTreeMap<String, Node>),
    Command(CommandSpec),
}

/// Errors raised while constructing a catalog. All of them are programmer or
/// deployment errors; a running compilation never sees them.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("duplicate use-name '{0}'")]
    DuplicateName(String),
    #[error("duplicate opcode '{0}'")]
    DuplicateOpcode(String),
    #[error("'{0}' is both a command and a group")]
    GroupConflict(String),
    #[error("alias '{name}' targets unknown command '{target}'")]
    UnknownAliasTarget { name: String, target: String },
    #[error("alias chain through '{0}' forms a cycle")]
    AliasCycle(String),
    #[error("alias '{0}' would override a built-in command")]
    AliasOverride(String),
    #[error("menu command '{0}' must carry exactly one field")]
    BadMenu(String),
    #[error("macro '{path}' references undeclared placeholder '{placeholder}'")]
    UndeclaredPlaceholder { path: String, placeholder: String },
}

/// Construction options.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogOptions {
    /// Permit `alias:` lines to shadow built-in command paths.
    pub allow_alias_override: bool,
}

/// The read-only command registry.
#[derive(Debug)]
pub struct Catalog {
    root: BTreeMap<String, Node>,
    aliases: HashMap<String, String>,
    opcodes: HashSet<String>,
    options: CatalogOptions,
}

const BUILTIN_COMMANDS: &str = include_str!("../catalog/commands.kat");

impl Catalog {
    /// The built-in catalog: every shipped command plus the macro set.
    pub fn builtin(options: CatalogOptions) -> Result<Self, CatalogError> {
        let mut catalog = Self::parse(BUILTIN_COMMANDS, options)?;
        catalog.register_builtin_macros()?;
        catalog.check_aliases()?;
        debug!(target: "catalog", commands = catalog.len(), "catalog_loaded");
        Ok(catalog)
    }

    /// Parse a catalog text without the built-in macros. Alias targets are
    /// checked by [`Catalog::check_aliases`], which `builtin` runs after the
    /// macros are in place.
    pub fn parse(text: &str, options: CatalogOptions) -> Result<Self, CatalogError> {
        let mut catalog = Self {
            root: BTreeMap::new(),
            aliases: HashMap::new(),
            opcodes: HashSet::new(),
            options,
        };
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match format::parse_line(line).map_err(|reason| CatalogError::Malformed {
                line: idx + 1,
                reason,
            })? {
                format::Entry::Command(spec) => catalog.insert(spec)?,
                format::Entry::Alias { name, target } => {
                    if catalog.aliases.insert(name.clone(), target).is_some() {
                        return Err(CatalogError::DuplicateName(name));
                    }
                }
            }
        }
        Ok(catalog)
    }

    /// Number of commands (leaves) in the catalog.
    pub fn len(&self) -> usize {
        fn count(nodes: &BTreeMap<String, Node>) -> usize {
            nodes
                .values()
                .map(|n| match n {
                    Node::Group(g) => count(g),
                    Node::Command(_) => 1,
                })
                .sum()
        }
        count(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Follow the alias map (chains included) to the final dotted path.
    pub fn resolve_alias<'a>(&'a self, path: &'a str) -> &'a str {
        let mut current = path;
        let mut hops = 0;
        while let Some(next) = self.aliases.get(current) {
            current = next;
            hops += 1;
            // Cycles are rejected at construction; this guard is for
            // hand-built catalogs that skipped check_aliases.
            if hops > self.aliases.len() {
                return path;
            }
        }
        current
    }

    /// Look up a descriptor by dotted path. Aliases resolve first; lookup is
    /// case-insensitive on the path.
    pub fn lookup(&self, path: &str) -> Option<&CommandSpec> {
        let lowered = path.to_ascii_lowercase();
        let resolved = self.resolve_alias(&lowered);
        let mut nodes = &self.root;
        let mut segments = resolved.split('.').peekable();
        while let Some(segment) = segments.next() {
            match nodes.get(segment)? {
                Node::Group(children) => nodes = children,
                Node::Command(spec) => {
                    return if segments.peek().is_none() {
                        Some(spec)
                    } else {
                        None
                    };
                }
            }
        }
        None
    }

    /// Register a macro command. Placeholders in `template` must all be
    /// declared parameter names.
    pub fn register_macro(
        &mut self,
        path: &str,
        params: &[(&str, InputType)],
        template: &str,
        return_type: ReturnType,
    ) -> Result<(), CatalogError> {
        for placeholder in format::placeholders(template) {
            if !params.iter().any(|(name, _)| *name == placeholder) {
                return Err(CatalogError::UndeclaredPlaceholder {
                    path: path.to_string(),
                    placeholder,
                });
            }
        }
        let spec = CommandSpec {
            path: path.to_ascii_lowercase(),
            opcode: None,
            shape: Shape::Reporter,
            args: params
                .iter()
                .map(|(name, ty)| ArgSpec {
                    name: (*name).to_string(),
                    kind: SlotKind::Macro(ty.clone()),
                })
                .collect(),
            return_type: Some(return_type),
            template: Some(template.to_string()),
        };
        self.insert(spec)
    }

    fn insert(&mut self, spec: CommandSpec) -> Result<(), CatalogError> {
        if spec.shape == Shape::MenuReporter {
            let fields: Vec<_> = spec
                .args
                .iter()
                .filter(|a| matches!(a.kind, SlotKind::Field(_)))
                .collect();
            if fields.len() != 1 || spec.args.len() != 1 {
                return Err(CatalogError::BadMenu(spec.path));
            }
        }
        if let Some(opcode) = &spec.opcode {
            if !self.opcodes.insert(opcode.clone()) {
                return Err(CatalogError::DuplicateOpcode(opcode.clone()));
            }
        }

        let path = spec.path.clone();
        let mut segments: Vec<&str> = path.split('.').collect();
        let leaf = segments.pop().expect("dotted path has at least one segment");
        let mut nodes = &mut self.root;
        let mut walked = String::new();
        for segment in segments {
            if !walked.is_empty() {
                walked.push('.');
            }
            walked.push_str(segment);
            let entry = nodes
                .entry(segment.to_string())
                .or_insert_with(|| Node::Group(BTreeMap::new()));
            match entry {
                Node::Group(children) => nodes = children,
                Node::Command(_) => return Err(CatalogError::GroupConflict(walked)),
            }
        }
        match nodes.get(leaf) {
            Some(Node::Command(_)) => return Err(CatalogError::DuplicateName(path)),
            Some(Node::Group(_)) => return Err(CatalogError::GroupConflict(path)),
            None => {
                nodes.insert(leaf.to_string(), Node::Command(spec));
            }
        }
        Ok(())
    }

    /// Validate the alias table: targets must exist, chains must terminate,
    /// and alias names must not shadow built-ins unless the override option
    /// was set.
    pub fn check_aliases(&self) -> Result<(), CatalogError> {
        for name in self.aliases.keys() {
            if !self.options.allow_alias_override && self.path_exists(name) {
                return Err(CatalogError::AliasOverride(name.clone()));
            }
            let mut visited = HashSet::new();
            let mut current = name.as_str();
            while let Some(next) = self.aliases.get(current) {
                if !visited.insert(current) {
                    return Err(CatalogError::AliasCycle(name.clone()));
                }
                current = next;
            }
            if !self.path_exists(current) {
                return Err(CatalogError::UnknownAliasTarget {
                    name: name.clone(),
                    target: current.to_string(),
                });
            }
        }
        Ok(())
    }

    fn path_exists(&self, path: &str) -> bool {
        let mut nodes = &self.root;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            match nodes.get(segment) {
                Some(Node::Group(children)) => nodes = children,
                Some(Node::Command(_)) => return segments.peek().is_none(),
                None => return false,
            }
        }
        false
    }

    fn register_builtin_macros(&mut self) -> Result<(), CatalogError> {
        for op in [
            "abs", "floor", "ceiling", "sqrt", "sin", "cos", "tan", "asin", "acos", "atan", "ln",
            "log",
        ] {
            self.register_macro(
                &format!("op.{op}"),
                &[("num", InputType::Exp)],
                &format!("op.mathop(\"{op}\", {{num}})"),
                ReturnType::Num,
            )?;
        }
        // Powers via exp/ln; the target has no native power operator.
        self.register_macro(
            "op.pow",
            &[("base", InputType::Exp), ("exponent", InputType::Exp)],
            "op.mathop(\"e ^\", op.multiply({exponent}, op.mathop(\"ln\", {base})))",
            ReturnType::Num,
        )?;
        // Negated comparisons compose from the native three.
        self.register_macro(
            "op.lte",
            &[("operand1", InputType::Exp), ("operand2", InputType::Exp)],
            "op.not(op.gt({operand1}, {operand2}))",
            ReturnType::Bool,
        )?;
        self.register_macro(
            "op.gte",
            &[("operand1", InputType::Exp), ("operand2", InputType::Exp)],
            "op.not(op.lt({operand1}, {operand2}))",
            ReturnType::Bool,
        )?;
        self.register_macro(
            "op.nequals",
            &[("operand1", InputType::Exp), ("operand2", InputType::Exp)],
            "op.not(op.equals({operand1}, {operand2}))",
            ReturnType::Bool,
        )?;
        Ok(())
    }
}
