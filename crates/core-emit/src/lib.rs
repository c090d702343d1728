//! AST-to-block emission.
//!
//! Walks parsed stacks and materialises the target block graph: allocates
//! `<kind>-<counter>` ids, wires parent/next/input links, synthesises menu
//! shadows and argument literal tuples, builds procedure prototypes and
//! mutations, resolves forward procedure calls at definition time, and
//! computes block positions and comment anchors.

use core_catalog::{ArgSpec, Catalog, FieldKind, InputType, Shape, SlotKind};
use core_parser::{
    AstArg, AstBlock, AstKind, CommandNode, ProcCallNode, ProcDefNode, ProcParamType,
};
use core_project::{Block, Comment, Field, Input, Monitor, Mutation, encode_string_array};
use core_report::{ErrorKind, Reporter};
use std::collections::BTreeMap;
use tracing::{debug, trace};

mod arena;
mod layout;
mod tables;

pub use arena::{BlockArena, BlockId};
pub use layout::LayoutSettings;
pub use tables::{CallFixup, IdAllocator, PreArg, Procedure, SymbolTables, proccode};

use layout::{
    C_COMMENT_NUDGE, C_END_HEIGHT, COMMENT_ANCHOR_BIAS, StatementLayout, block_height,
    label_growth,
};

/// Emitted blocks and comments for one sprite.
#[derive(Debug)]
pub struct SpriteOutput {
    pub name: String,
    pub blocks: BTreeMap<String, Block>,
    pub comments: BTreeMap<String, Comment>,
}

/// Everything the packager needs from the emit phase.
#[derive(Debug)]
pub struct EmitOutput {
    pub sprites: Vec<SpriteOutput>,
    pub variables: BTreeMap<String, (String, String)>,
    pub lists: BTreeMap<String, (String, Vec<serde_json::Value>)>,
    pub broadcasts: BTreeMap<String, String>,
    pub monitors: Vec<Monitor>,
    /// True when any pen opcode was emitted; drives the extensions list.
    pub pen_used: bool,
}

struct SpriteState {
    name: String,
    arena: BlockArena,
    comments: BTreeMap<String, Comment>,
}

/// Per-stack emission state: position, accumulated height and the procedure
/// whose body is being walked (for `a.name` references).
struct StackCtx {
    sprite: usize,
    stack_x: f64,
    stack_height: f64,
    stack_width: f64,
    cur_proc: Option<String>,
    line: usize,
}

pub struct Emitter<'a> {
    catalog: &'a Catalog,
    reporter: &'a mut Reporter,
    settings: LayoutSettings,
    tables: SymbolTables,
    sprites: Vec<SpriteState>,
    stacks_emitted: usize,
    pen_used: bool,
}

impl<'a> Emitter<'a> {
    pub fn new(catalog: &'a Catalog, reporter: &'a mut Reporter, settings: LayoutSettings) -> Self {
        Self {
            catalog,
            reporter,
            settings,
            tables: SymbolTables::new(),
            sprites: Vec::new(),
            stacks_emitted: 0,
            pen_used: false,
        }
    }

    fn error(&mut self, kind: ErrorKind, message: impl Into<String>, fragment: impl Into<String>, line: Option<usize>) {
        self.reporter.report(kind, message, fragment, line);
    }

    /// Emit every stack of one sprite's script. Stacks tile horizontally in
    /// source order, continuing the column count across sprites.
    pub fn emit_sprite(&mut self, name: &str, stacks: &[Vec<AstBlock>]) {
        let sprite = self.sprites.len();
        self.sprites.push(SpriteState {
            name: name.to_string(),
            arena: BlockArena::new(),
            comments: BTreeMap::new(),
        });
        debug!(target: "emit", sprite = name, stacks = stacks.len(), "emit_sprite");

        for stack in stacks {
            let mut ctx = StackCtx {
                sprite,
                stack_x: self.stacks_emitted as f64 * self.settings.stack_spacing,
                stack_height: 0.0,
                stack_width: 300.0,
                cur_proc: None,
                line: 0,
            };
            let mut prev: Option<BlockId> = None;
            for (index, node) in stack.iter().enumerate() {
                if let Some(id) = self.emit_statement(node, &mut ctx, index == 0, 0) {
                    if let Some(prev) = prev {
                        self.sprites[sprite].arena.link_next(prev, id);
                    }
                    prev = Some(id);
                }
            }
            self.stacks_emitted += 1;
        }
    }

    /// Close out the project: any procedure still undefined is an error.
    pub fn finish(mut self) -> EmitOutput {
        let mut undefined: Vec<String> = self
            .tables
            .procedures
            .iter()
            .filter(|(_, proc)| !proc.defined)
            .map(|(name, _)| name.clone())
            .collect();
        undefined.sort();
        for name in undefined {
            self.reporter.report(
                ErrorKind::UndefinedProcedure,
                format!("procedure '{name}' was called but never defined"),
                name,
                None,
            );
        }

        EmitOutput {
            sprites: self
                .sprites
                .into_iter()
                .map(|s| SpriteOutput {
                    name: s.name,
                    blocks: s.arena.into_map(),
                    comments: s.comments,
                })
                .collect(),
            variables: self.tables.variable_decls(),
            lists: self.tables.list_decls(),
            broadcasts: self.tables.broadcast_decls(),
            monitors: std::mem::take(&mut self.tables.monitors),
            pen_used: self.pen_used,
        }
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn emit_statement(
        &mut self,
        node: &AstBlock,
        ctx: &mut StackCtx,
        top_level: bool,
        depth: usize,
    ) -> Option<BlockId> {
        ctx.line = node.line;
        match &node.kind {
            AstKind::Command(cmd) => self.emit_command(cmd, ctx, top_level, depth),
            AstKind::ProcDef(def) => {
                if !top_level || depth > 0 {
                    self.error(
                        ErrorKind::InvalidProcedureHeader,
                        format!("procedure '{}' must be defined at top level", def.name),
                        def.name.clone(),
                        Some(node.line),
                    );
                    return None;
                }
                self.emit_proc_def(def, ctx)
            }
            AstKind::ProcCall(call) => self.emit_proc_call(call, ctx, top_level),
        }
    }

    fn emit_command(
        &mut self,
        cmd: &CommandNode,
        ctx: &mut StackCtx,
        top_level: bool,
        depth: usize,
    ) -> Option<BlockId> {
        let Some(spec) = self.catalog.lookup(&cmd.path).cloned() else {
            self.error(
                ErrorKind::UnknownCommand,
                format!("invalid command '{}'", cmd.path),
                cmd.path.clone(),
                Some(ctx.line),
            );
            return None;
        };
        let Some(opcode) = spec.opcode.clone() else {
            // Macros are rewritten before emission; reaching one here means
            // the expansion failed upstream.
            self.error(
                ErrorKind::MacroExpansion,
                format!("macro '{}' reached the emitter unexpanded", cmd.path),
                cmd.path.clone(),
                Some(ctx.line),
            );
            return None;
        };
        if opcode.starts_with("pen_") {
            self.pen_used = true;
        }
        trace!(target: "emit", line = ctx.line, opcode = opcode.as_str(), "block");

        ctx.stack_width = 300.0 + depth as f64 * 20.0;
        let mut stmt_layout = StatementLayout::new(spec.shape);
        ctx.stack_height += block_height(spec.shape) / 2.0;
        let before_args = ctx.stack_height;

        let sid = self.tables.ids.next("block");
        let mut block = Block::new(opcode);
        block.top_level = top_level;
        if spec.shape == Shape::Hat {
            block.x = Some(ctx.stack_x);
            block.y = Some(0.0);
        }
        let id = self.sprites[ctx.sprite].arena.alloc(sid, block);

        let schema: Vec<ArgSpec> = spec.call_args().cloned().collect();
        for ((_, arg), slot) in cmd.args.iter().zip(schema.iter()) {
            self.emit_slot(id, slot, arg, ctx, &mut stmt_layout, 1);
        }

        // The comment anchors at the block's vertical midpoint, adjusted for
        // argument growth but independent of any substack height.
        let mut comment_height = before_args + stmt_layout.comment_height_adjust();
        ctx.stack_height += block_height(spec.shape) / 2.0;
        let comment_width_x = ctx.stack_width;

        if !cmd.substacks.is_empty() {
            comment_height -= C_COMMENT_NUDGE;
            for (index, substack) in cmd.substacks.iter().enumerate() {
                if index > 0 {
                    ctx.stack_height += C_END_HEIGHT;
                }
                if let Some(top) = self.emit_stack_chain(substack, ctx, depth + 1) {
                    self.sprites[ctx.sprite].arena.set_parent(top, id);
                    let top_sid = self.sprites[ctx.sprite].arena.sid(top).to_string();
                    let slot = if index == 0 { "SUBSTACK" } else { "SUBSTACK2" };
                    self.sprites[ctx.sprite]
                        .arena
                        .get_mut(id)
                        .inputs
                        .insert(slot.to_string(), Input::Substack(top_sid));
                }
            }
            ctx.stack_height += C_END_HEIGHT;
        }

        if let Some(text) = &cmd.comment {
            self.attach_comment(ctx, id, text, comment_height, comment_width_x);
        }
        Some(id)
    }

    /// Emit a chained statement list (a substack or procedure body) and
    /// return its first block.
    fn emit_stack_chain(
        &mut self,
        blocks: &[AstBlock],
        ctx: &mut StackCtx,
        depth: usize,
    ) -> Option<BlockId> {
        let mut first = None;
        let mut prev: Option<BlockId> = None;
        for node in blocks {
            if let Some(id) = self.emit_statement(node, ctx, false, depth) {
                if let Some(prev) = prev {
                    self.sprites[ctx.sprite].arena.link_next(prev, id);
                }
                first.get_or_insert(id);
                prev = Some(id);
            }
        }
        first
    }

    fn attach_comment(
        &mut self,
        ctx: &mut StackCtx,
        block: BlockId,
        text: &str,
        height: f64,
        width_x: f64,
    ) {
        let comment_id = self.tables.ids.next("comment");
        let block_sid = self.sprites[ctx.sprite].arena.sid(block).to_string();
        self.sprites[ctx.sprite].comments.insert(
            comment_id.clone(),
            Comment {
                block_id: Some(block_sid),
                x: ctx.stack_x + width_x + self.settings.comment_offset,
                y: height - COMMENT_ANCHOR_BIAS,
                width: 200.0,
                height: 200.0,
                minimized: true,
                text: text.to_string(),
            },
        );
        self.sprites[ctx.sprite].arena.get_mut(block).comment = Some(comment_id);
    }

    // -----------------------------------------------------------------
    // Arguments
    // -----------------------------------------------------------------

    fn emit_slot(
        &mut self,
        parent: BlockId,
        slot: &ArgSpec,
        arg: &AstArg,
        ctx: &mut StackCtx,
        layout: &mut StatementLayout,
        nesting: usize,
    ) {
        match &slot.kind {
            SlotKind::Input(ty) => {
                if let Some(input) = self.make_input(parent, ty, slot, arg, ctx, layout, nesting) {
                    let key = slot.name.to_uppercase();
                    self.sprites[ctx.sprite]
                        .arena
                        .get_mut(parent)
                        .inputs
                        .insert(key, input);
                }
            }
            SlotKind::Field(kind) => {
                if let Some(field) = self.make_field(kind, arg, ctx) {
                    let key = slot.name.to_uppercase();
                    self.sprites[ctx.sprite]
                        .arena
                        .get_mut(parent)
                        .fields
                        .insert(key, field);
                }
            }
            SlotKind::Macro(_) => unreachable!("macro slots never reach emission"),
        }
    }

    fn make_input(
        &mut self,
        parent: BlockId,
        ty: &InputType,
        slot: &ArgSpec,
        arg: &AstArg,
        ctx: &mut StackCtx,
        layout: &mut StatementLayout,
        nesting: usize,
    ) -> Option<Input> {
        let boolean_slot = matches!(ty, InputType::Bool);
        match arg {
            AstArg::Number(text) => {
                ctx.stack_width += label_growth(text, 0.0);
                if slot.name.contains("broadcast") {
                    let id = self.tables.broadcast(text);
                    Some(Input::Broadcast {
                        name: text.clone(),
                        id,
                    })
                } else {
                    Some(Input::Number(text.clone()))
                }
            }
            AstArg::Str(text) => {
                if let InputType::Menu(menu_ref) = ty {
                    return self.make_menu_input(parent, menu_ref, text, ctx);
                }
                ctx.stack_width += label_growth(text, 0.0);
                if slot.name.contains("broadcast") {
                    let id = self.tables.broadcast(text);
                    Some(Input::Broadcast {
                        name: text.clone(),
                        id,
                    })
                } else {
                    Some(Input::String(text.clone()))
                }
            }
            AstArg::Variable(name) => {
                ctx.stack_width += label_growth(name, 10.0);
                // Depth 1 is the block's own slot row; only deeper nesting
                // expands the block vertically.
                ctx.stack_height += layout.visit_depth(nesting - 1);
                let id = self.tables.variable(name);
                Some(Input::Variable {
                    name: name.clone(),
                    id,
                })
            }
            AstArg::List(name) => {
                ctx.stack_width += label_growth(name, 10.0);
                let id = self.tables.list(name);
                Some(Input::List {
                    name: name.clone(),
                    id,
                })
            }
            AstArg::FuncArg(name) => {
                ctx.stack_width += label_growth(name, 10.0);
                let reporter = self.emit_funcarg_block(parent, name, ctx)?;
                Some(if boolean_slot {
                    Input::BoolReporter(reporter)
                } else {
                    Input::Reporter(reporter)
                })
            }
            AstArg::Reporter(nested) => {
                ctx.stack_width += 100.0;
                ctx.stack_height += layout.visit_depth(nesting - 1);
                let reporter = self.emit_reporter(nested, parent, ctx, layout, nesting + 1)?;
                Some(if boolean_slot {
                    Input::BoolReporter(reporter)
                } else {
                    Input::Reporter(reporter)
                })
            }
            AstArg::Dict(name) => {
                self.error(
                    ErrorKind::ArgKindMismatch,
                    "no command accepts a dictionary argument",
                    format!("@d:{name}"),
                    Some(ctx.line),
                );
                None
            }
        }
    }

    /// Synthesize the menu shadow block a `menu:<ref>` slot demands and
    /// return the input referencing it.
    fn make_menu_input(
        &mut self,
        parent: BlockId,
        menu_ref: &str,
        choice: &str,
        ctx: &mut StackCtx,
    ) -> Option<Input> {
        let Some(menu_spec) = self.catalog.lookup(menu_ref).cloned() else {
            self.error(
                ErrorKind::UnknownCommand,
                format!("menu '{menu_ref}' is not in the catalog"),
                menu_ref,
                Some(ctx.line),
            );
            return None;
        };
        let field = &menu_spec.args[0];
        if let SlotKind::Field(FieldKind::Choice(Some(options))) = &field.kind {
            if !options.iter().any(|o| o == choice) {
                self.error(
                    ErrorKind::InvalidFieldChoice,
                    format!("'{choice}' is not a valid choice for menu '{menu_ref}'"),
                    choice,
                    Some(ctx.line),
                );
                return None;
            }
        }
        let opcode = menu_spec
            .opcode
            .clone()
            .expect("menu reporters always carry an opcode");
        // Pen menus keep their field name casing; every other menu field is
        // upper-cased like ordinary slots.
        let key = if opcode.starts_with("pen_") {
            field.name.clone()
        } else {
            field.name.to_uppercase()
        };

        let sid = self.tables.ids.next("block");
        let mut block = Block::new(opcode);
        block.shadow = true;
        block.fields.insert(key, Field::Plain(choice.to_string()));
        let id = self.sprites[ctx.sprite].arena.alloc(sid, block);
        self.sprites[ctx.sprite].arena.set_parent(id, parent);
        let menu_sid = self.sprites[ctx.sprite].arena.sid(id).to_string();
        Some(Input::Menu(menu_sid))
    }

    fn make_field(&mut self, kind: &FieldKind, arg: &AstArg, ctx: &mut StackCtx) -> Option<Field> {
        match kind {
            FieldKind::Choice(_) => match arg {
                AstArg::Str(text) | AstArg::Number(text) => Some(Field::Plain(text.clone())),
                other => {
                    self.error(
                        ErrorKind::ArgKindMismatch,
                        "field slots take fixed values",
                        format!("{other:?}"),
                        Some(ctx.line),
                    );
                    None
                }
            },
            FieldKind::Variable => {
                let name = symbol_name(arg)?;
                let id = self.tables.variable(name);
                Some(Field::WithId {
                    name: name.to_string(),
                    id,
                })
            }
            FieldKind::List => {
                let name = symbol_name(arg)?;
                let id = self.tables.list(name);
                Some(Field::WithId {
                    name: name.to_string(),
                    id,
                })
            }
            FieldKind::Broadcast => {
                let name = symbol_name(arg)?;
                let id = self.tables.broadcast(name);
                Some(Field::WithId {
                    name: name.to_string(),
                    id,
                })
            }
        }
    }

    /// Emit a nested reporter block; it hangs off `parent` through an input
    /// and is never chained via `next`.
    fn emit_reporter(
        &mut self,
        node: &AstBlock,
        parent: BlockId,
        ctx: &mut StackCtx,
        layout: &mut StatementLayout,
        nesting: usize,
    ) -> Option<String> {
        let AstKind::Command(cmd) = &node.kind else {
            self.error(
                ErrorKind::ArgKindMismatch,
                "only reporters can nest in arguments",
                "",
                Some(node.line),
            );
            return None;
        };
        let Some(spec) = self.catalog.lookup(&cmd.path).cloned() else {
            self.error(
                ErrorKind::UnknownCommand,
                format!("invalid command '{}'", cmd.path),
                cmd.path.clone(),
                Some(node.line),
            );
            return None;
        };
        let Some(opcode) = spec.opcode.clone() else {
            self.error(
                ErrorKind::MacroExpansion,
                format!("macro '{}' reached the emitter unexpanded", cmd.path),
                cmd.path.clone(),
                Some(node.line),
            );
            return None;
        };
        if opcode.starts_with("pen_") {
            self.pen_used = true;
        }

        let sid = self.tables.ids.next("block");
        let mut block = Block::new(opcode);
        block.shadow = spec.shape == Shape::MenuReporter;
        let id = self.sprites[ctx.sprite].arena.alloc(sid, block);
        self.sprites[ctx.sprite].arena.set_parent(id, parent);

        let schema: Vec<ArgSpec> = spec.call_args().cloned().collect();
        for ((_, arg), slot) in cmd.args.iter().zip(schema.iter()) {
            self.emit_slot(id, slot, arg, ctx, layout, nesting);
        }
        Some(self.sprites[ctx.sprite].arena.sid(id).to_string())
    }

    /// Emit an `argument_reporter_*` block for an `a.name` reference inside
    /// the current procedure's body.
    fn emit_funcarg_block(
        &mut self,
        parent: BlockId,
        name: &str,
        ctx: &mut StackCtx,
    ) -> Option<String> {
        let Some(proc_name) = ctx.cur_proc.clone() else {
            self.error(
                ErrorKind::ArgKindMismatch,
                format!("argument 'a.{name}' used outside a procedure body"),
                format!("a.{name}"),
                Some(ctx.line),
            );
            return None;
        };
        let ty = self
            .tables
            .procedures
            .get(&proc_name)
            .and_then(|proc| {
                proc.arg_names
                    .iter()
                    .position(|n| n == name)
                    .map(|idx| proc.arg_types[idx])
            });
        let Some(ty) = ty else {
            self.error(
                ErrorKind::ArgKindMismatch,
                format!("argument '{name}' does not exist in procedure '{proc_name}'"),
                format!("a.{name}"),
                Some(ctx.line),
            );
            return None;
        };

        let opcode = match ty {
            ProcParamType::Exp => "argument_reporter_string_number",
            ProcParamType::Bool => "argument_reporter_boolean",
        };
        let sid = self.tables.ids.next("block");
        let mut block = Block::new(opcode);
        block
            .fields
            .insert("VALUE".to_string(), Field::Plain(name.to_string()));
        let id = self.sprites[ctx.sprite].arena.alloc(sid, block);
        self.sprites[ctx.sprite].arena.set_parent(id, parent);
        Some(self.sprites[ctx.sprite].arena.sid(id).to_string())
    }

    // -----------------------------------------------------------------
    // Procedures
    // -----------------------------------------------------------------

    fn emit_proc_def(&mut self, def: &ProcDefNode, ctx: &mut StackCtx) -> Option<BlockId> {
        let types: Vec<ProcParamType> = def.params.iter().map(|p| p.ty).collect();
        let names: Vec<String> = def.params.iter().map(|p| p.name.clone()).collect();
        let defaults: Vec<String> = types.iter().map(|ty| tables::param_default(*ty)).collect();
        let code = proccode(&def.name, &types);

        // Register or correct the procedure record, collecting any calls that
        // were waiting on this definition.
        if self
            .tables
            .procedures
            .get(&def.name)
            .is_some_and(|proc| proc.defined)
        {
            let line = ctx.line;
            self.error(
                ErrorKind::InvalidProcedureHeader,
                format!("procedure '{}' is defined twice", def.name),
                def.name.clone(),
                Some(line),
            );
            return None;
        }
        let reuse_ids = self
            .tables
            .procedures
            .get(&def.name)
            .is_some_and(|proc| proc.arg_ids.len() == names.len());
        let fresh_ids: Vec<String> = if reuse_ids {
            Vec::new()
        } else {
            (0..names.len())
                .map(|_| self.tables.ids.next("procArg"))
                .collect()
        };
        let pending = {
            let proc = self
                .tables
                .procedures
                .entry(def.name.clone())
                .or_insert_with(|| Procedure {
                    defined: false,
                    proccode: String::new(),
                    arg_ids: Vec::new(),
                    arg_names: Vec::new(),
                    arg_types: Vec::new(),
                    arg_defaults: Vec::new(),
                    warp: false,
                    pending_calls: Vec::new(),
                });
            if !reuse_ids {
                proc.arg_ids = fresh_ids;
            }
            proc.defined = true;
            proc.proccode = code.clone();
            proc.arg_names = names.clone();
            proc.arg_types = types.clone();
            proc.arg_defaults = defaults.clone();
            proc.warp = def.warp;
            std::mem::take(&mut proc.pending_calls)
        };

        let arg_ids = self.tables.procedures[&def.name].arg_ids.clone();
        debug!(target: "emit", name = def.name.as_str(), proccode = code.as_str(), pending = pending.len(), "proc_defined");

        // Definition hat, prototype shadow and one argument reporter per
        // parameter.
        ctx.stack_height += block_height(Shape::Hat) / 2.0;
        let def_sid = self.tables.ids.next("block");
        let mut def_block = Block::new("procedures_definition");
        def_block.top_level = true;
        def_block.x = Some(ctx.stack_x);
        def_block.y = Some(0.0);
        let def_id = self.sprites[ctx.sprite].arena.alloc(def_sid, def_block);

        let proto_sid = self.tables.ids.next("block");
        let mut arg_block_sids = Vec::with_capacity(def.params.len());
        for param in &def.params {
            let sid = self.tables.ids.next("block");
            let opcode = match param.ty {
                ProcParamType::Exp => "argument_reporter_string_number",
                ProcParamType::Bool => "argument_reporter_boolean",
            };
            let mut block = Block::new(opcode);
            block.shadow = true;
            block.parent = Some(proto_sid.clone());
            block
                .fields
                .insert("VALUE".to_string(), Field::Plain(param.name.clone()));
            self.sprites[ctx.sprite].arena.alloc(sid.clone(), block);
            arg_block_sids.push(sid);
        }

        let mut proto_block = Block::new("procedures_prototype");
        proto_block.shadow = true;
        for (arg_id, arg_sid) in arg_ids.iter().zip(&arg_block_sids) {
            proto_block
                .inputs
                .insert(arg_id.clone(), Input::Prototype(arg_sid.clone()));
        }
        let mut mutation = Mutation::new(&code, &arg_ids, def.warp);
        mutation.argumentnames = Some(encode_string_array(&names));
        mutation.argumentdefaults = Some(encode_string_array(&defaults));
        proto_block.mutation = Some(mutation);
        let proto_id = self.sprites[ctx.sprite].arena.alloc(proto_sid.clone(), proto_block);
        self.sprites[ctx.sprite].arena.set_parent(proto_id, def_id);

        self.sprites[ctx.sprite].arena.get_mut(def_id).inputs.insert(
            "custom_block".to_string(),
            Input::Prototype(proto_sid),
        );

        let comment_height = ctx.stack_height;
        ctx.stack_height += block_height(Shape::Hat) / 2.0;
        if let Some(text) = &def.comment {
            let width_x = ctx.stack_width;
            self.attach_comment(ctx, def_id, text, comment_height, width_x);
        }

        // Fix every call that referenced this procedure before now.
        for fixup in pending {
            self.apply_fixup(&def.name, fixup);
        }

        // Body blocks chain under the definition hat.
        ctx.cur_proc = Some(def.name.clone());
        let mut prev = def_id;
        for node in &def.body {
            if let Some(id) = self.emit_statement(node, ctx, false, 0) {
                self.sprites[ctx.sprite].arena.link_next(prev, id);
                prev = id;
            }
        }
        ctx.cur_proc = None;

        Some(def_id)
    }

    fn emit_proc_call(
        &mut self,
        call: &ProcCallNode,
        ctx: &mut StackCtx,
        top_level: bool,
    ) -> Option<BlockId> {
        ctx.stack_height += block_height(Shape::Stack) / 2.0;
        let before_args = ctx.stack_height;

        let call_sid = self.tables.ids.next("block");
        let mut block = Block::new("procedures_call");
        block.top_level = top_level;
        let call_id = self.sprites[ctx.sprite].arena.alloc(call_sid.clone(), block);

        // Resolve argument values far enough that binding them to declared
        // slots later only needs the declared types.
        let mut layout = StatementLayout::new(Shape::Stack);
        let mut pre_args: Vec<(String, PreArg)> = Vec::new();
        for (name, arg) in &call.args {
            let pre = match arg {
                AstArg::Number(text) => Some(PreArg::Number(text.clone())),
                AstArg::Str(text) => Some(PreArg::Str(text.clone())),
                AstArg::Variable(var) => {
                    let id = self.tables.variable(var);
                    Some(PreArg::Variable {
                        name: var.clone(),
                        id,
                    })
                }
                AstArg::List(list) => {
                    let id = self.tables.list(list);
                    Some(PreArg::List {
                        name: list.clone(),
                        id,
                    })
                }
                AstArg::FuncArg(arg_name) => self
                    .emit_funcarg_block(call_id, arg_name, ctx)
                    .map(PreArg::Block),
                AstArg::Reporter(nested) => self
                    .emit_reporter(nested, call_id, ctx, &mut layout, 1)
                    .map(PreArg::Block),
                AstArg::Dict(dict) => {
                    self.error(
                        ErrorKind::ArgKindMismatch,
                        "no procedure accepts a dictionary argument",
                        format!("@d:{dict}"),
                        Some(ctx.line),
                    );
                    None
                }
            };
            if let Some(pre) = pre {
                pre_args.push((name.clone(), pre));
            }
        }

        if !self.tables.procedures.contains_key(&call.name) {
            // First sighting of this procedure: register it undefined with
            // ids and names taken from the call site.
            let arg_ids: Vec<String> = (0..pre_args.len())
                .map(|_| self.tables.ids.next("procArg"))
                .collect();
            let arg_names: Vec<String> = pre_args.iter().map(|(name, _)| name.clone()).collect();
            self.tables.procedures.insert(
                call.name.clone(),
                Procedure {
                    defined: false,
                    proccode: String::new(),
                    arg_ids,
                    arg_names,
                    arg_types: Vec::new(),
                    arg_defaults: Vec::new(),
                    warp: false,
                    pending_calls: Vec::new(),
                },
            );
        }
        let (mutation, ready) = {
            let proc = &self.tables.procedures[&call.name];
            if proc.defined {
                (Mutation::new(&proc.proccode, &proc.arg_ids, proc.warp), true)
            } else {
                (Mutation::new("", &proc.arg_ids, false), false)
            }
        };
        self.sprites[ctx.sprite].arena.get_mut(call_id).mutation = Some(mutation);

        if ready {
            let proc = &self.tables.procedures[&call.name];
            let slots: Vec<(String, String, ProcParamType)> = proc
                .arg_ids
                .iter()
                .cloned()
                .zip(proc.arg_names.iter().cloned())
                .zip(proc.arg_types.iter().copied())
                .map(|((id, name), ty)| (id, name, ty))
                .collect();
            let line = ctx.line;
            let inputs = self.bind_call_inputs(&call.name, &slots, &pre_args, Some(line));
            self.sprites[ctx.sprite].arena.get_mut(call_id).inputs = inputs;
        } else {
            let fixup = CallFixup {
                sprite: ctx.sprite,
                call_sid,
                args: pre_args,
                line: ctx.line,
            };
            self.tables
                .procedures
                .get_mut(&call.name)
                .expect("registered above")
                .pending_calls
                .push(fixup);
        }

        let comment_height = before_args + layout.comment_height_adjust();
        ctx.stack_height += block_height(Shape::Stack) / 2.0;
        if let Some(text) = &call.comment {
            let width_x = ctx.stack_width;
            self.attach_comment(ctx, call_id, text, comment_height, width_x);
        }
        Some(call_id)
    }

    /// Bind a call's pre-resolved arguments to the procedure's declared
    /// argument ids, by name.
    fn bind_call_inputs(
        &mut self,
        proc_name: &str,
        slots: &[(String, String, ProcParamType)],
        pre_args: &[(String, PreArg)],
        line: Option<usize>,
    ) -> BTreeMap<String, Input> {
        let mut inputs = BTreeMap::new();
        for (arg_id, arg_name, ty) in slots {
            let Some((_, pre)) = pre_args.iter().find(|(name, _)| name == arg_name) else {
                self.error(
                    ErrorKind::ArgCountMismatch,
                    format!("call to '{proc_name}' is missing argument '{arg_name}'"),
                    arg_name.clone(),
                    line,
                );
                continue;
            };
            let input = match (pre, ty) {
                (PreArg::Number(text) | PreArg::Str(text), ProcParamType::Exp) => {
                    Input::String(text.clone())
                }
                (PreArg::Variable { name, id }, ProcParamType::Exp) => Input::Variable {
                    name: name.clone(),
                    id: id.clone(),
                },
                (PreArg::List { name, id }, ProcParamType::Exp) => Input::List {
                    name: name.clone(),
                    id: id.clone(),
                },
                (PreArg::Block(sid), ProcParamType::Exp) => Input::Reporter(sid.clone()),
                (PreArg::Block(sid), ProcParamType::Bool) => Input::BoolReporter(sid.clone()),
                (_, ProcParamType::Bool) => {
                    self.error(
                        ErrorKind::ArgKindMismatch,
                        format!(
                            "argument '{arg_name}' of '{proc_name}' needs a boolean reporter"
                        ),
                        arg_name.clone(),
                        line,
                    );
                    continue;
                }
            };
            inputs.insert(arg_id.clone(), input);
        }
        for (name, _) in pre_args {
            if !slots.iter().any(|(_, slot_name, _)| slot_name == name) {
                self.error(
                    ErrorKind::ArgCountMismatch,
                    format!("'{proc_name}' has no argument named '{name}'"),
                    name.clone(),
                    line,
                );
            }
        }
        inputs
    }

    /// Rebind a forward-referenced call now that its procedure is defined.
    fn apply_fixup(&mut self, proc_name: &str, fixup: CallFixup) {
        let proc = &self.tables.procedures[proc_name];
        let slots: Vec<(String, String, ProcParamType)> = proc
            .arg_ids
            .iter()
            .cloned()
            .zip(proc.arg_names.iter().cloned())
            .zip(proc.arg_types.iter().copied())
            .map(|((id, name), ty)| (id, name, ty))
            .collect();
        let proccode = proc.proccode.clone();
        let arg_ids = proc.arg_ids.clone();
        let warp = proc.warp;
        debug!(target: "emit", proc = proc_name, call = fixup.call_sid.as_str(), "fixup_call");

        let inputs = self.bind_call_inputs(proc_name, &slots, &fixup.args, Some(fixup.line));
        let Some(call_id) = self.sprites[fixup.sprite].arena.find(&fixup.call_sid) else {
            return;
        };
        let block = self.sprites[fixup.sprite].arena.get_mut(call_id);
        block.inputs = inputs;
        block.mutation = Some(Mutation::new(&proccode, &arg_ids, warp));
    }
}

fn symbol_name(arg: &AstArg) -> Option<&str> {
    match arg {
        AstArg::Str(text) => Some(text),
        AstArg::Variable(name) | AstArg::List(name) => Some(name),
        _ => None,
    }
}
