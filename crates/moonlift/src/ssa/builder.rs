//! AST → CFG lowering.
//!
//! Lowers a chunk into a [`Module`]: a tree of functions whose bodies are
//! basic-block graphs. Expressions become pure values; assignments, calls
//! and control flow become instructions. Each function is finished
//! immediately after its body is lowered: blocks are renumbered into
//! emission order, unreachable blocks disconnected, dominators and
//! dominance frontiers computed, and locals lifted into pruned SSA.

use std::fmt;

use ahash::AHashMap;
use indexmap::IndexMap;

use super::{
    blockopt::mark_unreachable_blocks,
    dom::{build_dom_frontier, build_dom_tree},
    func::{BasicBlock, BlockId, FuncId, Function, Global, GlobalId, Local, LocalId, Module, add_edge},
    instr::{CallTargetValue, CallValue, FieldValue, Instruction, Value},
    lift::lift,
};
use crate::ast::{CallExpr, CallTarget, Chunk, Expr, FuncBody, FuncName, Stmt};

/// A structural failure during lowering. Fatal: no partial module is
/// produced.
#[derive(Debug, Clone)]
pub enum BuildError {
    /// A statement kind the pipeline refuses to lower.
    Unsupported { construct: &'static str },
    /// `break` or `continue` with no enclosing loop.
    OutsideLoop { keyword: &'static str },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported { construct } => write!(f, "unsupported construct: {construct}"),
            Self::OutsideLoop { keyword } => write!(f, "`{keyword}` outside a loop"),
        }
    }
}

impl std::error::Error for BuildError {}

/// Lowers a chunk into a module rooted at a synthetic variadic `main`.
pub fn build(chunk: &Chunk) -> Result<Module, BuildError> {
    let mut builder = Builder {
        module: Module {
            funcs: Vec::new(),
            locals: Vec::new(),
            globals: Vec::new(),
            entry: FuncId(0),
        },
        scopes: Vec::new(),
        globals_by_name: AHashMap::new(),
    };
    let main = builder.add_function("main");
    builder.build_function(main, &[], true, chunk, None)?;
    Ok(builder.module)
}

/// One scope frame: name bindings plus a parent link. The chain crosses
/// function boundaries, which is how free variables resolve to enclosing
/// locals (and get marked as upvalues) before falling back to globals.
struct Scope {
    names: IndexMap<String, LocalId>,
    parent: Option<usize>,
    func: FuncId,
}

/// Per-function lowering state.
struct Ctx {
    func: FuncId,
    current: BlockId,
    scope: usize,
    break_block: Option<BlockId>,
    continue_block: Option<BlockId>,
    /// Emission order of blocks; `create_block` allocates out of order and
    /// `add_block` slots the block in when its position is known.
    order: Vec<BlockId>,
}

struct Builder {
    module: Module,
    scopes: Vec<Scope>,
    globals_by_name: AHashMap<String, GlobalId>,
}

impl Builder {
    fn add_function(&mut self, name: &str) -> FuncId {
        let id = FuncId(self.module.funcs.len() as u32);
        self.module.funcs.push(Function::new(name.to_owned()));
        id
    }

    /// Builds the body of `func`. Idempotent per function: each function is
    /// built exactly once, immediately after creation.
    fn build_function(
        &mut self,
        func: FuncId,
        params: &[String],
        var_arg: bool,
        chunk: &Chunk,
        parent_scope: Option<usize>,
    ) -> Result<(), BuildError> {
        let scope = self.scopes.len();
        self.scopes.push(Scope {
            names: IndexMap::new(),
            parent: parent_scope,
            func,
        });
        let mut ctx = Ctx {
            func,
            current: BlockId(0),
            scope,
            break_block: None,
            continue_block: None,
            order: Vec::new(),
        };
        let entry = self.new_block(&mut ctx, "entry");
        ctx.current = entry;
        for param in params {
            let local = self.add_local(&mut ctx, param, entry);
            self.module.local_mut(local).declared = true;
            self.module.func_mut(func).params.push(local);
        }
        self.module.func_mut(func).var_arg = var_arg;
        self.chunk(&mut ctx, chunk)?;
        self.finish_body(func, &ctx.order);
        Ok(())
    }

    /// Renumbers blocks into emission order, disconnects unreachable
    /// blocks, runs dominance analysis and lifts locals into pruned SSA.
    fn finish_body(&mut self, func: FuncId, order: &[BlockId]) {
        self.renumber(func, order);
        mark_unreachable_blocks(self.module.func_mut(func));
        let f = self.module.func(func);
        let dom = build_dom_tree(f);
        let df = build_dom_frontier(f, &dom);
        let f = self.module.func_mut(func);
        f.dom = Some(dom);
        f.df = Some(df);
        lift(&mut self.module, func);
    }

    /// Rebuilds the block vector in emission order and remaps every block
    /// reference (edges and local def sites) accordingly.
    fn renumber(&mut self, func: FuncId, order: &[BlockId]) {
        let f = self.module.func_mut(func);
        debug_assert_eq!(order.len(), f.blocks.len(), "every created block must be placed");
        let mut remap = vec![BlockId(0); f.blocks.len()];
        for (position, &old) in order.iter().enumerate() {
            remap[old.0 as usize] = BlockId(position as u32);
        }
        let mut old_blocks: Vec<Option<BasicBlock>> = std::mem::take(&mut f.blocks).into_iter().map(Some).collect();
        let mut blocks = Vec::with_capacity(old_blocks.len());
        for (position, &old) in order.iter().enumerate() {
            let mut block = old_blocks[old.0 as usize].take().expect("block placed exactly once");
            block.index = BlockId(position as u32);
            for pred in &mut block.preds {
                *pred = remap[pred.0 as usize];
            }
            for succ in &mut block.succs {
                *succ = remap[succ.0 as usize];
            }
            blocks.push(block);
        }
        f.blocks = blocks;
        let locals = f.locals.clone();
        for local in locals {
            let def = self.module.local(local).def_block;
            self.module.local_mut(local).def_block = remap[def.0 as usize];
        }
    }

    /// Creates a block and places it at the current end of emission order.
    fn new_block(&mut self, ctx: &mut Ctx, comment: &'static str) -> BlockId {
        let id = self.create_block(ctx, comment);
        ctx.order.push(id);
        id
    }

    /// Creates a detached block; `add_block` later fixes its position.
    fn create_block(&mut self, ctx: &mut Ctx, comment: &'static str) -> BlockId {
        let f = self.module.func_mut(ctx.func);
        let id = BlockId(f.blocks.len() as u32);
        f.blocks.push(BasicBlock::new(id, comment));
        id
    }

    fn add_block(&mut self, ctx: &mut Ctx, id: BlockId) {
        ctx.order.push(id);
    }

    fn emit(&mut self, ctx: &Ctx, instr: Instruction) {
        let block = self.module.func_mut(ctx.func).block_mut(ctx.current);
        debug_assert!(
            !matches!(
                block.instrs.last(),
                Some(
                    Instruction::If { .. }
                        | Instruction::Jump
                        | Instruction::Return { .. }
                        | Instruction::NumberFor { .. }
                        | Instruction::GenericFor { .. }
                )
            ),
            "block {} is already closed by a terminator",
            block.index.0
        );
        block.instrs.push(instr);
    }

    fn emit_jump(&mut self, ctx: &Ctx, target: BlockId) {
        self.emit(ctx, Instruction::Jump);
        add_edge(self.module.func_mut(ctx.func), ctx.current, target);
    }

    /// Emits a two-way terminator; successor order is the edge order given.
    fn emit_branch(&mut self, ctx: &Ctx, instr: Instruction, first: BlockId, second: BlockId) {
        self.emit(ctx, instr);
        let f = self.module.func_mut(ctx.func);
        add_edge(f, ctx.current, first);
        add_edge(f, ctx.current, second);
    }

    fn fall_through(&mut self, ctx: &Ctx, target: BlockId) {
        add_edge(self.module.func_mut(ctx.func), ctx.current, target);
    }

    fn add_local(&mut self, ctx: &Ctx, name: &str, def_block: BlockId) -> LocalId {
        let id = LocalId(self.module.locals.len() as u32);
        self.module.locals.push(Local {
            name: name.to_owned(),
            owner: ctx.func,
            def_block,
            upvalue: false,
            declared: false,
            loop_var: false,
            referrers: Vec::new(),
        });
        self.module.func_mut(ctx.func).locals.push(id);
        self.scopes[ctx.scope].names.insert(name.to_owned(), id);
        id
    }

    /// Resolves a name through the scope chain. A hit in an enclosing
    /// function marks the local as an upvalue of the using function; a miss
    /// everywhere yields a global.
    fn lookup(&mut self, ctx: &Ctx, name: &str) -> Value {
        let mut scope = Some(ctx.scope);
        while let Some(index) = scope {
            if let Some(&local) = self.scopes[index].names.get(name) {
                if self.scopes[index].func != ctx.func {
                    self.module.local_mut(local).upvalue = true;
                    let upvalues = &mut self.module.func_mut(ctx.func).upvalues;
                    if !upvalues.contains(&local) {
                        upvalues.push(local);
                    }
                }
                return Value::Local(local);
            }
            scope = self.scopes[index].parent;
        }
        let id = *self.globals_by_name.entry(name.to_owned()).or_insert_with(|| {
            let id = GlobalId(self.module.globals.len() as u32);
            self.module.globals.push(Global { name: name.to_owned() });
            id
        });
        Value::Global(id)
    }

    /// Lowers a statement list inside a fresh scope.
    fn chunk(&mut self, ctx: &mut Ctx, stmts: &Chunk) -> Result<(), BuildError> {
        let saved = ctx.scope;
        self.scopes.push(Scope {
            names: IndexMap::new(),
            parent: Some(saved),
            func: ctx.func,
        });
        ctx.scope = self.scopes.len() - 1;
        for stmt in stmts {
            self.stmt(ctx, stmt)?;
        }
        ctx.scope = saved;
        Ok(())
    }

    fn expr(&mut self, ctx: &mut Ctx, expr: &Expr) -> Result<Value, BuildError> {
        Ok(match expr {
            Expr::Nil => Value::Nil,
            Expr::True => Value::True,
            Expr::False => Value::False,
            Expr::VarArg => Value::VarArg,
            Expr::Number(value) => Value::Number(*value),
            Expr::Str(bytes) => Value::Str(bytes.clone()),
            Expr::Ident(name) => self.lookup(ctx, name),
            Expr::AttrGet { object, key } => Value::AttrGet {
                object: Box::new(self.expr(ctx, object)?),
                key: Box::new(self.expr(ctx, key)?),
            },
            Expr::Table(fields) => {
                let mut out = Vec::with_capacity(fields.len());
                for field in fields {
                    let key = field.key.as_ref().map(|k| self.expr(ctx, k)).transpose()?;
                    out.push(FieldValue {
                        key,
                        value: self.expr(ctx, &field.value)?,
                    });
                }
                Value::Table(out)
            }
            Expr::Arith { op, lhs, rhs } => Value::Arith {
                op: *op,
                lhs: Box::new(self.expr(ctx, lhs)?),
                rhs: Box::new(self.expr(ctx, rhs)?),
            },
            Expr::Concat { lhs, rhs } => Value::Concat {
                lhs: Box::new(self.expr(ctx, lhs)?),
                rhs: Box::new(self.expr(ctx, rhs)?),
            },
            Expr::Relation { op, lhs, rhs } => Value::Relation {
                op: *op,
                lhs: Box::new(self.expr(ctx, lhs)?),
                rhs: Box::new(self.expr(ctx, rhs)?),
            },
            Expr::Logic { op, lhs, rhs } => Value::Logic {
                op: *op,
                lhs: Box::new(self.expr(ctx, lhs)?),
                rhs: Box::new(self.expr(ctx, rhs)?),
            },
            Expr::Unary { op, expr } => Value::Unary {
                op: *op,
                value: Box::new(self.expr(ctx, expr)?),
            },
            Expr::Function(body) => self.function_expr(ctx, "", body, &[])?,
            Expr::Call(call) => Value::Call(Box::new(self.call_value(ctx, call)?)),
        })
    }

    fn call_value(&mut self, ctx: &mut Ctx, call: &CallExpr) -> Result<CallValue, BuildError> {
        let target = match &call.target {
            CallTarget::Function(callee) => CallTargetValue::Function(self.expr(ctx, callee)?),
            CallTarget::Method { receiver, name } => CallTargetValue::Method {
                receiver: self.expr(ctx, receiver)?,
                name: name.clone(),
            },
        };
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(self.expr(ctx, arg)?);
        }
        Ok(CallValue { target, args })
    }

    /// Lowers a function literal: registers a nested function and builds it
    /// recursively with the current scope as its lexical parent.
    /// `extra_params` is prepended, carrying the implicit `self` of method
    /// definitions.
    fn function_expr(
        &mut self,
        ctx: &mut Ctx,
        name: &str,
        body: &FuncBody,
        extra_params: &[String],
    ) -> Result<Value, BuildError> {
        let id = self.add_function(name);
        self.module.func_mut(ctx.func).nested.push(id);
        let mut params: Vec<String> = extra_params.to_vec();
        params.extend(body.params.iter().cloned());
        self.build_function(id, &params, body.has_vararg, &body.chunk, Some(ctx.scope))?;
        Ok(Value::Function(id))
    }

    fn stmt(&mut self, ctx: &mut Ctx, stmt: &Stmt) -> Result<(), BuildError> {
        match stmt {
            Stmt::Assign { lhs, rhs } => {
                let mut targets = Vec::with_capacity(lhs.len());
                for target in lhs {
                    targets.push(self.expr(ctx, target)?);
                }
                let mut values = Vec::new();
                for i in 0..lhs.len().max(rhs.len()) {
                    match rhs.get(i) {
                        Some(expr) => values.push(self.expr(ctx, expr)?),
                        None => values.push(Value::Nil),
                    }
                }
                self.emit(ctx, Instruction::Assign { lhs: targets, rhs: values });
            }
            Stmt::CompoundAssign { op, lhs, rhs } => {
                let mut targets = Vec::with_capacity(lhs.len());
                for target in lhs {
                    targets.push(self.expr(ctx, target)?);
                }
                let mut values = Vec::new();
                for i in 0..lhs.len().max(rhs.len()) {
                    match rhs.get(i) {
                        Some(expr) => values.push(self.expr(ctx, expr)?),
                        None => values.push(Value::Nil),
                    }
                }
                self.emit(
                    ctx,
                    Instruction::CompoundAssign {
                        op: *op,
                        lhs: targets,
                        rhs: values,
                    },
                );
            }
            Stmt::LocalAssign { names, exprs } => {
                let f = self.module.func(ctx.func);
                let pristine = f.blocks.len() == 1 && f.blocks[0].instrs.is_empty();
                if pristine && exprs.is_empty() {
                    // value-less declarations at the top of a function are
                    // recorded, not emitted, so recovery reprints them as a
                    // `local` prologue
                    let mut group = Vec::with_capacity(names.len());
                    for name in names {
                        let local = self.add_local(ctx, name, ctx.current);
                        self.module.local_mut(local).declared = true;
                        group.push(local);
                    }
                    self.module.func_mut(ctx.func).decl_groups.push(group);
                    return Ok(());
                }
                let mut values = Vec::with_capacity(exprs.len());
                for expr in exprs {
                    values.push(self.expr(ctx, expr)?);
                }
                let mut targets = Vec::with_capacity(names.len());
                for name in names {
                    let local = self.add_local(ctx, name, ctx.current);
                    targets.push(Value::Local(local));
                }
                self.emit(ctx, Instruction::Assign { lhs: targets, rhs: values });
            }
            Stmt::Call(call) => {
                let value = self.call_value(ctx, call)?;
                self.emit(ctx, Instruction::Call(value));
            }
            Stmt::Do(body) => self.chunk(ctx, body)?,
            Stmt::While { cond, body } => self.while_stmt(ctx, cond, body)?,
            Stmt::Repeat { body, cond } => self.repeat_stmt(ctx, body, cond)?,
            Stmt::If { cond, then, orelse } => self.if_stmt(ctx, cond, then, orelse)?,
            Stmt::NumberFor {
                name,
                init,
                limit,
                step,
                body,
            } => self.number_for(ctx, name, init, limit, step.as_ref(), body)?,
            Stmt::GenericFor { names, exprs, body } => self.generic_for(ctx, names, exprs, body)?,
            Stmt::LocalFunction { name, func } => {
                let local = self.add_local(ctx, name, ctx.current);
                let value = self.function_expr(ctx, name, func, &[])?;
                self.emit(
                    ctx,
                    Instruction::Assign {
                        lhs: vec![Value::Local(local)],
                        rhs: vec![value],
                    },
                );
            }
            Stmt::Function { name, func } => {
                let (target, func_name, implicit_self) = match name {
                    FuncName::Plain(expr) => {
                        let func_name = match expr {
                            Expr::Ident(n) => n.clone(),
                            Expr::AttrGet { key, .. } => match key.as_ref() {
                                Expr::Str(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                                _ => String::new(),
                            },
                            _ => String::new(),
                        };
                        (self.expr(ctx, expr)?, func_name, false)
                    }
                    FuncName::Method { receiver, name } => {
                        let object = self.expr(ctx, receiver)?;
                        let target = Value::AttrGet {
                            object: Box::new(object),
                            key: Box::new(Value::Str(name.clone().into_bytes())),
                        };
                        (target, name.clone(), true)
                    }
                };
                let extra = if implicit_self { vec!["self".to_owned()] } else { Vec::new() };
                let value = self.function_expr(ctx, &func_name, func, &extra)?;
                self.emit(
                    ctx,
                    Instruction::Assign {
                        lhs: vec![target],
                        rhs: vec![value],
                    },
                );
            }
            Stmt::Return(exprs) => {
                let mut values = Vec::with_capacity(exprs.len());
                for expr in exprs {
                    values.push(self.expr(ctx, expr)?);
                }
                self.emit(ctx, Instruction::Return { values });
                self.divert_to_unreachable(ctx);
            }
            Stmt::Break => {
                let Some(target) = ctx.break_block else {
                    return Err(BuildError::OutsideLoop { keyword: "break" });
                };
                self.jump_and_divert(ctx, target);
            }
            Stmt::Continue => {
                let Some(target) = ctx.continue_block else {
                    return Err(BuildError::OutsideLoop { keyword: "continue" });
                };
                self.jump_and_divert(ctx, target);
            }
            Stmt::Label(_) => return Err(BuildError::Unsupported { construct: "label statement" }),
            Stmt::Goto(_) => return Err(BuildError::Unsupported { construct: "goto statement" }),
        }
        Ok(())
    }

    /// Emits a jump to `target` and parks subsequent statements in a fresh
    /// block that only an unreachability edge remembers.
    fn jump_and_divert(&mut self, ctx: &mut Ctx, target: BlockId) {
        let resume = self.new_block(ctx, "unreachable");
        let f = self.module.func_mut(ctx.func);
        f.block_mut(ctx.current).un_succs.push(resume);
        f.block_mut(resume).un_preds.push(ctx.current);
        self.emit_jump(ctx, target);
        ctx.current = resume;
    }

    fn divert_to_unreachable(&mut self, ctx: &mut Ctx) {
        let resume = self.new_block(ctx, "unreachable");
        let f = self.module.func_mut(ctx.func);
        f.block_mut(ctx.current).un_succs.push(resume);
        f.block_mut(resume).un_preds.push(ctx.current);
        ctx.current = resume;
    }

    fn while_stmt(&mut self, ctx: &mut Ctx, cond: &Expr, body: &Chunk) -> Result<(), BuildError> {
        let loop_block = self.new_block(ctx, "while.loop");
        let body_block = self.new_block(ctx, "while.body");
        let done = self.create_block(ctx, "while.done");

        let saved = (ctx.break_block, ctx.continue_block);
        ctx.break_block = Some(done);
        ctx.continue_block = Some(loop_block);

        self.fall_through(ctx, loop_block);
        ctx.current = loop_block;
        let cond = self.expr(ctx, cond)?;
        self.emit_branch(ctx, Instruction::If { cond }, body_block, done);

        ctx.current = body_block;
        self.chunk(ctx, body)?;
        self.emit_jump(ctx, loop_block);

        self.add_block(ctx, done);
        ctx.current = done;
        (ctx.break_block, ctx.continue_block) = saved;
        Ok(())
    }

    fn repeat_stmt(&mut self, ctx: &mut Ctx, body: &Chunk, cond: &Expr) -> Result<(), BuildError> {
        let body_block = self.new_block(ctx, "repeat.body");
        let loop_block = self.create_block(ctx, "repeat.loop");
        let done = self.create_block(ctx, "repeat.done");

        let saved = (ctx.break_block, ctx.continue_block);
        ctx.break_block = Some(done);
        ctx.continue_block = Some(loop_block);

        self.fall_through(ctx, body_block);
        ctx.current = body_block;
        self.chunk(ctx, body)?;
        self.fall_through(ctx, loop_block);

        self.add_block(ctx, loop_block);
        ctx.current = loop_block;
        let cond = self.expr(ctx, cond)?;
        // the until-condition exits the loop when true
        self.emit_branch(ctx, Instruction::If { cond }, done, body_block);

        self.add_block(ctx, done);
        ctx.current = done;
        (ctx.break_block, ctx.continue_block) = saved;
        Ok(())
    }

    fn number_for(
        &mut self,
        ctx: &mut Ctx,
        name: &str,
        init: &Expr,
        limit: &Expr,
        step: Option<&Expr>,
        body: &Chunk,
    ) -> Result<(), BuildError> {
        let init = self.expr(ctx, init)?;
        let limit = self.expr(ctx, limit)?;
        let step = step.map(|s| self.expr(ctx, s)).transpose()?;

        let saved_scope = ctx.scope;
        self.scopes.push(Scope {
            names: IndexMap::new(),
            parent: Some(saved_scope),
            func: ctx.func,
        });
        ctx.scope = self.scopes.len() - 1;

        let loop_block = self.new_block(ctx, "for.loop");
        let body_block = self.new_block(ctx, "for.body");
        let done = self.create_block(ctx, "for.done");

        let local = self.add_local(ctx, name, loop_block);
        {
            let data = self.module.local_mut(local);
            data.declared = true;
            data.loop_var = true;
        }

        let saved = (ctx.break_block, ctx.continue_block);
        ctx.break_block = Some(done);
        ctx.continue_block = Some(loop_block);

        self.fall_through(ctx, loop_block);
        ctx.current = loop_block;
        self.emit_branch(
            ctx,
            Instruction::NumberFor {
                local,
                init,
                limit,
                step,
            },
            body_block,
            done,
        );

        ctx.current = body_block;
        self.chunk(ctx, body)?;
        self.fall_through(ctx, loop_block);

        self.add_block(ctx, done);
        ctx.current = done;
        (ctx.break_block, ctx.continue_block) = saved;
        ctx.scope = saved_scope;
        Ok(())
    }

    fn generic_for(&mut self, ctx: &mut Ctx, names: &[String], exprs: &[Expr], body: &Chunk) -> Result<(), BuildError> {
        let mut values = Vec::with_capacity(exprs.len());
        for expr in exprs {
            values.push(self.expr(ctx, expr)?);
        }

        let saved_scope = ctx.scope;
        self.scopes.push(Scope {
            names: IndexMap::new(),
            parent: Some(saved_scope),
            func: ctx.func,
        });
        ctx.scope = self.scopes.len() - 1;

        let loop_block = self.new_block(ctx, "for.loop");
        let body_block = self.new_block(ctx, "for.body");
        let done = self.create_block(ctx, "for.done");

        let mut locals = Vec::with_capacity(names.len());
        for name in names {
            let local = self.add_local(ctx, name, loop_block);
            let data = self.module.local_mut(local);
            data.declared = true;
            data.loop_var = true;
            locals.push(local);
        }

        let saved = (ctx.break_block, ctx.continue_block);
        ctx.break_block = Some(done);
        ctx.continue_block = Some(loop_block);

        self.fall_through(ctx, loop_block);
        ctx.current = loop_block;
        self.emit_branch(ctx, Instruction::GenericFor { locals, values }, body_block, done);

        ctx.current = body_block;
        self.chunk(ctx, body)?;
        self.fall_through(ctx, loop_block);

        self.add_block(ctx, done);
        ctx.current = done;
        (ctx.break_block, ctx.continue_block) = saved;
        ctx.scope = saved_scope;
        Ok(())
    }

    fn if_stmt(&mut self, ctx: &mut Ctx, cond: &Expr, then: &Chunk, orelse: &Chunk) -> Result<(), BuildError> {
        let base = ctx.current;
        let cond = self.expr(ctx, cond)?;
        self.emit(ctx, Instruction::If { cond });

        let then_block = self.new_block(ctx, "if.then");
        ctx.current = then_block;
        self.chunk(ctx, then)?;
        add_edge(self.module.func_mut(ctx.func), base, then_block);
        let then_tail = ctx.current;

        if orelse.is_empty() {
            let done = self.new_block(ctx, "if.done");
            add_edge(self.module.func_mut(ctx.func), then_tail, done);
            add_edge(self.module.func_mut(ctx.func), base, done);
            ctx.current = done;
        } else {
            let else_block = self.new_block(ctx, "if.else");
            ctx.current = else_block;
            self.chunk(ctx, orelse)?;
            add_edge(self.module.func_mut(ctx.func), base, else_block);
            let else_tail = ctx.current;

            let done = self.new_block(ctx, "if.done");
            ctx.current = then_tail;
            self.emit_jump(ctx, done);
            add_edge(self.module.func_mut(ctx.func), else_tail, done);
            ctx.current = done;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn build_src(src: &str) -> Module {
        build(&parse(src).expect("parse")).expect("build")
    }

    #[test]
    fn straight_line_is_one_block() {
        let module = build_src("local a = 1 local b = 2");
        let main = module.func(module.entry);
        assert_eq!(main.blocks.len(), 1);
        assert_eq!(main.blocks[0].instrs.len(), 2);
        assert!(main.var_arg);
    }

    #[test]
    fn while_loop_shape() {
        let module = build_src("local t0, t1 = 0, 1 while t0 do t0 = t1 end");
        let main = module.func(module.entry);
        // entry, loop, body, done
        assert_eq!(main.blocks.len(), 4);
        let loop_block = &main.blocks[1];
        assert_eq!(loop_block.comment, "while.loop");
        assert_eq!(loop_block.succs.as_slice(), &[BlockId(2), BlockId(3)]);
        // entry edge first, back edge second
        assert_eq!(loop_block.preds.as_slice(), &[BlockId(0), BlockId(2)]);
        assert!(matches!(
            loop_block.instrs.last(),
            Some(Instruction::If { .. })
        ));
    }

    #[test]
    fn repeat_true_branch_exits() {
        let module = build_src("repeat x = 1 until x");
        let main = module.func(module.entry);
        // entry, body, loop, done
        assert_eq!(main.blocks.len(), 4);
        let loop_block = &main.blocks[2];
        assert_eq!(loop_block.comment, "repeat.loop");
        assert_eq!(loop_block.succs.as_slice(), &[BlockId(3), BlockId(1)]);
    }

    #[test]
    fn if_else_block_order() {
        let module = build_src("if c then x = 1 else x = 2 end");
        let main = module.func(module.entry);
        // entry, then, else, done
        assert_eq!(main.blocks.len(), 4);
        assert_eq!(main.blocks[0].succs.as_slice(), &[BlockId(1), BlockId(2)]);
        assert_eq!(main.blocks[1].comment, "if.then");
        assert_eq!(main.blocks[2].comment, "if.else");
        assert_eq!(main.blocks[3].comment, "if.done");
    }

    #[test]
    fn number_for_defaults_keep_missing_step() {
        let module = build_src("for i = 1, 2 do end");
        let main = module.func(module.entry);
        let loop_block = &main.blocks[1];
        let Some(Instruction::NumberFor { step, .. }) = loop_block.instrs.first() else {
            panic!("expected NumberFor in the loop header");
        };
        assert!(step.is_none());
    }

    #[test]
    fn break_diverts_into_unreachable_block() {
        let module = build_src("while c do break x = 1 end");
        let main = module.func(module.entry);
        let resume = main
            .blocks
            .iter()
            .find(|b| b.comment == "unreachable")
            .expect("diverted block exists");
        assert!(!resume.reachable);
        assert!(!resume.un_preds.is_empty());
    }

    #[test]
    fn break_outside_loop_is_an_error() {
        let err = build(&parse("break").expect("parse")).expect_err("must fail");
        assert!(matches!(err, BuildError::OutsideLoop { keyword: "break" }));
    }

    #[test]
    fn goto_is_rejected() {
        let err = build(&parse("::l:: goto l").expect("parse")).expect_err("must fail");
        assert!(matches!(err, BuildError::Unsupported { .. }));
    }

    #[test]
    fn upvalues_are_marked() {
        let module = build_src("local t0 local function t2() t0 = 1 end");
        let main = module.func(module.entry);
        assert_eq!(main.decl_groups.len(), 1);
        let nested = module.func(main.nested[0]);
        assert_eq!(nested.upvalues.len(), 1);
        let captured = module.local(nested.upvalues[0]);
        assert_eq!(captured.name, "t0");
        assert!(captured.upvalue);
    }

    #[test]
    fn method_definition_gets_implicit_self() {
        let module = build_src("local R = {} function R:m(a) end");
        let main = module.func(module.entry);
        let nested = module.func(main.nested[0]);
        assert_eq!(nested.params.len(), 2);
        assert_eq!(module.local(nested.params[0]).name, "self");
        assert_eq!(module.local(nested.params[1]).name, "a");
    }

    #[test]
    fn unresolved_names_become_globals() {
        let module = build_src("x = y");
        assert_eq!(module.globals.len(), 2);
        let names: Vec<&str> = module.globals.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["x", "y"]);
    }

    #[test]
    fn build_is_deterministic() {
        let src = "local a = 1 while a do if x then a = 2 else break end end return a";
        let first = build_src(src);
        let second = build_src(src);
        let f1 = first.func(first.entry);
        let f2 = second.func(second.entry);
        assert_eq!(f1.blocks.len(), f2.blocks.len());
        for (b1, b2) in f1.blocks.iter().zip(&f2.blocks) {
            assert_eq!(b1.index, b2.index);
            assert_eq!(b1.preds.as_slice(), b2.preds.as_slice());
            assert_eq!(b1.succs.as_slice(), b2.succs.as_slice());
            assert_eq!(b1.instrs.len(), b2.instrs.len());
        }
    }
}
