//! Pruned-SSA lifting: φ-placement at iterated dominance frontiers,
//! version renaming along the dominator tree, and dead-φ removal.
//!
//! Only locals that stay inside their function are lifted: upvalues escape
//! into nested closures and loop variables are rebound by their `for`
//! header, so both keep their single arena slot. Every SSA version of a
//! local shares its source name, which is what lets structural recovery
//! print the versions back as one variable.

use ahash::{AHashMap, AHashSet};

use super::{
    func::{BlockId, FuncId, InstrRef, Local, LocalId, Module},
    instr::{Instruction, Phi, Value},
};

/// Runs the full lifting pipeline on one function. Preconditions: the
/// dominator tree and dominance frontier are up to date and unreachable
/// blocks are disconnected.
pub fn lift(module: &mut Module, func: FuncId) {
    compute_referrers(module, func);
    place_phis(module, func);
    rename(module, func);
    prune_dead_phis(module, func);
}

/// Populates `Local::referrers` for every local of `func` from the operand
/// trees of the function's instructions.
fn compute_referrers(module: &mut Module, func: FuncId) {
    let locals = module.func(func).locals.clone();
    for &local in &locals {
        module.local_mut(local).referrers.clear();
    }
    let mut uses: Vec<(LocalId, InstrRef)> = Vec::new();
    {
        let f = module.func(func);
        for block in &f.blocks {
            for (index, instr) in block.instrs.iter().enumerate() {
                let at = InstrRef {
                    block: block.index,
                    instr: index,
                };
                instr.for_each_value(&mut |value| {
                    value.walk(&mut |v| {
                        // upvalue uses belong to the owning function's pass
                        if let Value::Local(id) = v {
                            if module.local(*id).owner == func {
                                uses.push((*id, at));
                            }
                        }
                    });
                });
            }
        }
    }
    for (local, at) in uses {
        module.local_mut(local).referrers.push(at);
    }
}

fn liftable(local: &Local) -> bool {
    !local.upvalue && !local.loop_var
}

/// Whether `instr` assigns to `local` at the top level of its target list.
fn assigns_to(instr: &Instruction, local: LocalId) -> bool {
    match instr {
        Instruction::Assign { lhs, .. } | Instruction::CompoundAssign { lhs, .. } => {
            lhs.iter().any(|v| matches!(v, Value::Local(id) if *id == local))
        }
        _ => false,
    }
}

/// Places φ-nodes for every liftable local at the iterated dominance
/// frontier of its definition blocks.
fn place_phis(module: &mut Module, func: FuncId) {
    let df = module.func(func).df.clone().expect("dominance frontier is computed before lifting");
    let locals = module.func(func).locals.clone();
    for local in locals {
        if !liftable(module.local(local)) {
            continue;
        }
        let mut def_blocks: AHashSet<BlockId> = AHashSet::new();
        def_blocks.insert(module.local(local).def_block);
        {
            let f = module.func(func);
            for block in &f.blocks {
                if block.reachable && block.instrs.iter().any(|i| assigns_to(i, local)) {
                    def_blocks.insert(block.index);
                }
            }
        }
        let name = module.local(local).name.clone();
        let mut placed: AHashSet<BlockId> = AHashSet::new();
        let mut work: Vec<BlockId> = def_blocks.iter().copied().collect();
        work.sort_unstable();
        while let Some(x) = work.pop() {
            for &v in &df[x.0 as usize] {
                if placed.insert(v) {
                    let f = module.func_mut(func);
                    let preds = f.block(v).preds.len();
                    let at = f.block(v).phi_count();
                    f.block_mut(v).instrs.insert(
                        at,
                        Instruction::Phi(Phi {
                            local,
                            target: local,
                            edges: vec![Value::Local(local); preds],
                            name: name.clone(),
                        }),
                    );
                    if !def_blocks.contains(&v) {
                        work.push(v);
                    }
                }
            }
        }
    }
}

/// Cytron renaming: a preorder walk of the dominator tree carrying the
/// current version of every lifted local. Operands are substituted with the
/// current version, each assignment target allocates a fresh version, and
/// φ-edges in CFG successors are filled with the version that is live at
/// the end of the corresponding predecessor.
fn rename(module: &mut Module, func: FuncId) {
    let children = module
        .func(func)
        .dom
        .as_ref()
        .expect("dominator tree is computed before lifting")
        .children
        .clone();
    let mut renaming: AHashMap<LocalId, Value> = AHashMap::new();
    // explicit stack of (block, saved-renaming) to keep sibling subtrees
    // isolated without recursing
    let mut stack: Vec<(BlockId, AHashMap<LocalId, Value>)> = vec![(BlockId(0), renaming.clone())];
    while let Some((block, saved)) = stack.pop() {
        renaming = saved;
        rename_block(module, func, block, &mut renaming);
        for &child in children[block.0 as usize].iter().rev() {
            stack.push((child, renaming.clone()));
        }
    }
}

fn rename_block(module: &mut Module, func: FuncId, block: BlockId, renaming: &mut AHashMap<LocalId, Value>) {
    let instr_count = module.func(func).block(block).instrs.len();
    for index in 0..instr_count {
        // step 1: substitute uses and collect targets needing fresh versions
        let mut targets: Vec<(usize, LocalId)> = Vec::new();
        let mut phi_local: Option<LocalId> = None;
        {
            let instr = &mut module.funcs[func.0 as usize].blocks[block.0 as usize].instrs[index];
            match instr {
                Instruction::Phi(phi) => phi_local = Some(phi.local),
                Instruction::Assign { lhs, rhs } | Instruction::CompoundAssign { lhs, rhs, .. } => {
                    for value in rhs.iter_mut() {
                        value.substitute(renaming);
                    }
                    for (i, value) in lhs.iter_mut().enumerate() {
                        if let Value::Local(id) = value {
                            targets.push((i, *id));
                        } else {
                            value.substitute(renaming);
                        }
                    }
                }
                Instruction::Call(call) => {
                    match &mut call.target {
                        super::instr::CallTargetValue::Function(callee) => callee.substitute(renaming),
                        super::instr::CallTargetValue::Method { receiver, .. } => receiver.substitute(renaming),
                    }
                    for arg in &mut call.args {
                        arg.substitute(renaming);
                    }
                }
                Instruction::Return { values } | Instruction::GenericFor { values, .. } => {
                    for value in values.iter_mut() {
                        value.substitute(renaming);
                    }
                }
                Instruction::If { cond } => cond.substitute(renaming),
                Instruction::NumberFor { init, limit, step, .. } => {
                    init.substitute(renaming);
                    limit.substitute(renaming);
                    if let Some(step) = step {
                        step.substitute(renaming);
                    }
                }
                Instruction::Jump => {}
            }
        }
        // step 2: allocate fresh versions outside the instruction borrow
        if let Some(local) = phi_local {
            if liftable(module.local(local)) {
                let version = new_version(module, func, local, block);
                renaming.insert(local, Value::Local(version));
                let Instruction::Phi(phi) = &mut module.funcs[func.0 as usize].blocks[block.0 as usize].instrs[index]
                else {
                    unreachable!("instruction kind is stable");
                };
                phi.target = version;
            }
            continue;
        }
        let mut fresh: Vec<(usize, LocalId)> = Vec::new();
        for (slot, local) in targets {
            if liftable(module.local(local)) {
                let version = new_version(module, func, local, block);
                renaming.insert(local, Value::Local(version));
                fresh.push((slot, version));
            }
        }
        if !fresh.is_empty() {
            let instr = &mut module.funcs[func.0 as usize].blocks[block.0 as usize].instrs[index];
            let (Instruction::Assign { lhs, .. } | Instruction::CompoundAssign { lhs, .. }) = instr else {
                unreachable!("targets only come from assignments");
            };
            for (slot, version) in fresh {
                lhs[slot] = Value::Local(version);
            }
        }
    }

    // step 3: fill φ-edges of successors with the versions live here
    let succs: Vec<BlockId> = module.func(func).block(block).succs.to_vec();
    for succ in succs {
        let Some(pred_index) = module.func(func).block(succ).pred_index(block) else {
            continue;
        };
        let phi_count = module.func(func).block(succ).phi_count();
        for phi_index in 0..phi_count {
            let Instruction::Phi(phi) = &module.funcs[func.0 as usize].blocks[succ.0 as usize].instrs[phi_index] else {
                unreachable!("φ prefix");
            };
            let edge = renaming.get(&phi.local).cloned().unwrap_or(Value::Local(phi.local));
            let Instruction::Phi(phi) = &mut module.funcs[func.0 as usize].blocks[succ.0 as usize].instrs[phi_index]
            else {
                unreachable!("φ prefix");
            };
            phi.edges[pred_index] = edge;
        }
    }
}

fn new_version(module: &mut Module, func: FuncId, local: LocalId, def_block: BlockId) -> LocalId {
    let source = module.local(local);
    let version = Local {
        name: source.name.clone(),
        owner: func,
        def_block,
        upvalue: false,
        declared: false,
        loop_var: false,
        referrers: Vec::new(),
    };
    let id = LocalId(module.locals.len() as u32);
    module.locals.push(version);
    module.func_mut(func).locals.push(id);
    id
}

/// Removes φ-nodes whose value no non-φ instruction transitively needs.
fn prune_dead_phis(module: &mut Module, func: FuncId) {
    // collect φ targets and the φ→φ dependency edges
    let mut phi_targets: AHashMap<LocalId, (BlockId, usize)> = AHashMap::new();
    {
        let f = module.func(func);
        for block in &f.blocks {
            for (index, instr) in block.instrs.iter().enumerate() {
                if let Instruction::Phi(phi) = instr {
                    phi_targets.insert(phi.target, (block.index, index));
                }
            }
        }
    }
    if phi_targets.is_empty() {
        return;
    }

    let mut live: AHashSet<LocalId> = AHashSet::new();
    let mut work: Vec<LocalId> = Vec::new();
    let mut deps: AHashMap<LocalId, Vec<LocalId>> = AHashMap::new();
    {
        let f = module.func(func);
        for block in &f.blocks {
            for instr in &block.instrs {
                if let Instruction::Phi(phi) = instr {
                    let mut used: Vec<LocalId> = Vec::new();
                    for edge in &phi.edges {
                        edge.walk(&mut |v| {
                            if let Value::Local(id) = v {
                                if phi_targets.contains_key(id) {
                                    used.push(*id);
                                }
                            }
                        });
                    }
                    deps.insert(phi.target, used);
                } else {
                    instr.for_each_value(&mut |value| {
                        value.walk(&mut |v| {
                            if let Value::Local(id) = v {
                                if phi_targets.contains_key(id) && live.insert(*id) {
                                    work.push(*id);
                                }
                            }
                        });
                    });
                }
            }
        }
    }
    while let Some(target) = work.pop() {
        if let Some(used) = deps.get(&target) {
            for &dep in used {
                if live.insert(dep) {
                    work.push(dep);
                }
            }
        }
    }

    let f = module.func_mut(func);
    for block in &mut f.blocks {
        block
            .instrs
            .retain(|instr| !matches!(instr, Instruction::Phi(phi) if !live.contains(&phi.target)));
    }
}
