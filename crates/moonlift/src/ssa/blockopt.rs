//! CFG block cleanups: unreachability marking, block fusion, jump
//! threading, and index compaction.
//!
//! Fusion and threading keep φ-edges positionally aligned with predecessor
//! lists (blocks carrying φ-nodes are skipped rather than risk misaligning
//! them), and compaction renumbers the surviving blocks densely.

use super::{
    func::{BlockId, FuncId, Function, Module},
    instr::Instruction,
};

/// Recomputes reachability from the entry block and disconnects every
/// unreachable block: its edges move to `un_preds`/`un_succs` where
/// diagnostics can still see them, and reachable successors drop the dead
/// predecessor (φ-edges included).
pub fn mark_unreachable_blocks(f: &mut Function) {
    if f.blocks.is_empty() {
        return;
    }
    for block in &mut f.blocks {
        block.reachable = false;
    }
    f.blocks[0].reachable = true;
    let mut work = vec![BlockId(0)];
    while let Some(b) = work.pop() {
        let succs: Vec<BlockId> = f.block(b).succs.to_vec();
        for s in succs {
            if !f.block(s).reachable {
                f.block_mut(s).reachable = true;
                work.push(s);
            }
        }
    }
    for i in 0..f.blocks.len() {
        if f.blocks[i].reachable {
            continue;
        }
        let b = BlockId(i as u32);
        let succs: Vec<BlockId> = std::mem::take(&mut f.blocks[i].succs).into_vec();
        for &c in &succs {
            if !f.block(c).un_preds.contains(&b) {
                f.block_mut(c).un_preds.push(b);
            }
            if f.block(c).reachable {
                f.block_mut(c).remove_pred(b);
            }
        }
        if i > 0 {
            // remember the would-have-fallen-from block for diagnostics
            let prev = BlockId((i - 1) as u32);
            if !f.blocks[i].un_preds.contains(&prev) {
                f.blocks[i].un_preds.push(prev);
            }
        }
        f.blocks[i].un_succs.extend(succs);
    }
}

/// Fuses `a -> b` into one block when `a` has a single successor and `b` a
/// single predecessor. Returns whether the rewrite applied.
fn fuse_blocks(f: &mut Function, dead: &mut [bool], a: BlockId) -> bool {
    if dead[a.0 as usize] || f.block(a).succs.len() != 1 {
        return false;
    }
    let b = f.block(a).succs[0];
    if b == a || dead[b.0 as usize] || f.block(b).preds.len() != 1 {
        return false;
    }
    if f.block(b).phi_count() > 0 {
        return false;
    }
    if matches!(f.block(a).instrs.last(), Some(Instruction::Jump)) {
        f.block_mut(a).instrs.pop();
    }
    let moved = std::mem::take(&mut f.block_mut(b).instrs);
    f.block_mut(a).instrs.extend(moved);
    let b_succs: Vec<BlockId> = std::mem::take(&mut f.block_mut(b).succs).into_vec();
    for &c in &b_succs {
        f.block_mut(c).replace_pred(b, a);
    }
    f.block_mut(a).succs = b_succs.into_iter().collect();
    f.block_mut(b).preds.clear();
    dead[b.0 as usize] = true;
    true
}

/// Threads `a -> b -> c` into `a -> c` when `b` is a bare jump. Returns
/// whether the rewrite applied.
fn jump_threading(f: &mut Function, dead: &mut [bool], b: BlockId) -> bool {
    if b == BlockId(0) || dead[b.0 as usize] {
        return false;
    }
    {
        let block = f.block(b);
        // a bare jump, or an empty fallthrough block
        let trivial = match block.instrs.as_slice() {
            [] => true,
            [Instruction::Jump] => true,
            _ => false,
        };
        if !trivial || block.succs.len() != 1 {
            return false;
        }
    }
    let c = f.block(b).succs[0];
    if c == b || f.block(c).phi_count() > 0 {
        return false;
    }
    let preds: Vec<BlockId> = f.block(b).preds.iter().copied().collect();
    for (j, &a) in preds.iter().enumerate() {
        f.block_mut(a).replace_succ(b, c);
        let a_succs: Vec<BlockId> = f.block(a).succs.to_vec();
        if a_succs.len() == 2 && a_succs[0] == c && a_succs[1] == c {
            // both edges now reach c: the branch is degenerate
            f.block_mut(a).succs.truncate(1);
            if matches!(f.block(a).instrs.last(), Some(Instruction::If { .. })) {
                let instrs = &mut f.block_mut(a).instrs;
                let last = instrs.len() - 1;
                instrs[last] = Instruction::Jump;
            }
            f.block_mut(c).remove_pred(b);
        } else if j == 0 {
            f.block_mut(c).replace_pred(b, a);
        } else {
            f.block_mut(c).preds.push(a);
        }
    }
    f.block_mut(b).preds.clear();
    f.block_mut(b).succs.clear();
    dead[b.0 as usize] = true;
    true
}

/// Runs fusion and jump threading to a fixpoint, then compacts block
/// indices. Dominance data is invalidated and cleared.
pub fn optimize_blocks(module: &mut Module, func: FuncId) {
    let n = module.func(func).blocks.len();
    let mut dead = vec![false; n];
    let mut changed = true;
    while changed {
        changed = false;
        for i in 0..n {
            let b = BlockId(i as u32);
            if fuse_blocks(module.func_mut(func), &mut dead, b) {
                changed = true;
            }
            if jump_threading(module.func_mut(func), &mut dead, b) {
                changed = true;
            }
        }
    }
    compact(module, func, &dead);
    let f = module.func_mut(func);
    f.dom = None;
    f.df = None;
}

/// Drops dead blocks and renumbers the rest densely, remapping every block
/// reference, including local def sites.
fn compact(module: &mut Module, func: FuncId, dead: &[bool]) {
    if dead.iter().all(|&d| !d) {
        return;
    }
    let f = module.func_mut(func);
    let mut remap: Vec<Option<BlockId>> = vec![None; f.blocks.len()];
    let mut next = 0u32;
    for (i, &is_dead) in dead.iter().enumerate() {
        if !is_dead {
            remap[i] = Some(BlockId(next));
            next += 1;
        }
    }
    let old = std::mem::take(&mut f.blocks);
    let mut blocks = Vec::with_capacity(next as usize);
    for (i, mut block) in old.into_iter().enumerate() {
        let Some(new_id) = remap[i] else { continue };
        block.index = new_id;
        for pred in &mut block.preds {
            *pred = remap[pred.0 as usize].expect("live block references a dead predecessor");
        }
        for succ in &mut block.succs {
            *succ = remap[succ.0 as usize].expect("live block references a dead successor");
        }
        block.un_preds.retain(|p| remap[p.0 as usize].is_some());
        for p in &mut block.un_preds {
            *p = remap[p.0 as usize].expect("retained above");
        }
        block.un_succs.retain(|s| remap[s.0 as usize].is_some());
        for s in &mut block.un_succs {
            *s = remap[s.0 as usize].expect("retained above");
        }
        blocks.push(block);
    }
    f.blocks = blocks;
    let locals = f.locals.clone();
    for local in locals {
        let def = module.local(local).def_block;
        module.local_mut(local).def_block = remap[def.0 as usize].unwrap_or(BlockId(0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse::parse, ssa::build};

    #[test]
    fn empty_if_collapses() {
        // `if c then end`: then and done fuse/thread away down to a couple
        // of straight-line blocks
        let mut module = build(&parse("x = 1 if c then end y = 2").expect("parse")).expect("build");
        let entry = module.entry;
        let before = module.func(entry).blocks.len();
        optimize_blocks(&mut module, entry);
        let f = module.func(module.entry);
        assert!(f.blocks.len() < before);
        for (i, block) in f.blocks.iter().enumerate() {
            assert_eq!(block.index.0 as usize, i, "indices must be compacted");
            for &p in &block.preds {
                assert!((p.0 as usize) < f.blocks.len());
            }
            for &s in &block.succs {
                assert!((s.0 as usize) < f.blocks.len());
            }
        }
    }

    #[test]
    fn straight_line_chains_fuse_fully() {
        let mut module = build(&parse("if c then x = 1 else y = 2 end z = 3").expect("parse")).expect("build");
        let entry = module.entry;
        optimize_blocks(&mut module, entry);
        let f = module.func(module.entry);
        // entry(if) -> then/else -> join; the join fuses into a successor
        // of both branches
        assert!(f.blocks.len() <= 4);
        let entry = &f.blocks[0];
        assert_eq!(entry.succs.len(), 2);
    }

    #[test]
    fn unreachable_blocks_keep_diagnostic_edges() {
        let module = build(&parse("while c do break x = 1 end").expect("parse")).expect("build");
        let f = module.func(module.entry);
        let resume = f.blocks.iter().find(|b| !b.reachable).expect("unreachable block");
        assert!(!resume.un_preds.is_empty());
        assert!(!resume.un_succs.is_empty() || resume.succs.is_empty());
    }
}
