//! The arena-backed SSA containers: `Module`, `Function`, `BasicBlock`,
//! locals and globals.

use smallvec::SmallVec;

use super::{dom::DomTree, instr::Instruction};

/// Index of a basic block within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Index of a local in the module's local arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub u32);

/// Index of a global in the module's global arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(pub u32);

/// Index of a function in the module's function arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub u32);

/// Location of an instruction: block plus position within the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrRef {
    pub block: BlockId,
    pub instr: usize,
}

/// A local variable. Owned by its defining function; every other site holds
/// a `LocalId` into the module arena.
#[derive(Debug, Clone)]
pub struct Local {
    /// The source-level name. SSA versions of one source local share it, so
    /// recovery collapses them back into a single printed variable.
    pub name: String,
    pub owner: FuncId,
    /// Block that introduced the local (entry for declarations and
    /// parameters, the loop header for loop variables).
    pub def_block: BlockId,
    /// Captured by a nested function. Escaping locals are not SSA-versioned.
    pub upvalue: bool,
    /// Already introduced by a `local` declaration or parameter list.
    pub declared: bool,
    /// Bound by a `for` header rather than by assignments.
    pub loop_var: bool,
    /// Instructions whose operands mention this local. Populated by
    /// `lift`, consumed by dead-φ pruning.
    pub referrers: Vec<InstrRef>,
}

/// A global variable reference: a name unresolved by any lexical scope.
#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
}

/// A basic block: straight-line instructions plus CFG edges.
///
/// `succs` has length 0 (terminal), 1 (jump or fallthrough) or 2 (branch or
/// loop header). Predecessor order is significant: φ-node edges correspond
/// positionally to `preds`. Edges severed by unreachability marking are kept
/// on `un_preds`/`un_succs` for diagnostics.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub index: BlockId,
    pub comment: &'static str,
    pub instrs: Vec<Instruction>,
    pub preds: SmallVec<[BlockId; 2]>,
    pub succs: SmallVec<[BlockId; 2]>,
    pub un_preds: Vec<BlockId>,
    pub un_succs: Vec<BlockId>,
    pub reachable: bool,
}

impl BasicBlock {
    pub fn new(index: BlockId, comment: &'static str) -> Self {
        Self {
            index,
            comment,
            instrs: Vec::new(),
            preds: SmallVec::new(),
            succs: SmallVec::new(),
            un_preds: Vec::new(),
            un_succs: Vec::new(),
            reachable: true,
        }
    }

    /// Number of φ-nodes at the block prologue. φ-nodes are always a prefix.
    pub fn phi_count(&self) -> usize {
        self.instrs.iter().take_while(|i| i.is_phi()).count()
    }

    /// Index of `p` in the predecessor list.
    pub fn pred_index(&self, p: BlockId) -> Option<usize> {
        self.preds.iter().position(|&x| x == p)
    }

    /// Replaces occurrences of `from` in the predecessor list with `to`.
    pub fn replace_pred(&mut self, from: BlockId, to: BlockId) {
        for pred in &mut self.preds {
            if *pred == from {
                *pred = to;
            }
        }
    }

    /// Replaces occurrences of `from` in the successor list with `to`.
    pub fn replace_succ(&mut self, from: BlockId, to: BlockId) {
        for succ in &mut self.succs {
            if *succ == from {
                *succ = to;
            }
        }
    }

    /// Removes `p` from the predecessor list, striking the matching φ-edge
    /// out of every φ-node so edges stay positionally aligned.
    pub fn remove_pred(&mut self, p: BlockId) {
        let phis = self.phi_count();
        let mut kept = 0;
        for i in 0..self.preds.len() {
            if self.preds[i] != p {
                self.preds[kept] = self.preds[i];
                for instr in &mut self.instrs[..phis] {
                    let Instruction::Phi(phi) = instr else { unreachable!("φ prefix") };
                    phi.edges[kept] = phi.edges[i].clone();
                }
                kept += 1;
            }
        }
        self.preds.truncate(kept);
        for instr in &mut self.instrs[..phis] {
            let Instruction::Phi(phi) = instr else { unreachable!("φ prefix") };
            phi.edges.truncate(kept);
        }
    }
}

/// One function's CFG plus its parameter, local and upvalue lists.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<LocalId>,
    /// Locals owned by this function, in creation order (SSA versions
    /// appended by renaming included).
    pub locals: Vec<LocalId>,
    /// Locals of enclosing functions that this function captures.
    pub upvalues: Vec<LocalId>,
    pub var_arg: bool,
    pub blocks: Vec<BasicBlock>,
    pub nested: Vec<FuncId>,
    /// Value-less `local a, b` declarations at the top of the function,
    /// recorded as groups so recovery can re-emit them verbatim.
    pub decl_groups: Vec<Vec<LocalId>>,
    pub dom: Option<DomTree>,
    pub df: Option<Vec<Vec<BlockId>>>,
}

impl Function {
    pub fn new(name: String) -> Self {
        Self {
            name,
            params: Vec::new(),
            locals: Vec::new(),
            upvalues: Vec::new(),
            var_arg: false,
            blocks: Vec::new(),
            nested: Vec::new(),
            decl_groups: Vec::new(),
            dom: None,
            df: None,
        }
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0 as usize]
    }
}

/// Adds a control-flow edge `from -> to`.
pub fn add_edge(f: &mut Function, from: BlockId, to: BlockId) {
    f.block_mut(from).succs.push(to);
    f.block_mut(to).preds.push(from);
}

/// The whole program: a tree of functions rooted at `entry`, sharing flat
/// arenas for locals and globals.
#[derive(Debug, Clone)]
pub struct Module {
    pub funcs: Vec<Function>,
    pub locals: Vec<Local>,
    pub globals: Vec<Global>,
    pub entry: FuncId,
}

impl Module {
    pub fn func(&self, id: FuncId) -> &Function {
        &self.funcs[id.0 as usize]
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.funcs[id.0 as usize]
    }

    pub fn local(&self, id: LocalId) -> &Local {
        &self.locals[id.0 as usize]
    }

    pub fn local_mut(&mut self, id: LocalId) -> &mut Local {
        &mut self.locals[id.0 as usize]
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.0 as usize]
    }
}
