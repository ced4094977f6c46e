//! SSA middle end.
//!
//! The pipeline lowers a parsed chunk into a control-flow graph of basic
//! blocks (`builder`), computes dominators and dominance frontiers (`dom`),
//! lifts locals into pruned SSA with φ-nodes (`lift`), and reconstructs
//! structured statements from the graph (`recover`). `blockopt` holds the
//! CFG cleanups (reachability marking, fusion, jump threading, compaction)
//! and `printer` the diagnostic dumps.
//!
//! Everything is arena-allocated: functions, blocks, locals and globals live
//! in flat vectors inside a [`Module`] and refer to each other with integer
//! ids, so the pred/succ and def/use cycles never turn into ownership
//! cycles.

pub use blockopt::{mark_unreachable_blocks, optimize_blocks};
pub use builder::{BuildError, build};
pub use dom::{DomTree, build_dom_frontier, build_dom_tree};
pub use func::{BasicBlock, BlockId, FuncId, Function, GlobalId, InstrRef, Local, LocalId, Module};
pub use instr::{CallTargetValue, CallValue, Instruction, Phi, Value};
pub use lift::lift;
pub use printer::{write_cfg_dot, write_function};
pub use recover::{RecoverError, recover};

mod blockopt;
mod builder;
mod dom;
mod func;
mod instr;
mod lift;
mod printer;
mod recover;
