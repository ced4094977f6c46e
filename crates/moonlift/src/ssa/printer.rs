//! Human-readable SSA dumps: a flat listing per function and a Graphviz
//! rendering of the CFG. Diagnostic output only; nothing here feeds back
//! into the pipeline.

use std::fmt::Write;

use super::{
    func::{FuncId, Module},
    instr::{CallTargetValue, CallValue, Instruction, Value},
};
use crate::{print, quote};

/// Writes a listing of `func` and, first, all functions nested inside it.
pub fn write_function(out: &mut String, module: &Module, func: FuncId) {
    let f = module.func(func);
    for &nested in &f.nested {
        write_function(out, module, nested);
    }

    let _ = write!(out, "\nfunction {}(", f.name);
    for (i, &param) in f.params.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&module.local(param).name);
    }
    if f.var_arg {
        if !f.params.is_empty() {
            out.push_str(", ");
        }
        out.push_str("...");
    }
    let _ = writeln!(out, ")\tlocals:{} upvalues:{}", f.locals.len(), f.upvalues.len());

    for block in &f.blocks {
        let _ = writeln!(
            out,
            "{}:\t{} P:{} S:{}{}",
            block.index.0,
            block.comment,
            block.preds.len(),
            block.succs.len(),
            if block.reachable { "" } else { " unreachable" }
        );
        for instr in &block.instrs {
            let _ = writeln!(out, "\t{}", instr_string(module, instr));
        }
    }
    out.push_str("end\n");
}

/// Writes a `digraph` of the CFG of `func` alone.
pub fn write_cfg_dot(out: &mut String, module: &Module, func: FuncId) {
    let f = module.func(func);
    out.push_str("digraph cfg {\n");
    for block in &f.blocks {
        let mut label = String::new();
        for instr in &block.instrs {
            label.push_str(&instr_string(module, instr));
            label.push_str("\\n");
        }
        let _ = writeln!(
            out,
            "\tn{} [label=\"{}:{}\\n{}\",shape=\"rectangle\"];",
            block.index.0,
            block.index.0,
            block.comment,
            label.replace('"', "\\\"")
        );
        for &pred in &block.preds {
            let _ = writeln!(out, "\tn{} -> n{} [style=\"solid\",weight=100];", pred.0, block.index.0);
        }
    }
    out.push_str("}\n");
}

fn value_string(module: &Module, value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_owned(),
        Value::True => "true".to_owned(),
        Value::False => "false".to_owned(),
        Value::VarArg => "...".to_owned(),
        Value::Number(n) => print::number(*n),
        Value::Str(bytes) => quote::quote(bytes),
        Value::Local(id) => format!("{}.{}", module.local(*id).name, id.0),
        Value::Global(id) => module.global(*id).name.clone(),
        Value::AttrGet { object, key } => {
            format!("{}[{}]", value_string(module, object), value_string(module, key))
        }
        Value::Table(fields) => {
            let mut out = String::from("{");
            for (i, field) in fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if let Some(key) = &field.key {
                    let _ = write!(out, "[{}] = ", value_string(module, key));
                }
                out.push_str(&value_string(module, &field.value));
            }
            out.push('}');
            out
        }
        Value::Arith { op, lhs, rhs } => {
            format!("{} {op} {}", value_string(module, lhs), value_string(module, rhs))
        }
        Value::Concat { lhs, rhs } => {
            format!("{} .. {}", value_string(module, lhs), value_string(module, rhs))
        }
        Value::Relation { op, lhs, rhs } => {
            format!("{} {op} {}", value_string(module, lhs), value_string(module, rhs))
        }
        Value::Logic { op, lhs, rhs } => {
            format!("{} {op} {}", value_string(module, lhs), value_string(module, rhs))
        }
        Value::Unary { op, value } => format!("{op}{}", value_string(module, value)),
        Value::Call(call) => call_string(module, call),
        Value::Function(id) => format!("function {}", module.func(*id).name),
    }
}

fn call_string(module: &Module, call: &CallValue) -> String {
    let mut out = match &call.target {
        CallTargetValue::Function(callee) => value_string(module, callee),
        CallTargetValue::Method { receiver, name } => {
            format!("{}:{name}", value_string(module, receiver))
        }
    };
    out.push('(');
    for (i, arg) in call.args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&value_string(module, arg));
    }
    out.push(')');
    out
}

fn list_string(module: &Module, values: &[Value]) -> String {
    values
        .iter()
        .map(|v| value_string(module, v))
        .collect::<Vec<_>>()
        .join(", ")
}

fn instr_string(module: &Module, instr: &Instruction) -> String {
    match instr {
        Instruction::Assign { lhs, rhs } => {
            format!("{} = {}", list_string(module, lhs), list_string(module, rhs))
        }
        Instruction::CompoundAssign { op, lhs, rhs } => {
            format!("{} {op} {}", list_string(module, lhs), list_string(module, rhs))
        }
        Instruction::Call(call) => call_string(module, call),
        Instruction::Return { values } => {
            if values.is_empty() {
                "return".to_owned()
            } else {
                format!("return {}", list_string(module, values))
            }
        }
        Instruction::If { cond } => format!("if {}", value_string(module, cond)),
        Instruction::Jump => "jump".to_owned(),
        Instruction::NumberFor {
            local,
            init,
            limit,
            step,
        } => {
            let mut out = format!(
                "for {}.{} = {}, {}",
                module.local(*local).name,
                local.0,
                value_string(module, init),
                value_string(module, limit)
            );
            if let Some(step) = step {
                let _ = write!(out, ", {}", value_string(module, step));
            }
            out
        }
        Instruction::GenericFor { locals, values } => {
            let names = locals
                .iter()
                .map(|l| format!("{}.{}", module.local(*l).name, l.0))
                .collect::<Vec<_>>()
                .join(", ");
            format!("for {names} in {}", list_string(module, values))
        }
        Instruction::Phi(phi) => {
            format!("{}.{} = phi [{}]", phi.name, phi.target.0, list_string(module, &phi.edges))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse::parse, ssa::build};

    #[test]
    fn listing_mentions_blocks_and_phis() {
        let module = build(&parse("local t0, t1 = 0, 1 while t0 do t0 = t1 end").expect("parse")).expect("build");
        let mut out = String::new();
        write_function(&mut out, &module, module.entry);
        assert!(out.contains("function main"));
        assert!(out.contains("while.loop"));
        assert!(out.contains("= phi ["));
        assert!(out.contains("jump"));
    }

    #[test]
    fn dot_output_is_a_digraph() {
        let module = build(&parse("if c then x = 1 end").expect("parse")).expect("build");
        let mut out = String::new();
        write_cfg_dot(&mut out, &module, module.entry);
        assert!(out.starts_with("digraph cfg {"));
        assert!(out.trim_end().ends_with('}'));
        assert!(out.contains("n0 -> n1") || out.contains("n0 -> n2"));
    }
}
