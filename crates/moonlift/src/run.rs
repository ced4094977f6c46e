//! Pipeline entry points: parse → optimize? → print, with an optional
//! detour through the SSA middle end, plus the diagnostic dump helpers the
//! CLI exposes.

use crate::{
    error::BeautifyError,
    optimize, parse, print,
    ssa::{self, recover},
};

/// Pipeline configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Settings {
    /// Run constant folding and propagation before printing.
    pub fold_constants: bool,
    /// Rename every declared local to a fresh `L_<n>_` name.
    pub rename_locals: bool,
    /// Route the chunk through SSA construction and structural recovery
    /// instead of printing the parsed tree directly.
    pub via_ssa: bool,
}

/// Reformats `source` into canonical text according to `settings`.
pub fn beautify(source: &str, settings: &Settings) -> Result<String, BeautifyError> {
    let mut chunk = parse::parse(source)?;
    if settings.fold_constants {
        optimize::optimize(&mut chunk);
    }
    if settings.rename_locals {
        optimize::rename_locals(&mut chunk);
    }
    if settings.via_ssa {
        let module = ssa::build(&chunk)?;
        chunk = recover(&module)?;
    }
    Ok(print::print_chunk(&chunk))
}

/// Round-trips `source` through the full SSA pipeline:
/// parse → build → lift → recover → print.
pub fn decompile(source: &str) -> Result<String, BeautifyError> {
    beautify(
        source,
        &Settings {
            via_ssa: true,
            ..Settings::default()
        },
    )
}

/// Parses `source` and serializes the tree as JSON.
pub fn dump_ast(source: &str) -> Result<String, BeautifyError> {
    let chunk = parse::parse(source)?;
    Ok(serde_json::to_string_pretty(&chunk).expect("AST serialization is infallible"))
}

/// Parses and lowers `source`, returning the SSA listing of every function.
pub fn dump_ssa(source: &str) -> Result<String, BeautifyError> {
    let module = ssa::build(&parse::parse(source)?)?;
    let mut out = String::new();
    ssa::write_function(&mut out, &module, module.entry);
    Ok(out)
}

/// Parses and lowers `source`, returning the entry function's CFG in
/// Graphviz dot syntax.
pub fn dump_cfg_dot(source: &str) -> Result<String, BeautifyError> {
    let module = ssa::build(&parse::parse(source)?)?;
    let mut out = String::new();
    ssa::write_cfg_dot(&mut out, &module, module.entry);
    Ok(out)
}
