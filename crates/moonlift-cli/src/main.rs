use std::{env, fs, process::ExitCode};

use moonlift::{Settings, beautify, dump_ast, dump_cfg_dot, dump_ssa};

const USAGE: &str = "usage: moonlift [options] <file>
options:
  --fold       fold constants and propagate locals before printing
  --rename     rename declared locals to fresh L_<n>_ names
  --ssa        round-trip through the SSA pipeline (decompile)
  --dump-ast   print the parsed tree as JSON and exit
  --dump-ssa   print the SSA listing and exit
  --dot        print the entry CFG in Graphviz dot syntax and exit";

enum Mode {
    Beautify,
    DumpAst,
    DumpSsa,
    DumpDot,
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut settings = Settings::default();
    let mut mode = Mode::Beautify;
    let mut file: Option<&str> = None;

    for arg in &args {
        match arg.as_str() {
            "--fold" => settings.fold_constants = true,
            "--rename" => settings.rename_locals = true,
            "--ssa" => settings.via_ssa = true,
            "--dump-ast" => mode = Mode::DumpAst,
            "--dump-ssa" => mode = Mode::DumpSsa,
            "--dot" => mode = Mode::DumpDot,
            "--help" | "-h" => {
                println!("{USAGE}");
                return ExitCode::SUCCESS;
            }
            other if other.starts_with('-') => {
                eprintln!("unknown option: {other}\n{USAGE}");
                return ExitCode::FAILURE;
            }
            other => {
                if file.is_some() {
                    eprintln!("more than one input file\n{USAGE}");
                    return ExitCode::FAILURE;
                }
                file = Some(other);
            }
        }
    }

    let Some(path) = file else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error reading {path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let result = match mode {
        Mode::Beautify => beautify(&source, &settings),
        Mode::DumpAst => dump_ast(&source),
        Mode::DumpSsa => dump_ssa(&source),
        Mode::DumpDot => dump_cfg_dot(&source),
    };

    match result {
        Ok(output) => {
            print!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
