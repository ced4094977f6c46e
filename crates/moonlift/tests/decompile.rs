//! End-to-end pipeline scenarios: optimization output and SSA round-trips
//! through the public API.

use moonlift::{BeautifyError, Settings, beautify, decompile};
use pretty_assertions::assert_eq;

fn folded(source: &str) -> String {
    beautify(
        source,
        &Settings {
            fold_constants: true,
            ..Settings::default()
        },
    )
    .expect("beautify with folding")
}

#[test]
fn folds_arithmetic_concat_and_logic() {
    let input = "\
local _ = 1+2
local _ = 1-2
local _ = 1*2
local _ = 1/2
local _ = 1%2
local _ = 1^2
local _ = \"a\"..\"z\"
local _ = true and false
local _ = true or false
";
    let expected = "\
local _ = 3;
local _ = -1;
local _ = 2;
local _ = 0.5;
local _ = 1;
local _ = 1;
local _ = \"az\";
local _ = false;
local _ = true;
";
    assert_eq!(folded(input), expected);
}

#[test]
fn while_loop_survives_the_ssa_roundtrip() {
    let src = "local t0,t1=0,1 while t0 do t0=t1 end";
    let plain = beautify(src, &Settings::default()).expect("beautify");
    assert_eq!(decompile(src).expect("decompile"), plain);
    assert_eq!(plain, "local t0, t1 = 0, 1;\nwhile t0 do\n\tt0 = t1;\nend;\n");
}

#[test]
fn elseif_collapses_in_print() {
    let src = "if a then x=1 else if b then x=2 else x=3 end end";
    assert_eq!(
        beautify(src, &Settings::default()).expect("beautify"),
        "if a then\n\tx = 1;\nelseif b then\n\tx = 2;\nelse\n\tx = 3;\nend;\n"
    );
}

#[test]
fn numeric_for_survives_the_ssa_roundtrip() {
    let src = "for i=1,2,3 do t0=1 end";
    assert_eq!(decompile(src).expect("decompile"), "for i = 1, 2, 3 do\n\tt0 = 1;\nend;\n");
}

#[test]
fn local_function_upvalue_form_is_preserved() {
    let src = "local t0 local function t2() t0 = 1 end";
    assert_eq!(
        decompile(src).expect("decompile"),
        "local t0;\nlocal function t2()\n\tt0 = 1;\nend;\n"
    );
}

#[test]
fn repeat_until_with_break_is_preserved() {
    let src = "\
repeat
  t0 = 1
  if t0 then break end
  t0 = 3
until t0
";
    assert_eq!(
        decompile(src).expect("decompile"),
        "repeat\n\tt0 = 1;\n\tif t0 then\n\t\tbreak;\n\tend;\n\tt0 = 3;\nuntil t0;\n"
    );
}

#[test]
fn larger_programs_roundtrip_through_ssa() {
    let sources = [
        "local sum = 0 for i = 1, 10 do sum = sum + i end return sum",
        "local x = 0 while a do if b then x = 1 else x = 2 end x = x + 1 end",
        "for k, v in pairs(t) do if v then r = k end end",
        "local m = 0 local function outer() m = m + 1 local function inner() m = m + 2 end inner() end outer()",
        "repeat x = x + 1 until x > 10",
        "while a do while b do c() end d() end",
    ];
    for src in sources {
        let plain = beautify(src, &Settings::default()).expect("beautify");
        let via_ssa = decompile(src).expect("decompile");
        assert_eq!(via_ssa, plain, "SSA round-trip drifted for {src:?}");
    }
}

#[test]
fn decompile_is_deterministic() {
    let src = "local a = 1 while a < 10 do a = a * 2 if a == 4 then break end end return a";
    let first = decompile(src).expect("decompile");
    let second = decompile(src).expect("decompile");
    assert_eq!(first, second);
}

#[test]
fn goto_fails_with_a_build_error() {
    let err = decompile("::top:: goto top").expect_err("goto is rejected");
    assert!(matches!(err, BeautifyError::Build(_)));
    assert!(err.to_string().contains("unsupported construct"));
}

#[test]
fn fold_then_decompile_composes() {
    let src = "local x = 1 + 2 while x do x = x - 1 end";
    let out = beautify(
        src,
        &Settings {
            fold_constants: true,
            via_ssa: true,
            ..Settings::default()
        },
    )
    .expect("fold + ssa");
    assert_eq!(out, "local x = 3;\nwhile x do\n\tx = x - 1;\nend;\n");
}
