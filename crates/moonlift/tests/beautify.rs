//! End-to-end properties of the plain beautifier: round-trip stability,
//! printer idempotence, and byte-exact string escaping.

use moonlift::{
    ast::{Expr, Stmt},
    parse, print_chunk,
};
use pretty_assertions::assert_eq;

const CORPUS: &[&str] = &[
    "local a, b = 1, 2 while a do a = a - 1 b = b + a end return b",
    "local t = {1, 2, x = 3, [\"end\"] = 4, [5] = 6}",
    "if a then f(1) elseif b then g(2) else h(3) end",
    "for i = 1, #t do t[i] = t[i] * 2 end",
    "for k, v in pairs(t) do print(k, v) end",
    "repeat local line = read() until line == nil",
    "local function fib(n) if n < 2 then return n end return fib(n - 1) + fib(n - 2) end",
    "function obj:method(a, ...) return self.field, a, ... end",
    "x = a and b or c",
    "x = -a ^ 2 .. \"s\" .. #t",
    "x = (f())",
    "s = \"quote \\\" backslash \\\\ newline \\n\"",
    "local co = coroutine.wrap(function() yield(1) end)",
    "do local scoped = 1 end",
    "x += 1 s ..= \"tail\"",
];

/// `parse(print(parse(s)))` equals `parse(s)` structurally.
#[test]
fn reparse_is_structurally_stable() {
    for src in CORPUS {
        let first = parse(src).unwrap_or_else(|e| panic!("parse failed for {src:?}: {e}"));
        let printed = print_chunk(&first);
        let second = parse(&printed).unwrap_or_else(|e| panic!("re-parse failed for {printed:?}: {e}"));
        assert_eq!(first, second, "tree changed across print for {src:?}");
    }
}

/// `print(parse(print(parse(s))))` equals `print(parse(s))`.
#[test]
fn printing_is_idempotent() {
    for src in CORPUS {
        let once = print_chunk(&parse(src).expect("parse"));
        let twice = print_chunk(&parse(&once).expect("re-parse"));
        assert_eq!(once, twice, "printing not a fixpoint for {src:?}");
    }
}

/// Every byte value 0..=255 survives print → parse unchanged.
#[test]
fn string_bytes_roundtrip_exactly() {
    let all_bytes: Vec<u8> = (0..=255).collect();
    let chunk = vec![Stmt::LocalAssign {
        names: vec!["_".to_owned()],
        exprs: vec![Expr::Str(all_bytes.clone())],
    }];
    let printed = print_chunk(&chunk);
    let reparsed = parse(&printed).expect("quoted bytes must re-lex");
    let Stmt::LocalAssign { exprs, .. } = &reparsed[0] else {
        panic!("expected the declaration back");
    };
    let Expr::Str(bytes) = &exprs[0] else { panic!("expected a string literal") };
    assert_eq!(bytes, &all_bytes);
}

/// Escaped digits stay unambiguous even when literal digits follow.
#[test]
fn digit_padding_preserves_boundaries() {
    for bytes in [vec![1, b'2', b'3'], vec![0, b'0'], vec![255, b'9'], vec![7, b'a', 8]] {
        let chunk = vec![Stmt::LocalAssign {
            names: vec!["_".to_owned()],
            exprs: vec![Expr::Str(bytes.clone())],
        }];
        let printed = print_chunk(&chunk);
        let reparsed = parse(&printed).expect("re-parse");
        let Stmt::LocalAssign { exprs, .. } = &reparsed[0] else { panic!() };
        let Expr::Str(out) = &exprs[0] else { panic!() };
        assert_eq!(out, &bytes, "bytes drifted through {printed:?}");
    }
}

/// Reserved words used as table keys print in bracket form and survive.
#[test]
fn reserved_word_keys_roundtrip() {
    let src = "t = {[\"end\"] = 1, [\"while\"] = 2, ok = 3}";
    let printed = print_chunk(&parse(src).expect("parse"));
    assert!(printed.contains("[\"end\"]"));
    assert!(printed.contains("[\"while\"]"));
    assert!(printed.contains("\tok = 3"));
    let reparsed = parse(&printed).expect("re-parse");
    assert_eq!(parse(src).expect("parse"), reparsed);
}

/// A trailing comma in a table constructor is dropped without losing
/// fields.
#[test]
fn trailing_comma_normalizes() {
    let with = parse("t = {1, 2, 3,}").expect("parse");
    let without = parse("t = {1, 2, 3}").expect("parse");
    assert_eq!(with, without);
    assert_eq!(print_chunk(&with), print_chunk(&without));
}
