//! Canonical-format grids: every snippet is already in canonical form, so
//! `print(parse(s))` must reproduce it byte for byte.

use moonlift::{parse, print_chunk};

fn check_all(name: &str, cases: &[&str]) {
    for case in cases {
        let chunk = parse(case).unwrap_or_else(|e| panic!("{name}: parse failed for {case:?}: {e}"));
        let printed = print_chunk(&chunk);
        assert_eq!(&printed, case, "{name}: canonical form drifted");
    }
}

#[test]
fn assignment() {
    check_all("assignment", &["_ = _;\n", "_, _ = _, _;\n"]);
}

#[test]
fn structures() {
    check_all(
        "structures",
        &[
            "while _ do\nend;\n",
            "repeat\nuntil _;\n",
            "for _ = _, _ do\nend;\n",
            "for _ = _, _, _ do\nend;\n",
            "for _ in _ do\nend;\n",
            "for _, _ in _, _ do\nend;\n",
            "if _ then\nend;\n",
            "if _ then\nelse\n\t_ = _;\nend;\n",
            "if _ then\nelseif _ then\n\t_ = _;\nelse\n\t_ = _;\nend;\n",
        ],
    );
}

#[test]
fn terminators() {
    check_all(
        "terminators",
        &[
            "while _ do\n\tbreak;\nend;\n",
            "repeat\n\tbreak;\nuntil _;\n",
            "for _ = _, _ do\n\tbreak;\nend;\n",
            "for _ = _, _, _ do\n\tbreak;\nend;\n",
            "for _ in _ do\n\tbreak;\nend;\n",
            "for _, _ in _, _ do\n\tbreak;\nend;\n",
            "return;\n",
            "return _;\n",
            "return _, _;\n",
        ],
    );
}

#[test]
fn declarations() {
    check_all("declarations", &["local _;\n", "local _ = _;\n", "local _, _ = _, _;\n"]);
}

#[test]
fn expressions() {
    check_all(
        "expressions",
        &["_ = \"\";\n", "_ = 0;\n", "_ = true;\n", "_ = false;\n", "_ = nil;\n"],
    );
}

#[test]
fn arithmetic() {
    check_all(
        "arithmetic",
        &[
            "_ = _ + _;\n",
            "_ = _ - _;\n",
            "_ = _ * _;\n",
            "_ = _ / _;\n",
            "_ = _ % _;\n",
            "_ = _ ^ _;\n",
        ],
    );
}

#[test]
fn relational() {
    check_all(
        "relational",
        &[
            "_ = _ == _;\n",
            "_ = _ ~= _;\n",
            "_ = _ < _;\n",
            "_ = _ <= _;\n",
            "_ = _ > _;\n",
            "_ = _ >= _;\n",
        ],
    );
}

#[test]
fn logical() {
    check_all("logical", &["_ = _ and _;\n", "_ = _ or _;\n", "_ = not _;\n"]);
}

#[test]
fn concatenation_and_length() {
    check_all("concat", &["_ = _ .. _;\n", "_ = #_;\n"]);
}

#[test]
fn tables() {
    check_all(
        "tables",
        &[
            "_ = {};\n",
            "_ = {\n\t_\n};\n",
            "_ = {\n\t_,\n\t_\n};\n",
            "_ = {\n\t_ = {}\n};\n",
            "_ = {\n\t[_] = {}\n};\n",
        ],
    );
}

#[test]
fn calls() {
    check_all(
        "calls",
        &[
            "_();\n",
            "_(_);\n",
            "_(_, _);\n",
            "_:_();\n",
            "_ = _();\n",
            "_ = _(_);\n",
            "_ = _(_, _);\n",
            "_ = _:_();\n",
        ],
    );
}

#[test]
fn definitions() {
    check_all(
        "definitions",
        &[
            "function _()\nend;\n",
            "function _(_)\nend;\n",
            "function _(...)\nend;\n",
            "function _(_, _)\nend;\n",
            "function _(_, ...)\nend;\n",
            "function _._()\nend;\n",
            "function _._(_)\nend;\n",
            "function _._(...)\nend;\n",
            "function _._(_, _)\nend;\n",
            "function _._(_, ...)\nend;\n",
            "function _:_()\nend;\n",
            "function _:_(_)\nend;\n",
            "function _:_(...)\nend;\n",
            "function _:_(_, _)\nend;\n",
            "function _:_(_, ...)\nend;\n",
            "function _._:_()\nend;\n",
            "function _._:_(_)\nend;\n",
            "function _._:_(...)\nend;\n",
            "function _._:_(_, _)\nend;\n",
            "function _._:_(_, ...)\nend;\n",
            "local function _()\nend;\n",
            "local function _(_)\nend;\n",
            "local function _(...)\nend;\n",
            "local function _(_, _)\nend;\n",
            "local function _(_, ...)\nend;\n",
        ],
    );
}

#[test]
fn compound_assignment() {
    check_all(
        "compound",
        &[
            "_ += _;\n",
            "_ -= _;\n",
            "_ *= _;\n",
            "_ /= _;\n",
            "_ %= _;\n",
            "_ ^= _;\n",
            "_ ..= _;\n",
        ],
    );
}

#[test]
fn number_dialects_normalize_to_zero() {
    let numbers = [
        "_ = 0;\n",
        "_ = 0.0;\n",
        "_ = 0.0e0;\n",
        "_ = 0.0e+0;\n",
        "_ = 0.0e-0;\n",
        "_ = 0x0;\n",
        "_ = 0X0;\n",
        "_ = 0x0_0__0;\n",
        "_ = 0b0;\n",
        "_ = 0B0;\n",
        "_ = 0b0_0__0;\n",
        "_ = 0o0;\n",
        "_ = 0O0;\n",
        "_ = 0o0_0__0;\n",
    ];
    for src in numbers {
        let chunk = parse(src).unwrap_or_else(|e| panic!("parse failed for {src:?}: {e}"));
        assert_eq!(print_chunk(&chunk), "_ = 0;\n", "source {src:?}");
    }
}
