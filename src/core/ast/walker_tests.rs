use super::*;
use crate::core::model::FileRecord;
use crate::lang::registry::GrammarRegistry;

fn metrics(path: &str, source: &str) -> FileMetrics {
    let file = FileRecord::new(path, source);
    let mut registry = GrammarRegistry::new();
    let tree = registry
        .parse(file.language, &file.path, &file.text)
        .expect("parse");
    extract_file_metrics(&file, &tree).expect("metrics")
}

#[test]
fn javascript_decisions_and_else_if_nesting() {
    let source = r#"function check(a, b) {
  if (a && b) {
    for (let i = 0; i < a; i++) {
      if (i > b) { return i; }
    }
  } else if (b) {
    return b;
  }
  return a ? 1 : 0;
}
"#;
    let m = metrics("src/check.js", source);
    assert_eq!(m.functions.len(), 1);
    let f = &m.functions[0];
    assert_eq!(f.name, "check");
    assert_eq!((f.start_line, f.end_line), (1, 10));
    assert_eq!(f.cyclomatic, 7);
    assert_eq!(f.nesting, 3);
    assert_eq!(m.cyclomatic, 7);
    assert_eq!(m.cyclomatic_sum, 7);
    assert_eq!(m.max_nesting, 3);
}

#[test]
fn python_metrics_skip_comment_lines() {
    let source = r#"def classify(items):
    # if this and that or the other
    result = []
    for item in items:
        if item > 10 and item < 20:
            result.append("mid")
        elif item > 20:
            result.append("high")
        else:
            result.append("low")
    return result
"#;
    let m = metrics("pkg/classify.py", source);
    assert_eq!(m.loc, 10);
    let f = &m.functions[0];
    assert_eq!(f.name, "classify");
    assert_eq!(f.cyclomatic, 5);
    assert_eq!(f.nesting, 2);
}

#[test]
fn comment_markers_inside_strings_are_code() {
    let source = "const s = \"// not a comment\";\n// real comment\n/* block\n   comment */\n\nlet x = 1;\n";
    let m = metrics("a.js", source);
    assert_eq!(m.loc, 2);
}

#[test]
fn nested_functions_are_measured_separately() {
    let source = r#"function outer(x) {
  const inner = (y) => {
    if (y) { return 1; }
    return 2;
  };
  return inner(x) || 0;
}
"#;
    let m = metrics("nested.js", source);
    let names: Vec<&str> = m.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["outer", "inner"]);

    let outer = &m.functions[0];
    assert_eq!(outer.cyclomatic, 2);
    assert_eq!(outer.nesting, 0);
    assert_eq!((outer.start_line, outer.end_line), (1, 7));

    let inner = &m.functions[1];
    assert_eq!(inner.cyclomatic, 2);
    assert_eq!(inner.nesting, 1);
    assert_eq!((inner.start_line, inner.end_line), (2, 5));

    assert_eq!(m.cyclomatic, 2);
    assert_eq!(m.cyclomatic_sum, 4);
    assert_eq!(m.hashes.len(), 2);
}

#[test]
fn file_without_functions_reports_baseline() {
    let m = metrics("script.py", "x = 1\nif x:\n    print(x)\n");
    assert!(m.functions.is_empty());
    assert_eq!(m.cyclomatic, 1);
    assert_eq!(m.cyclomatic_sum, 1);
    assert_eq!(m.max_nesting, 0);
    assert_eq!(m.loc, 3);
}

#[test]
fn go_else_if_chain_does_not_add_depth() {
    let source = r#"package main

func grade(n int) string {
	if n > 90 {
		return "a"
	} else if n > 80 {
		return "b"
	} else {
		for i := 0; i < n; i++ {
			if i > 3 && n > 2 {
				return "c"
			}
		}
	}
	return "d"
}
"#;
    let m = metrics("grade.go", source);
    let f = &m.functions[0];
    assert_eq!(f.name, "grade");
    assert_eq!(f.cyclomatic, 6);
    assert_eq!(f.nesting, 3);
}

#[test]
fn rust_match_arms_and_closure_names() {
    let source = r#"fn route(code: u8) -> &'static str {
    let add = |a: u8, b: u8| a + b;
    match add(code, 1) {
        0 => "zero",
        1 => "one",
        _ => "many",
    }
}
"#;
    let m = metrics("src/route.rs", source);
    let names: Vec<&str> = m.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["route", "add"]);
    assert_eq!(m.functions[0].cyclomatic, 4);
    assert_eq!(m.functions[0].nesting, 1);
    assert_eq!(m.functions[1].cyclomatic, 1);
}

#[test]
fn rust_match_guards_add_a_decision() {
    let source = r#"fn f(v: Option<u8>) -> u8 {
    match v {
        Some(n) if n > 2 => n,
        Some(n) => n + 1,
        None => 0,
    }
}
"#;
    let m = metrics("src/f.rs", source);
    assert_eq!(m.functions[0].cyclomatic, 5);
}

#[test]
fn python_with_blocks_do_not_nest() {
    let source = r#"def load(path):
    with open(path) as handle:
        if handle:
            return handle.read()
    return None
"#;
    let m = metrics("pkg/load.py", source);
    assert_eq!(m.functions[0].nesting, 1);
    assert_eq!(m.functions[0].cyclomatic, 2);
}

#[test]
fn anonymous_functions_and_methods_are_named() {
    let source = r#"class Runner {
  run() {
    return [1, 2].map(function (x) { return x; });
  }
}
const handlers = { onClick: () => 1 };
square = lambda_free;
"#;
    let m = metrics("runner.js", source);
    let names: Vec<&str> = m.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["run", "<anonymous@3>", "onClick"]);

    let py = metrics("sq.py", "square = lambda v: v * v\n");
    assert_eq!(py.functions[0].name, "square");
}

#[test]
fn javascript_import_forms() {
    let source = r#"import a from "./a";
import { b } from '../lib/b.js';
const c = require("./c");
export { d } from "./d";
const e = import("./e");
const f = require(name);
"#;
    let m = metrics("src/index.js", source);
    assert_eq!(m.imports, vec!["./a", "../lib/b.js", "./c", "./d", "./e"]);
}

#[test]
fn python_import_forms() {
    let source = r#"import os.path
import numpy as np
from . import sibling
from ..pkg.mod import thing
from .local import x, y
"#;
    let m = metrics("app/main.py", source);
    assert_eq!(
        m.imports,
        vec!["os.path", "numpy", ".sibling", "..pkg.mod", ".local"]
    );
}

#[test]
fn rust_and_go_import_forms() {
    let rust = metrics(
        "src/lib.rs",
        "use crate::graph::{Node, Edge};\nuse std::fmt;\nmod parser;\nmod inline { fn f() {} }\n",
    );
    assert_eq!(
        rust.imports,
        vec!["crate::graph::{Node,Edge}", "std::fmt", "mod parser"]
    );

    let go = metrics(
        "cmd/main.go",
        "package main\n\nimport (\n\t\"fmt\"\n\t\"example.com/app/internal/store\"\n)\n",
    );
    assert_eq!(go.imports, vec!["fmt", "example.com/app/internal/store"]);
}

#[test]
fn body_hash_ignores_names_comments_and_whitespace() {
    let source = r#"function total(items) {
  let sum = 0;
  for (const item of items) { sum += item.price; }
  return sum;
}

function   accumulate(rows) {
  // running tally
  let acc = 0;
  for (const row of rows) {
    acc += row.price;
  }
  return acc;
}

function weighted(rows) {
  let acc = 1;
  for (const row of rows) { acc += row.price; }
  return acc;
}
"#;
    let m = metrics("dup.js", source);
    assert_eq!(m.hashes.len(), 3);
    assert_eq!(m.hashes[0].hash, m.hashes[1].hash);
    assert_ne!(m.hashes[0].hash, m.hashes[2].hash);
    assert_eq!(m.hashes[0].near_hash, m.hashes[2].near_hash);
    assert!(m.hashes[0].node_count >= 12);
}

#[test]
fn malformed_source_reports_error_line() {
    let mut registry = GrammarRegistry::new();
    let file = FileRecord::new("broken.js", "const ok = 1;\nfunction broken( {\n");
    let tree = registry
        .parse(file.language, &file.path, &file.text)
        .unwrap();
    assert!(first_error_line(&tree).is_some());

    let clean = FileRecord::new("clean.js", "const ok = 1;\n");
    let tree = registry
        .parse(clean.language, &clean.path, &clean.text)
        .unwrap();
    assert_eq!(first_error_line(&tree), None);
}
