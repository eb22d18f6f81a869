use wabbit::lexer::tokenize;
use wabbit::parser::parse;
use wabbit::wasm::emit;

fn emit_source(source: &str) -> String {
	let (tokens, lex_diagnostics) = tokenize(source);
	assert!(lex_diagnostics.is_empty());
	let (program, parse_diagnostics) = parse(tokens).unwrap();
	assert!(parse_diagnostics.is_empty());
	emit(&program).unwrap()
}

#[test]
fn emits_a_module_with_balanced_parens() {
	let wat = emit_source("var x = 1; print x;");
	assert!(wat.trim_start().starts_with("(module"));
	let opens = wat.matches('(').count();
	let closes = wat.matches(')').count();
	assert_eq!(opens, closes);
}

#[test]
fn function_declarations_become_exported_funcs() {
	let wat = emit_source("func add(x int, y int) int { return x + y; } print add(1, 2);");
	assert!(wat.contains("(func $add"));
	assert!(wat.contains("(export \"add\")"));
}

#[test]
fn float_globals_use_f64() {
	let wat = emit_source("var pi = 3.14; print pi;");
	assert!(wat.contains("f64"));
}

#[test]
fn rejects_mismatched_operand_types() {
	let (tokens, _) = tokenize("print 1 + 1.0;");
	let (program, _) = parse(tokens).unwrap();
	assert!(emit(&program).is_err());
}
