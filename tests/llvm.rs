use wabbit::lexer::tokenize;
use wabbit::llvm::emit;
use wabbit::parser::parse;

fn emit_source(source: &str) -> String {
	let (tokens, lex_diagnostics) = tokenize(source);
	assert!(lex_diagnostics.is_empty());
	let (program, parse_diagnostics) = parse(tokens).unwrap();
	assert!(parse_diagnostics.is_empty());
	emit(&program).unwrap()
}

#[test]
fn emits_a_synthetic_main_and_print_declarations() {
	let ir = emit_source("print 1;");
	assert!(ir.contains("declare void @_printi"));
	assert!(ir.contains("define i32 @main()"));
}

#[test]
fn function_declarations_become_define_blocks() {
	let ir = emit_source("func add(x int, y int) int { return x + y; } print add(1, 2);");
	assert!(ir.contains("define i32 @add(i32 %x.arg, i32 %y.arg)"));
}

#[test]
fn globals_are_zero_initialized_and_stored_in_main() {
	let ir = emit_source("var x = 41 + 1; print x;");
	assert!(ir.contains("@x = global i32 zeroinitializer"));
	assert!(ir.contains("store i32"));
}

#[test]
fn bool_values_lower_to_i1() {
	let ir = emit_source("var flag = true; print flag;");
	assert!(ir.contains("i1"));
}
