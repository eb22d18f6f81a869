use wabbit::lexer::tokenize;
use wabbit::parser::parse;
use wabbit::wvm::{compile, execute};

fn compile_source(source: &str) -> wabbit::wvm::Program {
	let (tokens, lex_diagnostics) = tokenize(source);
	assert!(lex_diagnostics.is_empty());
	let (program, parse_diagnostics) = parse(tokens).unwrap();
	assert!(parse_diagnostics.is_empty());
	compile(&program).unwrap()
}

fn run_source(source: &str) -> String {
	let compiled = compile_source(source);
	let mut output = Vec::new();
	execute(&compiled, &mut output).unwrap();
	String::from_utf8(output).unwrap()
}

#[test]
fn disassembly_lists_one_instruction_per_line() {
	let compiled = compile_source("print 1 + 2;");
	let listing = compiled.disassemble();
	assert_eq!(listing.lines().count(), compiled.instructions.len());
}

#[test]
fn while_loop_accumulates_a_sum() {
	assert_eq!(run_source("var total = 0; var i = 0; while i < 5 { total = total + i; i = i + 1; } print total;"), "10\n");
}

#[test]
fn global_and_local_slots_do_not_alias() {
	assert_eq!(
		run_source("var x = 10; func shadow(x int) int { return x + 1; } print shadow(5); print x;"),
		"6\n10\n"
	);
}

#[test]
fn float_and_int_globals_use_separate_slot_arrays() {
	assert_eq!(run_source("var a = 1; var b = 2.5; print a; print b;"), "1\n2.5\n");
}
