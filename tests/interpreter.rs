use wabbit::interpreter::run;
use wabbit::lexer::tokenize;
use wabbit::parser::parse;

fn run_source(source: &str) -> anyhow::Result<String> {
	let (tokens, lex_diagnostics) = tokenize(source);
	assert!(lex_diagnostics.is_empty(), "{lex_diagnostics}");
	let (program, parse_diagnostics) = parse(tokens)?;
	assert!(parse_diagnostics.is_empty());
	let mut output = Vec::new();
	run(&program, &mut output)?;
	Ok(String::from_utf8(output).unwrap())
}

#[test]
fn char_print_has_no_trailing_newline_but_other_types_do() {
	let output = run_source("print 'a'; print 1;").unwrap();
	assert_eq!(output, "a1\n");
}

#[test]
fn recursive_function_calls_work() {
	let output = run_source("func fact(n int) int { if n == 0 { return 1; } return n * fact(n - 1); } print fact(5);").unwrap();
	assert_eq!(output, "120\n");
}

#[test]
fn logical_operators_evaluate_both_sides() {
	// Unlike the compiled back-ends, the tree-walking interpreter has no short-circuit.
	let output = run_source("var calls = 0; func bump() bool { calls = calls + 1; return true; } var _r = false && bump(); print calls;").unwrap();
	assert_eq!(output, "1\n");
}

#[test]
fn mixed_type_addition_is_rejected() {
	assert!(run_source("print 1 + 1.0;").is_err());
}

#[test]
fn assigning_to_a_const_is_rejected() {
	assert!(run_source("const x = 1; x = 2;").is_err());
}

#[test]
fn integer_division_by_zero_is_a_runtime_error() {
	assert!(run_source("print 1 / 0;").is_err());
}
