use wabbit::ast::{BinOp, ExprKind, StmtKind, Type};
use wabbit::lexer::tokenize;
use wabbit::parser::parse;

fn parse_source(source: &str) -> wabbit::ast::Program {
	let (tokens, lex_diagnostics) = tokenize(source);
	assert!(lex_diagnostics.is_empty(), "{lex_diagnostics}");
	let (program, parse_diagnostics) = parse(tokens).unwrap();
	assert!(parse_diagnostics.is_empty(), "{parse_diagnostics}");
	program
}

#[test]
fn binds_multiplication_tighter_than_addition() {
	let program = parse_source("print 2 + 3 * 4;");
	let StmtKind::Print(expr) = &program.statements[0].kind else { panic!("expected a print statement") };
	let ExprKind::Binary(BinOp::Add, left, right) = &expr.kind else { panic!("expected the top operator to be `+`") };
	assert!(matches!(left.kind, ExprKind::Integer(2)));
	assert!(matches!(right.kind, ExprKind::Binary(BinOp::Mul, ..)));
}

#[test]
fn every_node_carries_a_non_degenerate_span() {
	let program = parse_source("var x = 1 + 2;");
	let StmtKind::VarDecl { value: Some(value), .. } = &program.statements[0].kind else { panic!("expected a var decl") };
	assert!(value.span.end_index > value.span.start_index);
}

#[test]
fn function_declaration_records_params_and_return_type() {
	let program = parse_source("func add(x int, y int) int { return x + y; }");
	let StmtKind::FuncDecl { name, params, ret_type, .. } = &program.statements[0].kind else { panic!("expected a func decl") };
	assert_eq!(name, "add");
	assert_eq!(params.len(), 2);
	assert_eq!(params[0].ty, Type::Int);
	assert_eq!(*ret_type, Type::Int);
}

#[test]
fn if_else_parses_both_branches() {
	let program = parse_source("if true { print 1; } else { print 2; }");
	let StmtKind::If { then_branch, else_branch, .. } = &program.statements[0].kind else { panic!("expected an if statement") };
	assert_eq!(then_branch.len(), 1);
	assert!(else_branch.is_some());
}

#[test]
fn missing_semicolon_is_a_parse_error() {
	let (tokens, lex_diagnostics) = tokenize("var x = 1");
	assert!(lex_diagnostics.is_empty());
	assert!(parse(tokens).is_err());
}
