//! Cross-execution-path properties (spec §8): the interpreter and the WVM must agree on
//! stdout for the same program, and every AST node's span must be a real, non-degenerate
//! range. The WAT/LLVM back-ends are checked for successful emission only -- actually
//! running them needs `wat2wasm`/`node`/`clang`, external tools this crate only shells
//! out to (§6.1), not something a test in this repo can assume is installed.

use wabbit::ast::{ExprKind, StmtKind};
use wabbit::interpreter;
use wabbit::lexer::tokenize;
use wabbit::llvm;
use wabbit::parser::parse;
use wabbit::wasm;
use wabbit::wvm;

const PROGRAMS: &[&str] = &[
	"print 2 + 3 * 4;",
	"var total = 0; var i = 0; while i < 5 { total = total + i; i = i + 1; } print total;",
	"func fact(n int) int { if n == 0 { return 1; } return n * fact(n - 1); } print fact(6);",
	"print true && false; print true || false; print !false;",
	"print int(3.9); print float(2); print 7 / 2; print 7.0 / 2.0;",
];

fn build(source: &str) -> wabbit::ast::Program {
	let (tokens, lex_diagnostics) = tokenize(source);
	assert!(lex_diagnostics.is_empty(), "{lex_diagnostics}");
	let (program, parse_diagnostics) = parse(tokens).unwrap();
	assert!(parse_diagnostics.is_empty());
	program
}

#[test]
fn interpreter_and_wvm_agree_on_stdout() {
	for source in PROGRAMS {
		let program = build(source);

		let mut interpreted = Vec::new();
		interpreter::run(&program, &mut interpreted).unwrap();

		let compiled = wvm::compile(&program).unwrap();
		let mut executed = Vec::new();
		wvm::execute(&compiled, &mut executed).unwrap();

		assert_eq!(interpreted, executed, "stdout diverged for program: {source}");
	}
}

#[test]
fn wat_and_llvm_emission_succeed_for_every_program() {
	for source in PROGRAMS {
		let program = build(source);
		assert!(wasm::emit(&program).is_ok(), "WAT emission failed for: {source}");
		assert!(llvm::emit(&program).is_ok(), "LLVM-IR emission failed for: {source}");
	}
}

#[test]
fn every_node_in_a_nontrivial_program_has_a_sane_span() {
	let program = build(
		"func add(x int, y int) int { return x + y; } \
		 var total = add(1, 2); \
		 while total < 10 { total = total + 1; } \
		 print total;",
	);

	fn check_expr(expr: &wabbit::ast::ExprNode) {
		assert!(expr.span.start_line >= 1);
		assert!(expr.span.end_index > expr.span.start_index);
		match &expr.kind {
			ExprKind::Unary(_, inner) | ExprKind::Grouping(inner) => check_expr(inner),
			ExprKind::Binary(_, left, right) => {
				check_expr(left);
				check_expr(right);
			},
			ExprKind::Assignment(target, value) => {
				check_expr(target);
				check_expr(value);
			},
			ExprKind::Call(callee, args) => {
				check_expr(callee);
				args.iter().for_each(check_expr);
			},
			ExprKind::CompoundExpr(statements) => statements.iter().for_each(check_stmt),
			_ => {},
		}
	}

	fn check_stmt(stmt: &wabbit::ast::StmtNode) {
		assert!(stmt.span.start_line >= 1);
		assert!(stmt.span.end_index > stmt.span.start_index);
		match &stmt.kind {
			StmtKind::Print(expr) | StmtKind::ExprStmt(expr) | StmtKind::Return(expr) => check_expr(expr),
			StmtKind::ConstDecl { value, .. } => check_expr(value),
			StmtKind::VarDecl { value, .. } => {
				if let Some(value) = value {
					check_expr(value);
				}
			},
			StmtKind::If { test, then_branch, else_branch } => {
				check_expr(test);
				then_branch.iter().for_each(check_stmt);
				if let Some(else_branch) = else_branch {
					else_branch.iter().for_each(check_stmt);
				}
			},
			StmtKind::While { test, body } => {
				check_expr(test);
				body.iter().for_each(check_stmt);
			},
			StmtKind::FuncDecl { body, .. } => body.iter().for_each(check_stmt),
			StmtKind::Break | StmtKind::Continue => {},
		}
	}

	program.statements.iter().for_each(check_stmt);
}
