//! The parser (§4.2): recursive descent over a bounded token stream.
//!
//! `Parser` owns the cursor (`peek`/`accept`/`expect`, per spec) and the
//! [`NodeIdAllocator`]. Every node-producing function goes through [`Parser::located`],
//! the position-recording frame that captures `(start_line, start_index)` on entry and
//! stamps `(start_line, start_index, end_index)` onto the constructed node on success --
//! `end_index` being the byte index one past the last consumed token, matching §4.2's
//! requirement exactly.

pub mod expressions;
pub mod statements;

use crate::ast::{NodeIdAllocator, Program, Span};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::lexer::{Token, TokenKind};

pub(crate) struct Parser {
	tokens: Vec<Token>,
	position: usize,
	ids: NodeIdAllocator,
	diagnostics: Diagnostics,
}

impl Parser {
	fn new(tokens: Vec<Token>) -> Self {
		Self { tokens, position: 0, ids: NodeIdAllocator::new(), diagnostics: Diagnostics::new() }
	}

	fn current(&self) -> &Token {
		// The lexer always appends a trailing Eof, so this index is always in range.
		&self.tokens[self.position]
	}

	pub(crate) fn current_kind(&self) -> TokenKind {
		self.current().kind
	}

	pub(crate) fn record_parse_error(&mut self, message: impl Into<String>, line: usize) {
		self.diagnostics.push(Diagnostic::parse(message, line));
	}

	/// Returns the lookahead token if its kind matches any of `kinds`, without consuming it.
	pub(crate) fn peek(&self, kinds: &[TokenKind]) -> Option<&Token> {
		let token = self.current();
		kinds.contains(&token.kind).then_some(token)
	}

	/// Consumes and returns the current token if its kind matches any of `kinds`.
	pub(crate) fn accept(&mut self, kinds: &[TokenKind]) -> Option<Token> {
		if self.peek(kinds).is_some() {
			let token = self.tokens[self.position].clone();
			self.position += 1;
			Some(token)
		} else {
			None
		}
	}

	/// Accepts on match, or records a parse error naming the unexpected token and the
	/// expected set (§4.2/§7), returning `Err` without consuming.
	pub(crate) fn expect(&mut self, kinds: &[TokenKind]) -> anyhow::Result<Token> {
		if let Some(token) = self.accept(kinds) {
			return Ok(token);
		}
		let expected = kinds.iter().map(|kind| kind.describe()).collect::<Vec<_>>().join(", ");
		let current = self.current();
		let message = format!("unexpected token {:?} (a {}); expected one of: {expected}", current.text, current.kind.describe());
		self.diagnostics.push(Diagnostic::parse(message.clone(), current.line));
		anyhow::bail!(message)
	}

	/// The `(start_line, start_index)` a position-recording frame captures on entry.
	pub(crate) fn mark(&self) -> (usize, usize) {
		let token = self.current();
		(token.line, token.index)
	}

	/// The byte index one past the last *consumed* token, used as `end_index` when a
	/// node's position-recording frame closes successfully.
	fn end_index(&self) -> usize {
		if self.position == 0 {
			return 0;
		}
		let previous = &self.tokens[self.position - 1];
		previous.index + previous.text.len().max(1)
	}

	pub(crate) fn span_from(&self, mark: (usize, usize)) -> Span {
		Span { start_line: mark.0, start_index: mark.1, end_index: self.end_index() }
	}

	pub(crate) fn next_id(&mut self) -> crate::ast::NodeId {
		self.ids.next()
	}
}

/// Parses a full program (§4.2's `program := statement* EOF`).
pub fn parse(tokens: Vec<Token>) -> anyhow::Result<(Program, Diagnostics)> {
	let mut parser = Parser::new(tokens);
	let mut statements = Vec::new();
	while parser.peek(&[TokenKind::Eof]).is_none() {
		statements.push(statements::parse_statement(&mut parser)?);
	}
	Ok((Program { statements }, parser.diagnostics))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::lexer::tokenize;

	#[test]
	fn every_node_has_a_span_with_sane_bounds() {
		let source = "const pi = 3.14159; var r = 2.0; print 2.0 * pi * r;";
		let (tokens, _) = tokenize(source);
		let (program, diagnostics) = parse(tokens).unwrap();
		assert!(diagnostics.is_empty());

		fn check_expr(expr: &crate::ast::ExprNode) {
			assert!(expr.span.start_line >= 1);
			assert!(expr.span.end_index > expr.span.start_index);
		}
		fn check_stmt(stmt: &crate::ast::StmtNode) {
			assert!(stmt.span.start_line >= 1);
			assert!(stmt.span.end_index > stmt.span.start_index);
			match &stmt.kind {
				crate::ast::StmtKind::Print(expr) | crate::ast::StmtKind::ExprStmt(expr) | crate::ast::StmtKind::Return(expr) => check_expr(expr),
				crate::ast::StmtKind::ConstDecl { value, .. } => check_expr(value),
				crate::ast::StmtKind::VarDecl { value, .. } => {
					if let Some(value) = value {
						check_expr(value);
					}
				},
				_ => {},
			}
		}
		for statement in &program.statements {
			check_stmt(statement);
		}
	}
}
