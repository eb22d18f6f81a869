//! The expression grammar (§4.2), precedence low to high:
//! `assign -> or -> and -> rel -> add -> mul -> unary -> primary`.
//!
//! Assignment is right-associative; comparisons, logical operators, and the arithmetic
//! tiers are left-associative, implemented the standard precedence-climbing way: each
//! tier loops consuming same-precedence operators after parsing one operand from the
//! tier above.

use super::statements::parse_statement;
use super::Parser;
use crate::ast::{BinOp, ExprKind, ExprNode, UnaryOp};
use crate::lexer::TokenKind;

pub(crate) fn parse_expr(parser: &mut Parser) -> anyhow::Result<ExprNode> {
	parse_assign(parser)
}

fn parse_assign(parser: &mut Parser) -> anyhow::Result<ExprNode> {
	let mark = parser.mark();
	let target = parse_or(parser)?;
	if parser.accept(&[TokenKind::Assign]).is_some() {
		let value = parse_assign(parser)?;
		let id = parser.next_id();
		return Ok(ExprNode {
			id,
			span: parser.span_from(mark),
			kind: ExprKind::Assignment(Box::new(target), Box::new(value)),
		});
	}
	Ok(target)
}

fn parse_or(parser: &mut Parser) -> anyhow::Result<ExprNode> {
	let mark = parser.mark();
	let mut left = parse_and(parser)?;
	while parser.accept(&[TokenKind::Lor]).is_some() {
		let right = parse_and(parser)?;
		let id = parser.next_id();
		left = ExprNode { id, span: parser.span_from(mark), kind: ExprKind::Binary(BinOp::LogOr, Box::new(left), Box::new(right)) };
	}
	Ok(left)
}

fn parse_and(parser: &mut Parser) -> anyhow::Result<ExprNode> {
	let mark = parser.mark();
	let mut left = parse_rel(parser)?;
	while parser.accept(&[TokenKind::Land]).is_some() {
		let right = parse_rel(parser)?;
		let id = parser.next_id();
		left = ExprNode { id, span: parser.span_from(mark), kind: ExprKind::Binary(BinOp::LogAnd, Box::new(left), Box::new(right)) };
	}
	Ok(left)
}

fn parse_rel(parser: &mut Parser) -> anyhow::Result<ExprNode> {
	let mark = parser.mark();
	let mut left = parse_add(parser)?;
	loop {
		let operator = match parser.accept(&[TokenKind::Lt, TokenKind::Le, TokenKind::Gt, TokenKind::Ge, TokenKind::Eq, TokenKind::Ne]) {
			Some(token) => token,
			None => break,
		};
		let op = match operator.kind {
			TokenKind::Lt => BinOp::Lt,
			TokenKind::Le => BinOp::Le,
			TokenKind::Gt => BinOp::Gt,
			TokenKind::Ge => BinOp::Ge,
			TokenKind::Eq => BinOp::Eq,
			TokenKind::Ne => BinOp::Ne,
			_ => unreachable!("accept() only returns tokens from the requested kind set"),
		};
		let right = parse_add(parser)?;
		let id = parser.next_id();
		left = ExprNode { id, span: parser.span_from(mark), kind: ExprKind::Binary(op, Box::new(left), Box::new(right)) };
	}
	Ok(left)
}

fn parse_add(parser: &mut Parser) -> anyhow::Result<ExprNode> {
	let mark = parser.mark();
	let mut left = parse_mul(parser)?;
	loop {
		let operator = match parser.accept(&[TokenKind::Plus, TokenKind::Minus]) {
			Some(token) => token,
			None => break,
		};
		let op = if operator.kind == TokenKind::Plus { BinOp::Add } else { BinOp::Sub };
		let right = parse_mul(parser)?;
		let id = parser.next_id();
		left = ExprNode { id, span: parser.span_from(mark), kind: ExprKind::Binary(op, Box::new(left), Box::new(right)) };
	}
	Ok(left)
}

fn parse_mul(parser: &mut Parser) -> anyhow::Result<ExprNode> {
	let mark = parser.mark();
	let mut left = parse_unary(parser)?;
	loop {
		let operator = match parser.accept(&[TokenKind::Times, TokenKind::Divide]) {
			Some(token) => token,
			None => break,
		};
		let op = if operator.kind == TokenKind::Times { BinOp::Mul } else { BinOp::Div };
		let right = parse_unary(parser)?;
		let id = parser.next_id();
		left = ExprNode { id, span: parser.span_from(mark), kind: ExprKind::Binary(op, Box::new(left), Box::new(right)) };
	}
	Ok(left)
}

fn parse_unary(parser: &mut Parser) -> anyhow::Result<ExprNode> {
	let mark = parser.mark();
	if let Some(operator) = parser.accept(&[TokenKind::Plus, TokenKind::Minus, TokenKind::Lnot]) {
		let op = match operator.kind {
			TokenKind::Plus => UnaryOp::Pos,
			TokenKind::Minus => UnaryOp::Neg,
			TokenKind::Lnot => UnaryOp::Not,
			_ => unreachable!("accept() only returns tokens from the requested kind set"),
		};
		let operand = parse_unary(parser)?;
		let id = parser.next_id();
		return Ok(ExprNode { id, span: parser.span_from(mark), kind: ExprKind::Unary(op, Box::new(operand)) });
	}
	parse_primary(parser)
}

fn parse_primary(parser: &mut Parser) -> anyhow::Result<ExprNode> {
	let mark = parser.mark();

	if let Some(token) = parser.accept(&[TokenKind::Integer]) {
		let value = token.text.parse::<i64>().map_err(|error| anyhow::anyhow!("invalid integer literal {:?}: {error}", token.text))?;
		let id = parser.next_id();
		return Ok(ExprNode { id, span: parser.span_from(mark), kind: ExprKind::Integer(value) });
	}
	if let Some(token) = parser.accept(&[TokenKind::Float]) {
		let value = token.text.parse::<f64>().map_err(|error| anyhow::anyhow!("invalid float literal {:?}: {error}", token.text))?;
		let id = parser.next_id();
		return Ok(ExprNode { id, span: parser.span_from(mark), kind: ExprKind::Float(value) });
	}
	if let Some(token) = parser.accept(&[TokenKind::Char]) {
		let value = token.text.chars().next().unwrap_or('\0');
		let id = parser.next_id();
		return Ok(ExprNode { id, span: parser.span_from(mark), kind: ExprKind::Character(value) });
	}
	if parser.accept(&[TokenKind::True]).is_some() {
		let id = parser.next_id();
		return Ok(ExprNode { id, span: parser.span_from(mark), kind: ExprKind::BoolLit(true) });
	}
	if parser.accept(&[TokenKind::False]).is_some() {
		let id = parser.next_id();
		return Ok(ExprNode { id, span: parser.span_from(mark), kind: ExprKind::BoolLit(false) });
	}
	if parser.accept(&[TokenKind::LParen]).is_some() {
		let inner = parse_expr(parser)?;
		parser.expect(&[TokenKind::RParen])?;
		let id = parser.next_id();
		return Ok(ExprNode { id, span: parser.span_from(mark), kind: ExprKind::Grouping(Box::new(inner)) });
	}
	if parser.accept(&[TokenKind::LBrace]).is_some() {
		let mut statements = Vec::new();
		while parser.peek(&[TokenKind::RBrace]).is_none() {
			statements.push(parse_statement(parser)?);
		}
		parser.expect(&[TokenKind::RBrace])?;
		if statements.is_empty() {
			anyhow::bail!("a compound expression `{{ ... }}` must contain at least one statement, ending in an expression statement");
		}
		if !matches!(statements.last().expect("checked non-empty above").kind, crate::ast::StmtKind::ExprStmt(_)) {
			anyhow::bail!("the final statement of a compound expression must be an expression statement");
		}
		let id = parser.next_id();
		return Ok(ExprNode { id, span: parser.span_from(mark), kind: ExprKind::CompoundExpr(statements) });
	}
	if let Some(token) = parser.accept(&[TokenKind::Id]) {
		let name = token.text;
		let id = parser.next_id();
		let mut node = ExprNode { id, span: parser.span_from(mark), kind: ExprKind::Name(name) };
		if parser.accept(&[TokenKind::LParen]).is_some() {
			let mut args = Vec::new();
			if parser.peek(&[TokenKind::RParen]).is_none() {
				loop {
					args.push(parse_expr(parser)?);
					if parser.accept(&[TokenKind::Comma]).is_none() {
						break;
					}
				}
			}
			parser.expect(&[TokenKind::RParen])?;
			let call_id = parser.next_id();
			node = ExprNode { id: call_id, span: parser.span_from(mark), kind: ExprKind::Call(Box::new(node), args) };
		}
		return Ok(node);
	}

	let kind = parser.current_kind();
	let text = parser.peek(&[kind]).expect("peek with the current token's own kind always matches").text.clone();
	let line = parser.peek(&[kind]).expect("peek with the current token's own kind always matches").line;
	let message = format!("unexpected token {text:?} (a {}) while parsing an expression", kind.describe());
	parser.record_parse_error(message.clone(), line);
	anyhow::bail!(message)
}
