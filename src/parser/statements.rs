//! The statement grammar (§4.2): one parse function per alternative of `statement`,
//! dispatched on the lookahead keyword.

use super::expressions::parse_expr;
use super::Parser;
use crate::ast::{Param, StmtKind, StmtNode, Type};
use crate::lexer::TokenKind;

pub(crate) fn parse_statement(parser: &mut Parser) -> anyhow::Result<StmtNode> {
	match parser.current_kind() {
		TokenKind::Print => parse_print(parser),
		TokenKind::Const => parse_const_decl(parser),
		TokenKind::Var => parse_var_decl(parser),
		TokenKind::If => parse_if(parser),
		TokenKind::While => parse_while(parser),
		TokenKind::Break => parse_break(parser),
		TokenKind::Continue => parse_continue(parser),
		TokenKind::Return => parse_return(parser),
		TokenKind::Func => parse_func_decl(parser),
		_ => parse_expr_stmt(parser),
	}
}

fn parse_block(parser: &mut Parser) -> anyhow::Result<Vec<StmtNode>> {
	parser.expect(&[TokenKind::LBrace])?;
	let mut statements = Vec::new();
	while parser.peek(&[TokenKind::RBrace]).is_none() {
		statements.push(parse_statement(parser)?);
	}
	parser.expect(&[TokenKind::RBrace])?;
	Ok(statements)
}

fn parse_print(parser: &mut Parser) -> anyhow::Result<StmtNode> {
	let mark = parser.mark();
	parser.expect(&[TokenKind::Print])?;
	let value = parse_expr(parser)?;
	parser.expect(&[TokenKind::Semi])?;
	let id = parser.next_id();
	Ok(StmtNode { id, span: parser.span_from(mark), kind: StmtKind::Print(value) })
}

fn parse_optional_type(parser: &mut Parser) -> Option<Type> {
	let token = parser.accept(&[TokenKind::Id])?;
	match Type::from_name(&token.text) {
		Some(ty) => Some(ty),
		None => {
			parser.record_parse_error(format!("{:?} is not a valid type name", token.text), token.line);
			None
		},
	}
}

fn parse_const_decl(parser: &mut Parser) -> anyhow::Result<StmtNode> {
	let mark = parser.mark();
	parser.expect(&[TokenKind::Const])?;
	let name = parser.expect(&[TokenKind::Id])?.text;
	let ty = peek_type_before_assign(parser).then(|| parse_optional_type(parser)).flatten();
	parser.expect(&[TokenKind::Assign])?;
	let value = parse_expr(parser)?;
	parser.expect(&[TokenKind::Semi])?;
	let id = parser.next_id();
	Ok(StmtNode { id, span: parser.span_from(mark), kind: StmtKind::ConstDecl { name, ty, value } })
}

fn parse_var_decl(parser: &mut Parser) -> anyhow::Result<StmtNode> {
	let mark = parser.mark();
	parser.expect(&[TokenKind::Var])?;
	let name = parser.expect(&[TokenKind::Id])?.text;
	let ty = peek_type_before_assign(parser).then(|| parse_optional_type(parser)).flatten();
	let value = if parser.accept(&[TokenKind::Assign]).is_some() { Some(parse_expr(parser)?) } else { None };
	parser.expect(&[TokenKind::Semi])?;
	let id = parser.next_id();
	Ok(StmtNode { id, span: parser.span_from(mark), kind: StmtKind::VarDecl { name, ty, value } })
}

/// `const`/`var` declarations carry an *optional* type name before the `=`/`;`. Since the
/// type and the initializer are both introduced by a bare `ID`/`=` respectively, a type
/// name is present exactly when the next token is an `Id` (the initializer always starts
/// with `=`, never with an identifier in this position).
fn peek_type_before_assign(parser: &Parser) -> bool {
	parser.peek(&[TokenKind::Id]).is_some()
}

fn parse_if(parser: &mut Parser) -> anyhow::Result<StmtNode> {
	let mark = parser.mark();
	parser.expect(&[TokenKind::If])?;
	let test = parse_expr(parser)?;
	let then_branch = parse_block(parser)?;
	let else_branch = if parser.accept(&[TokenKind::Else]).is_some() { Some(parse_block(parser)?) } else { None };
	let id = parser.next_id();
	Ok(StmtNode { id, span: parser.span_from(mark), kind: StmtKind::If { test, then_branch, else_branch } })
}

fn parse_while(parser: &mut Parser) -> anyhow::Result<StmtNode> {
	let mark = parser.mark();
	parser.expect(&[TokenKind::While])?;
	let test = parse_expr(parser)?;
	let body = parse_block(parser)?;
	let id = parser.next_id();
	Ok(StmtNode { id, span: parser.span_from(mark), kind: StmtKind::While { test, body } })
}

fn parse_break(parser: &mut Parser) -> anyhow::Result<StmtNode> {
	let mark = parser.mark();
	parser.expect(&[TokenKind::Break])?;
	parser.expect(&[TokenKind::Semi])?;
	let id = parser.next_id();
	Ok(StmtNode { id, span: parser.span_from(mark), kind: StmtKind::Break })
}

fn parse_continue(parser: &mut Parser) -> anyhow::Result<StmtNode> {
	let mark = parser.mark();
	parser.expect(&[TokenKind::Continue])?;
	parser.expect(&[TokenKind::Semi])?;
	let id = parser.next_id();
	Ok(StmtNode { id, span: parser.span_from(mark), kind: StmtKind::Continue })
}

fn parse_return(parser: &mut Parser) -> anyhow::Result<StmtNode> {
	let mark = parser.mark();
	parser.expect(&[TokenKind::Return])?;
	let value = parse_expr(parser)?;
	parser.expect(&[TokenKind::Semi])?;
	let id = parser.next_id();
	Ok(StmtNode { id, span: parser.span_from(mark), kind: StmtKind::Return(value) })
}

fn parse_param(parser: &mut Parser) -> anyhow::Result<Param> {
	let name = parser.expect(&[TokenKind::Id])?.text;
	let type_token = parser.expect(&[TokenKind::Id])?;
	let ty = Type::from_name(&type_token.text).ok_or_else(|| anyhow::anyhow!("{:?} is not a valid parameter type", type_token.text))?;
	Ok(Param { name, ty })
}

fn parse_func_decl(parser: &mut Parser) -> anyhow::Result<StmtNode> {
	let mark = parser.mark();
	parser.expect(&[TokenKind::Func])?;
	let name = parser.expect(&[TokenKind::Id])?.text;
	parser.expect(&[TokenKind::LParen])?;
	let mut params = Vec::new();
	if parser.peek(&[TokenKind::RParen]).is_none() {
		loop {
			params.push(parse_param(parser)?);
			if parser.accept(&[TokenKind::Comma]).is_none() {
				break;
			}
		}
	}
	parser.expect(&[TokenKind::RParen])?;
	let ret_type_token = parser.expect(&[TokenKind::Id])?;
	let ret_type = Type::from_name(&ret_type_token.text).ok_or_else(|| anyhow::anyhow!("{:?} is not a valid return type", ret_type_token.text))?;
	let body = parse_block(parser)?;
	let id = parser.next_id();
	Ok(StmtNode { id, span: parser.span_from(mark), kind: StmtKind::FuncDecl { name, params, ret_type, body } })
}

fn parse_expr_stmt(parser: &mut Parser) -> anyhow::Result<StmtNode> {
	let mark = parser.mark();
	let expr = parse_expr(parser)?;
	parser.expect(&[TokenKind::Semi])?;
	let id = parser.next_id();
	Ok(StmtNode { id, span: parser.span_from(mark), kind: StmtKind::ExprStmt(expr) })
}
