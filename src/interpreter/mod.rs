//! The tree-walking interpreter (§4.3): a direct recursive walk over the AST that
//! produces observable output (stdout lines from `print`) and returns nothing else.

pub mod value;

use std::io::Write as _;
use std::rc::Rc;

use crate::ast::{BinOp, ExprKind, ExprNode, Program, StmtKind, StmtNode, Type, UnaryOp};
use crate::scopes::Scope;

use value::{Binding, BindingKind, Flow, FuncValue, Value};

/// Runs `program`, writing every `print`ed line to `output` (§4.3/§6.3).
pub fn run(program: &Program, mut output: impl std::io::Write) -> anyhow::Result<()> {
	let globals = Scope::root();
	let mut interpreter = Interpreter { output: &mut output };
	match interpreter.execute_block(&program.statements, &globals)? {
		Flow::Normal(_) => Ok(()),
		Flow::Break | Flow::Continue => anyhow::bail!("`break`/`continue` outside of an enclosing `while` loop"),
		Flow::Return(_) => Ok(()),
	}
}

struct Interpreter<'out, W> {
	output: &'out mut W,
}

impl<W: std::io::Write> Interpreter<'_, W> {
	/// Executes each statement exactly once. On `Flow::Normal` completion the returned
	/// flow carries whichever value the *last* statement produced (only an `ExprStmt`
	/// produces one; every other kind's `Flow::Normal` carries `None`), which is what
	/// [`Self::execute_body_for_value`] reads instead of re-evaluating anything.
	fn execute_block(&mut self, statements: &[StmtNode], scope: &Scope<Binding>) -> anyhow::Result<Flow> {
		let mut last = Flow::Normal(None);
		for statement in statements {
			last = self.execute_stmt(statement, scope)?;
			if !matches!(last, Flow::Normal(_)) {
				return Ok(last);
			}
		}
		Ok(last)
	}

	/// Like [`Self::execute_block`], but on `Flow::Normal` completion returns the value of
	/// the trailing expression statement -- used for `FuncDecl` bodies and `CompoundExpr`,
	/// per §4.3's "produce the last evaluated expression value" fallback.
	fn execute_body_for_value(&mut self, statements: &[StmtNode], scope: &Scope<Binding>) -> anyhow::Result<Value> {
		match self.execute_block(statements, scope)? {
			Flow::Normal(value) => value.ok_or_else(|| anyhow::anyhow!("block did not produce a value: the final statement must be an expression statement")),
			Flow::Return(value) => Ok(value),
			Flow::Break | Flow::Continue => anyhow::bail!("`break`/`continue` outside of an enclosing `while` loop"),
		}
	}

	/// Strips the trailing-expression value off a nested block's `Flow::Normal`: only a
	/// statement sequence's own direct trailing `ExprStmt` contributes a value (§4.3), not
	/// a nested `if`/`while` body's, so `If` re-wraps its branch's outcome through this
	/// before returning it as its own `Flow`.
	fn without_value(flow: Flow) -> Flow {
		match flow {
			Flow::Normal(_) => Flow::Normal(None),
			other => other,
		}
	}

	fn execute_stmt(&mut self, statement: &StmtNode, scope: &Scope<Binding>) -> anyhow::Result<Flow> {
		match &statement.kind {
			StmtKind::Print(expr) => {
				let value = self.evaluate(expr, scope)?;
				value.print_to(&mut *self.output)?;
				Ok(Flow::Normal(None))
			},
			StmtKind::ExprStmt(expr) => {
				let value = self.evaluate(expr, scope)?;
				Ok(Flow::Normal(Some(value)))
			},
			StmtKind::ConstDecl { name, ty, value } => {
				let evaluated = self.evaluate(value, scope)?;
				check_declared_type(*ty, &evaluated)?;
				let declared_type = ty.or_else(|| evaluated.type_of());
				define_or_error(scope, name, Binding { kind: BindingKind::Const, declared_type, value: evaluated })?;
				Ok(Flow::Normal(None))
			},
			StmtKind::VarDecl { name, ty, value } => {
				let evaluated = match value {
					Some(expr) => self.evaluate(expr, scope)?,
					None => anyhow::bail!("`var` declarations without an initializer are not supported: no default value for {ty:?}"),
				};
				check_declared_type(*ty, &evaluated)?;
				let declared_type = ty.or_else(|| evaluated.type_of());
				define_or_error(scope, name, Binding { kind: BindingKind::Var, declared_type, value: evaluated })?;
				Ok(Flow::Normal(None))
			},
			StmtKind::If { test, then_branch, else_branch } => {
				let condition = self.evaluate(test, scope)?;
				let Value::Bool(condition) = condition else {
					anyhow::bail!("`if` condition must be a bool");
				};
				let branch_scope = scope.child();
				let result = if condition {
					self.execute_block(then_branch, &branch_scope)?
				} else if let Some(else_branch) = else_branch {
					self.execute_block(else_branch, &branch_scope)?
				} else {
					Flow::Normal(None)
				};
				Ok(Self::without_value(result))
			},
			StmtKind::While { test, body } => {
				loop {
					let condition = self.evaluate(test, scope)?;
					let Value::Bool(condition) = condition else {
						anyhow::bail!("`while` condition must be a bool");
					};
					if !condition {
						return Ok(Flow::Normal(None));
					}
					let body_scope = scope.child();
					match self.execute_block(body, &body_scope)? {
						Flow::Normal(_) | Flow::Continue => {},
						Flow::Break => return Ok(Flow::Normal(None)),
						Flow::Return(value) => return Ok(Flow::Return(value)),
					}
				}
			},
			StmtKind::Break => Ok(Flow::Break),
			StmtKind::Continue => Ok(Flow::Continue),
			StmtKind::Return(expr) => Ok(Flow::Return(self.evaluate(expr, scope)?)),
			StmtKind::FuncDecl { name, params, ret_type, body } => {
				let func = Value::Func(Rc::new(FuncValue { name: name.clone(), params: params.clone(), ret_type: *ret_type, body: body.clone(), closure: scope.clone() }));
				define_or_error(scope, name, Binding { kind: BindingKind::Const, declared_type: None, value: func })?;
				Ok(Flow::Normal(None))
			},
		}
	}

	fn evaluate(&mut self, expr: &ExprNode, scope: &Scope<Binding>) -> anyhow::Result<Value> {
		match &expr.kind {
			ExprKind::Integer(value) => Ok(Value::Int(*value)),
			ExprKind::Float(value) => Ok(Value::Float(*value)),
			ExprKind::Character(value) => Ok(Value::Char(*value)),
			ExprKind::BoolLit(value) => Ok(Value::Bool(*value)),
			ExprKind::TypeName(name) => Type::from_name(name).map(Value::Type).ok_or_else(|| anyhow::anyhow!("undefined type {name:?}")),
			ExprKind::Name(name) => {
				if let Some(ty) = Type::from_name(name) {
					if scope.get(name).is_none() {
						return Ok(Value::Type(ty));
					}
				}
				scope.get(name).ok_or_else(|| anyhow::anyhow!("undefined name {name:?}"))
			},
			ExprKind::Grouping(inner) => self.evaluate(inner, scope),
			ExprKind::Unary(op, operand) => {
				let value = self.evaluate(operand, scope)?;
				evaluate_unary(*op, value)
			},
			ExprKind::Binary(op, left, right) => {
				let left = self.evaluate(left, scope)?;
				let right = self.evaluate(right, scope)?;
				evaluate_binary(*op, left, right)
			},
			ExprKind::Assignment(target, value) => {
				let ExprKind::Name(name) = &target.kind else {
					anyhow::bail!("the only valid assignment target is a bare name");
				};
				let evaluated = self.evaluate(value, scope)?;
				assign(scope, name, evaluated)
			},
			ExprKind::Call(callee, args) => self.evaluate_call(callee, args, scope),
			ExprKind::CompoundExpr(statements) => {
				let block_scope = scope.child();
				self.execute_body_for_value(statements, &block_scope)
			},
		}
	}

	fn evaluate_call(&mut self, callee: &ExprNode, args: &[ExprNode], scope: &Scope<Binding>) -> anyhow::Result<Value> {
		if let ExprKind::Name(name) = &callee.kind {
			if let Some(ty) = Type::from_name(name) {
				if scope.get(name).is_none() {
					if args.len() != 1 {
						anyhow::bail!("cast `{name}(...)` takes exactly one argument, got {}", args.len());
					}
					let argument = self.evaluate(&args[0], scope)?;
					return cast(ty, argument);
				}
			}
		}

		let callee_value = self.evaluate(callee, scope)?;
		let Value::Func(func) = callee_value else {
			anyhow::bail!("called value is not a function");
		};
		if args.len() != func.params.len() {
			anyhow::bail!("function {:?} expects {} argument(s), got {}", func.name, func.params.len(), args.len());
		}
		let mut evaluated_args = Vec::with_capacity(args.len());
		for arg in args {
			evaluated_args.push(self.evaluate(arg, scope)?);
		}

		let call_scope = func.closure.child();
		for (param, value) in func.params.iter().zip(evaluated_args) {
			let actual = value.type_of();
			if actual != Some(param.ty) {
				anyhow::bail!("argument {:?} expects type {}, got {:?}", param.name, param.ty.name(), actual.map(Type::name));
			}
			call_scope
				.define(param.name.clone(), Binding { kind: BindingKind::Const, declared_type: Some(param.ty), value })
				.map_err(|_| anyhow::anyhow!("duplicate parameter name {:?}", param.name))?;
		}

		// Bodies that never hit an explicit `return` fall back to their trailing
		// expression statement's value, the same rule `CompoundExpr` follows.
		self.execute_body_for_value(&func.body, &call_scope)
	}
}

fn define_or_error(scope: &Scope<Binding>, name: &str, binding: Binding) -> anyhow::Result<()> {
	scope.define(name, binding).map_err(|_| anyhow::anyhow!("{name:?} is already declared in this scope"))
}

fn assign(scope: &Scope<Binding>, name: &str, value: Value) -> anyhow::Result<Value> {
	let existing = scope.get(name).ok_or_else(|| anyhow::anyhow!("undefined name {name:?}"))?;
	if existing.kind == BindingKind::Const {
		anyhow::bail!("cannot assign to {name:?}: it is declared `const`");
	}
	if let Some(declared) = existing.declared_type {
		if value.type_of() != Some(declared) {
			anyhow::bail!("cannot assign a {:?} to {name:?}, which has type {}", value.type_of().map(Type::name), declared.name());
		}
	}
	let new_binding = Binding { kind: BindingKind::Var, declared_type: existing.declared_type, value: value.clone() };
	if !scope.assign(name, new_binding) {
		anyhow::bail!("undefined name {name:?}");
	}
	Ok(value)
}

fn check_declared_type(declared: Option<Type>, value: &Value) -> anyhow::Result<()> {
	if let Some(declared) = declared {
		let actual = value.type_of().ok_or_else(|| anyhow::anyhow!("value of this expression cannot be stored in a variable"))?;
		if actual != declared {
			anyhow::bail!("declared type {} does not match initializer type {}", declared.name(), actual.name());
		}
	}
	Ok(())
}

fn evaluate_unary(op: UnaryOp, value: Value) -> anyhow::Result<Value> {
	match (op, value) {
		(UnaryOp::Neg, Value::Int(value)) => Ok(Value::Int(-value)),
		(UnaryOp::Neg, Value::Float(value)) => Ok(Value::Float(-value)),
		(UnaryOp::Pos, Value::Int(value)) => Ok(Value::Int(value)),
		(UnaryOp::Pos, Value::Float(value)) => Ok(Value::Float(value)),
		(UnaryOp::Not, Value::Bool(value)) => Ok(Value::Bool(!value)),
		(op, value) => anyhow::bail!("operator {op:?} does not apply to a {:?}", value.type_of()),
	}
}

fn evaluate_binary(op: BinOp, left: Value, right: Value) -> anyhow::Result<Value> {
	use BinOp::{Add, Div, Eq, Ge, Gt, Le, LogAnd, LogOr, Lt, Mul, Ne, Sub};
	match op {
		Add | Sub | Mul | Div => evaluate_arithmetic(op, left, right),
		Lt | Le | Gt | Ge => evaluate_ordering(op, left, right),
		Eq | Ne => evaluate_equality(op, left, right),
		LogAnd | LogOr => evaluate_logical(op, left, right),
	}
}

fn evaluate_arithmetic(op: BinOp, left: Value, right: Value) -> anyhow::Result<Value> {
	match (left, right) {
		(Value::Int(left), Value::Int(right)) => Ok(Value::Int(match op {
			BinOp::Add => left.wrapping_add(right),
			BinOp::Sub => left.wrapping_sub(right),
			BinOp::Mul => left.wrapping_mul(right),
			BinOp::Div => {
				if right == 0 {
					anyhow::bail!("integer division by zero");
				}
				left / right
			},
			_ => unreachable!("evaluate_arithmetic is only called with an arithmetic operator"),
		})),
		(Value::Float(left), Value::Float(right)) => Ok(Value::Float(match op {
			BinOp::Add => left + right,
			BinOp::Sub => left - right,
			BinOp::Mul => left * right,
			BinOp::Div => left / right,
			_ => unreachable!("evaluate_arithmetic is only called with an arithmetic operator"),
		})),
		(left, right) => anyhow::bail!("cannot apply an arithmetic operator across a {:?} and a {:?}", left.type_of(), right.type_of()),
	}
}

fn evaluate_ordering(op: BinOp, left: Value, right: Value) -> anyhow::Result<Value> {
	let result = match (left, right) {
		(Value::Int(left), Value::Int(right)) => compare(op, left.cmp(&right)),
		(Value::Float(left), Value::Float(right)) => {
			let ordering = left.partial_cmp(&right).ok_or_else(|| anyhow::anyhow!("cannot order NaN"))?;
			compare(op, ordering)
		},
		(Value::Char(left), Value::Char(right)) => compare(op, left.cmp(&right)),
		(left, right) => anyhow::bail!("operator `{op:?}` is only defined for int/float/char operands of the same type, got {:?} and {:?}", left.type_of(), right.type_of()),
	};
	Ok(Value::Bool(result))
}

fn compare(op: BinOp, ordering: std::cmp::Ordering) -> bool {
	use std::cmp::Ordering::{Equal, Greater, Less};
	match (op, ordering) {
		(BinOp::Lt, Less) | (BinOp::Le, Less | Equal) | (BinOp::Gt, Greater) | (BinOp::Ge, Greater | Equal) => true,
		_ => false,
	}
}

fn evaluate_equality(op: BinOp, left: Value, right: Value) -> anyhow::Result<Value> {
	let equal = match (&left, &right) {
		(Value::Int(left), Value::Int(right)) => left == right,
		(Value::Float(left), Value::Float(right)) => left == right,
		(Value::Char(left), Value::Char(right)) => left == right,
		(Value::Bool(left), Value::Bool(right)) => left == right,
		_ => anyhow::bail!("`==`/`!=` require two operands of the same primitive type, got {:?} and {:?}", left.type_of(), right.type_of()),
	};
	Ok(Value::Bool(if op == BinOp::Eq { equal } else { !equal }))
}

fn evaluate_logical(op: BinOp, left: Value, right: Value) -> anyhow::Result<Value> {
	let (Value::Bool(left), Value::Bool(right)) = (left, right) else {
		anyhow::bail!("`&&`/`||` require bool operands");
	};
	Ok(Value::Bool(if op == BinOp::LogAnd { left && right } else { left || right }))
}

fn cast(ty: Type, value: Value) -> anyhow::Result<Value> {
	Ok(match (ty, value) {
		(Type::Int, Value::Int(value)) => Value::Int(value),
		(Type::Int, Value::Float(value)) => Value::Int(value as i64),
		(Type::Int, Value::Bool(value)) => Value::Int(i64::from(value)),
		(Type::Int, Value::Char(value)) => Value::Int(i64::from(value as u32)),
		(Type::Float, Value::Float(value)) => Value::Float(value),
		(Type::Float, Value::Int(value)) => Value::Float(value as f64),
		(Type::Float, Value::Bool(value)) => Value::Float(if value { 1.0 } else { 0.0 }),
		(Type::Float, Value::Char(value)) => Value::Float(f64::from(value as u32)),
		(Type::Bool, Value::Bool(value)) => Value::Bool(value),
		(Type::Bool, Value::Int(value)) => Value::Bool(value != 0),
		(Type::Bool, Value::Float(value)) => Value::Bool(value != 0.0),
		(Type::Bool, Value::Char(value)) => Value::Bool(value != '\0'),
		(Type::Char, Value::Char(value)) => Value::Char(value),
		(Type::Char, Value::Int(value)) => Value::Char(char::from_u32(value as u32).unwrap_or('\u{fffd}')),
		(Type::Char, Value::Bool(value)) => Value::Char(if value { '\u{1}' } else { '\0' }),
		(Type::Char, Value::Float(value)) => Value::Char(char::from_u32(value as i64 as u32).unwrap_or('\u{fffd}')),
		(ty, value) => anyhow::bail!("cannot cast a {:?} to {}", value.type_of(), ty.name()),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::lexer::tokenize;
	use crate::parser::parse;

	fn run_source(source: &str) -> String {
		let (tokens, lex_diagnostics) = tokenize(source);
		assert!(lex_diagnostics.is_empty(), "{lex_diagnostics}");
		let (program, parse_diagnostics) = parse(tokens).unwrap();
		assert!(parse_diagnostics.is_empty(), "{parse_diagnostics}");
		let mut output = Vec::new();
		run(&program, &mut output).unwrap();
		String::from_utf8(output).unwrap()
	}

	#[test]
	fn arithmetic_precedence() {
		assert_eq!(run_source("print 2 + 3 * 4;"), "14\n");
	}

	#[test]
	fn float_arithmetic() {
		assert_eq!(run_source("const pi = 3.14159; var r = 2.0; print 2.0 * pi * r;"), "12.56636\n");
	}

	#[test]
	fn while_with_break_and_continue() {
		assert_eq!(run_source("var n = 1; while true { if n == 3 { print n; break; } else { n = n + 1; continue; } }"), "3\n");
	}

	#[test]
	fn function_call() {
		assert_eq!(run_source("func add(x int, y int) int { return x + y; } print add(2, 3);"), "5\n");
	}

	#[test]
	fn compound_expression_value() {
		assert_eq!(run_source("var x = { var t = 1; t = t + 1; t; }; print x;"), "2\n");
	}

	#[test]
	fn assignment_to_const_is_an_error() {
		let (tokens, _) = tokenize("const x = 1; x = 2;");
		let (program, _) = parse(tokens).unwrap();
		let mut output = Vec::new();
		assert!(run(&program, &mut output).is_err());
	}

	#[test]
	fn mixed_type_arithmetic_is_an_error() {
		let (tokens, _) = tokenize("print 1 + 1.0;");
		let (program, _) = parse(tokens).unwrap();
		let mut output = Vec::new();
		assert!(run(&program, &mut output).is_err());
	}

	#[test]
	fn casts() {
		assert_eq!(run_source("print int(3.9);"), "3\n");
		assert_eq!(run_source("print float(2);"), "2\n");
	}

	#[test]
	fn expression_statements_run_their_side_effects_exactly_once() {
		assert_eq!(
			run_source("var total = 0; var i = 0; while i < 5 { total = total + i; i = i + 1; } print total;"),
			"10\n"
		);
	}
}
