//! The WAT (WebAssembly text) emitter (§4.5): walks the AST once, accumulating a textual
//! `(module ...)` into a `String` via `writeln!`, the same accumulate-and-render shape the
//! teacher's C transpiler uses.

use std::fmt::Write as _;

use crate::ast::{BinOp, ExprKind, ExprNode, Program, StmtKind, StmtNode, Type, UnaryOp};
use crate::scopes::Scope;

/// What a name resolves to while emitting WAT: a global or local variable slot (with its
/// Wabbit type, to choose `i32`/`f64` operations) or a structured-control-flow label pair
/// bound via [`Scope::bind_loop_labels`].
#[derive(Debug, Clone)]
enum WatSlot {
	Global(Type),
	Local(Type),
	Loop { exit: String, test: String },
}

/// `int`/`bool`/`char` all collapse to `i32`; `float` is `f64` (§4.5).
fn wat_type(ty: Type) -> &'static str {
	match ty {
		Type::Int | Type::Bool | Type::Char => "i32",
		Type::Float => "f64",
	}
}

struct Emitter {
	out: String,
	label_counter: u32,
	locals: Vec<(String, Type)>,
	functions: Vec<String>,
}

impl Emitter {
	fn new() -> Self {
		Self { out: String::new(), label_counter: 0, locals: Vec::new(), functions: Vec::new() }
	}

	fn fresh_label(&mut self, prefix: &str) -> String {
		let label = format!("${prefix}{}", self.label_counter);
		self.label_counter += 1;
		label
	}

	fn emit_line(&mut self, indent: usize, text: &str) {
		let _ = writeln!(self.out, "{}{}", "  ".repeat(indent), text);
	}

	fn emit_expr(&mut self, indent: usize, expr: &ExprNode, scope: &Scope<WatSlot>) -> anyhow::Result<Type> {
		match &expr.kind {
			ExprKind::Integer(value) => {
				self.emit_line(indent, &format!("i32.const {value}"));
				Ok(Type::Int)
			},
			ExprKind::Float(value) => {
				self.emit_line(indent, &format!("f64.const {value}"));
				Ok(Type::Float)
			},
			ExprKind::Character(value) => {
				self.emit_line(indent, &format!("i32.const {}", *value as u32));
				Ok(Type::Char)
			},
			ExprKind::BoolLit(value) => {
				self.emit_line(indent, &format!("i32.const {}", u32::from(*value)));
				Ok(Type::Bool)
			},
			ExprKind::TypeName(name) => anyhow::bail!("bare type name {name:?} is not a value"),
			ExprKind::Name(name) => {
				let slot = scope.get(name).ok_or_else(|| anyhow::anyhow!("undefined name {name:?}"))?;
				match slot {
					WatSlot::Global(ty) => {
						self.emit_line(indent, &format!("global.get ${name}"));
						Ok(ty)
					},
					WatSlot::Local(ty) => {
						self.emit_line(indent, &format!("local.get ${name}"));
						Ok(ty)
					},
					WatSlot::Loop { .. } => anyhow::bail!("{name:?} is a reserved loop-target name"),
				}
			},
			ExprKind::Grouping(inner) => self.emit_expr(indent, inner, scope),
			ExprKind::Unary(op, operand) => self.emit_unary(indent, *op, operand, scope),
			ExprKind::Binary(op, left, right) => self.emit_binary(indent, *op, left, right, scope),
			ExprKind::Assignment(target, value) => self.emit_assignment(indent, target, value, scope),
			ExprKind::Call(callee, args) => self.emit_call(indent, callee, args, scope),
			ExprKind::CompoundExpr(statements) => {
				let (init, last) = statements.split_at(statements.len().checked_sub(1).expect("grammar guarantees non-empty compound expression"));
				let block_scope = scope.child();
				for statement in init {
					self.emit_stmt(indent, statement, &block_scope)?;
				}
				let StmtKind::ExprStmt(trailing) = &last[0].kind else {
					anyhow::bail!("the final statement of a compound expression must be an expression statement");
				};
				self.emit_expr(indent, trailing, &block_scope)
			},
		}
	}

	fn emit_unary(&mut self, indent: usize, op: UnaryOp, operand: &ExprNode, scope: &Scope<WatSlot>) -> anyhow::Result<Type> {
		let ty = self.emit_expr(indent, operand, scope)?;
		match (op, ty) {
			(UnaryOp::Pos, Type::Int | Type::Float) => Ok(ty),
			(UnaryOp::Neg, Type::Int) => {
				self.emit_line(indent, "i32.const -1");
				self.emit_line(indent, "i32.mul");
				Ok(Type::Int)
			},
			(UnaryOp::Neg, Type::Float) => {
				self.emit_line(indent, "f64.neg");
				Ok(Type::Float)
			},
			(UnaryOp::Not, Type::Bool) => {
				self.emit_line(indent, "i32.eqz");
				Ok(Type::Bool)
			},
			(op, ty) => anyhow::bail!("operator {op:?} does not apply to {}", ty.name()),
		}
	}

	fn emit_binary(&mut self, indent: usize, op: BinOp, left: &ExprNode, right: &ExprNode, scope: &Scope<WatSlot>) -> anyhow::Result<Type> {
		if matches!(op, BinOp::LogAnd | BinOp::LogOr) {
			return self.emit_logical(indent, op, left, right, scope);
		}
		let left_ty = self.emit_expr(indent, left, scope)?;
		let right_ty = self.emit_expr(indent, right, scope)?;
		use BinOp::{Add, Div, Eq, Ge, Gt, Le, Lt, Mul, Ne, Sub};
		match op {
			Add | Sub | Mul | Div => {
				if left_ty != right_ty || !matches!(left_ty, Type::Int | Type::Float) {
					anyhow::bail!("arithmetic requires matching int/float operands, got {} and {}", left_ty.name(), right_ty.name());
				}
				let wat_ty = wat_type(left_ty);
				let op_name = match (left_ty, op) {
					(Type::Int, Add) | (Type::Float, Add) => "add",
					(Type::Int, Sub) | (Type::Float, Sub) => "sub",
					(Type::Int, Mul) | (Type::Float, Mul) => "mul",
					(Type::Int, Div) => "div_s",
					(Type::Float, Div) => "div",
					_ => unreachable!("matched against Add | Sub | Mul | Div above"),
				};
				self.emit_line(indent, &format!("{wat_ty}.{op_name}"));
				Ok(left_ty)
			},
			Lt | Le | Gt | Ge | Eq | Ne => {
				if left_ty != right_ty {
					anyhow::bail!("comparison requires matching operand types, got {} and {}", left_ty.name(), right_ty.name());
				}
				let wat_ty = wat_type(left_ty);
				let signed_suffix = if wat_ty == "i32" { "_s" } else { "" };
				let op_name = match op {
					Lt => format!("lt{signed_suffix}"),
					Le => format!("le{signed_suffix}"),
					Gt => format!("gt{signed_suffix}"),
					Ge => format!("ge{signed_suffix}"),
					Eq => "eq".to_owned(),
					Ne => "ne".to_owned(),
					_ => unreachable!("matched against Lt | Le | Gt | Ge | Eq | Ne above"),
				};
				self.emit_line(indent, &format!("{wat_ty}.{op_name}"));
				Ok(Type::Bool)
			},
			BinOp::LogAnd | BinOp::LogOr => unreachable!("handled above"),
		}
	}

	/// Short-circuit `&&`/`||` (§4.5): the left operand becomes an `if` condition, so the
	/// right operand is only ever evaluated on the branch where it matters.
	fn emit_logical(&mut self, indent: usize, op: BinOp, left: &ExprNode, right: &ExprNode, scope: &Scope<WatSlot>) -> anyhow::Result<Type> {
		let left_ty = self.emit_expr(indent, left, scope)?;
		if left_ty != Type::Bool {
			anyhow::bail!("`&&`/`||` require bool operands, got {}", left_ty.name());
		}
		self.emit_line(indent, "(if (result i32)");
		self.emit_line(indent + 1, "(then");
		if op == BinOp::LogAnd {
			let right_ty = self.emit_expr(indent + 2, right, scope)?;
			if right_ty != Type::Bool {
				anyhow::bail!("`&&` requires bool operands, got {}", right_ty.name());
			}
		} else {
			self.emit_line(indent + 2, "i32.const 1");
		}
		self.emit_line(indent + 1, ")");
		self.emit_line(indent + 1, "(else");
		if op == BinOp::LogAnd {
			self.emit_line(indent + 2, "i32.const 0");
		} else {
			let right_ty = self.emit_expr(indent + 2, right, scope)?;
			if right_ty != Type::Bool {
				anyhow::bail!("`||` requires bool operands, got {}", right_ty.name());
			}
		}
		self.emit_line(indent + 1, ")");
		self.emit_line(indent, ")");
		Ok(Type::Bool)
	}

	fn emit_assignment(&mut self, indent: usize, target: &ExprNode, value: &ExprNode, scope: &Scope<WatSlot>) -> anyhow::Result<Type> {
		let ExprKind::Name(name) = &target.kind else {
			anyhow::bail!("the only valid assignment target is a bare name");
		};
		let slot = scope.get(name).ok_or_else(|| anyhow::anyhow!("undefined name {name:?}"))?;
		let declared_ty = match &slot {
			WatSlot::Global(ty) | WatSlot::Local(ty) => *ty,
			WatSlot::Loop { .. } => anyhow::bail!("{name:?} is a reserved loop-target name"),
		};
		let value_ty = self.emit_expr(indent, value, scope)?;
		if value_ty != declared_ty {
			anyhow::bail!("cannot assign a {} to {name:?}, which has type {}", value_ty.name(), declared_ty.name());
		}
		match slot {
			WatSlot::Global(_) => {
				self.emit_line(indent, &format!("global.set ${name}"));
				self.emit_line(indent, &format!("global.get ${name}"));
			},
			WatSlot::Local(_) => {
				self.emit_line(indent, &format!("local.set ${name}"));
				self.emit_line(indent, &format!("local.get ${name}"));
			},
			WatSlot::Loop { .. } => unreachable!("checked above"),
		}
		Ok(declared_ty)
	}

	fn emit_call(&mut self, indent: usize, callee: &ExprNode, args: &[ExprNode], scope: &Scope<WatSlot>) -> anyhow::Result<Type> {
		if let ExprKind::Name(name) = &callee.kind {
			if let Some(ty) = Type::from_name(name) {
				if scope.get(name).is_none() {
					if args.len() != 1 {
						anyhow::bail!("cast `{name}(...)` takes exactly one argument");
					}
					let source_ty = self.emit_expr(indent, &args[0], scope)?;
					self.emit_cast(indent, ty, source_ty)?;
					return Ok(ty);
				}
			}
			let WatSlot::Global(ret_type) = scope.get(name).ok_or_else(|| anyhow::anyhow!("undefined function {name:?}"))? else {
				anyhow::bail!("{name:?} is not callable");
			};
			for arg in args {
				self.emit_expr(indent, arg, scope)?;
			}
			self.emit_line(indent, &format!("call ${name}"));
			return Ok(ret_type);
		}
		anyhow::bail!("called value must be a bare function name")
	}

	fn emit_cast(&mut self, indent: usize, target: Type, source: Type) -> anyhow::Result<()> {
		match (target, source) {
			(Type::Int, Type::Float) => self.emit_line(indent, "i32.trunc_f64_s"),
			(Type::Float, Type::Int) => self.emit_line(indent, "f64.convert_i32_s"),
			(a, b) if a == b => {},
			(Type::Int, Type::Bool | Type::Char) | (Type::Bool, Type::Int | Type::Char) | (Type::Char, Type::Int | Type::Bool) => {},
			_ => anyhow::bail!("cannot cast {} to {}", source.name(), target.name()),
		}
		Ok(())
	}

	fn emit_stmt(&mut self, indent: usize, statement: &StmtNode, scope: &Scope<WatSlot>) -> anyhow::Result<()> {
		match &statement.kind {
			StmtKind::Print(expr) => {
				let ty = self.emit_expr(indent, expr, scope)?;
				let host = match ty {
					Type::Int => "_printi",
					Type::Float => "_printf",
					Type::Bool => "_printb",
					Type::Char => "_printc",
				};
				self.emit_line(indent, &format!("call ${host}"));
				Ok(())
			},
			StmtKind::ExprStmt(expr) => {
				self.emit_expr(indent, expr, scope)?;
				self.emit_line(indent, "drop");
				Ok(())
			},
			StmtKind::ConstDecl { name, ty, value } => self.declare(indent, name, *ty, Some(value), scope),
			StmtKind::VarDecl { name, ty, value } => self.declare(indent, name, *ty, value.as_ref(), scope),
			StmtKind::If { test, then_branch, else_branch } => {
				let test_ty = self.emit_expr(indent, test, scope)?;
				if test_ty != Type::Bool {
					anyhow::bail!("`if` condition must be bool, got {}", test_ty.name());
				}
				self.emit_line(indent, "(if");
				self.emit_line(indent + 1, "(then");
				let branch_scope = scope.child();
				for statement in then_branch {
					self.emit_stmt(indent + 2, statement, &branch_scope)?;
				}
				self.emit_line(indent + 1, ")");
				if let Some(else_branch) = else_branch {
					self.emit_line(indent + 1, "(else");
					let else_scope = scope.child();
					for statement in else_branch {
						self.emit_stmt(indent + 2, statement, &else_scope)?;
					}
					self.emit_line(indent + 1, ")");
				}
				self.emit_line(indent, ")");
				Ok(())
			},
			StmtKind::While { test, body } => {
				let exit = self.fresh_label("exit");
				let test_label = self.fresh_label("test");
				self.emit_line(indent, &format!("(block {exit}"));
				self.emit_line(indent + 1, &format!("(loop {test_label}"));
				let test_ty = self.emit_expr(indent + 2, test, scope)?;
				if test_ty != Type::Bool {
					anyhow::bail!("`while` condition must be bool, got {}", test_ty.name());
				}
				self.emit_line(indent + 2, "i32.eqz");
				self.emit_line(indent + 2, &format!("br_if {exit}"));
				let body_scope = scope.child();
				body_scope.bind_loop_labels(WatSlot::Loop { exit: exit.clone(), test: test_label.clone() }, WatSlot::Loop { exit, test: test_label.clone() });
				for statement in body {
					self.emit_stmt(indent + 2, statement, &body_scope)?;
				}
				self.emit_line(indent + 2, &format!("br {test_label}"));
				self.emit_line(indent + 1, ")");
				self.emit_line(indent, ")");
				Ok(())
			},
			StmtKind::Break => {
				let (WatSlot::Loop { exit, .. }, _) = loop_labels(scope)? else { unreachable!() };
				self.emit_line(indent, &format!("br {exit}"));
				Ok(())
			},
			StmtKind::Continue => {
				let (_, WatSlot::Loop { test, .. }) = loop_labels(scope)? else { unreachable!() };
				self.emit_line(indent, &format!("br {test}"));
				Ok(())
			},
			StmtKind::Return(expr) => {
				self.emit_expr(indent, expr, scope)?;
				self.emit_line(indent, "return");
				Ok(())
			},
			StmtKind::FuncDecl { name, params, ret_type, body } => self.emit_func_decl(name, params, *ret_type, body, scope),
		}
	}

	fn declare(&mut self, indent: usize, name: &str, ty: Option<Type>, value: Option<&ExprNode>, scope: &Scope<WatSlot>) -> anyhow::Result<()> {
		let value_ty = match value {
			Some(expr) => Some(self.emit_expr(indent, expr, scope)?),
			None => None,
		};
		let resolved = ty.or(value_ty).ok_or_else(|| anyhow::anyhow!("cannot infer a type for {name:?}"))?;
		if let (Some(declared), Some(actual)) = (ty, value_ty) {
			if declared != actual {
				anyhow::bail!("{name:?}: declared type {} does not match initializer type {}", declared.name(), actual.name());
			}
		}
		let is_global = self.locals.is_empty();
		if is_global {
			self.functions.push(format!("(global ${name} (mut {}) ({}.const 0))", wat_type(resolved), wat_type(resolved)));
			if value.is_some() {
				self.emit_line(indent, &format!("global.set ${name}"));
			}
			scope.define(name.to_owned(), WatSlot::Global(resolved)).map_err(|_| anyhow::anyhow!("{name:?} is already declared"))?;
		} else {
			self.locals.push((name.to_owned(), resolved));
			if value.is_some() {
				self.emit_line(indent, &format!("local.set ${name}"));
			}
			scope.define(name.to_owned(), WatSlot::Local(resolved)).map_err(|_| anyhow::anyhow!("{name:?} is already declared in this scope"))?;
		}
		Ok(())
	}

	fn emit_func_decl(&mut self, name: &str, params: &[crate::ast::Param], ret_type: Type, body: &[StmtNode], scope: &Scope<WatSlot>) -> anyhow::Result<()> {
		let func_scope = scope.child();
		let param_decls: Vec<String> = params.iter().map(|param| format!("(param ${} {})", param.name, wat_type(param.ty))).collect();
		for param in params {
			func_scope
				.define(param.name.clone(), WatSlot::Local(param.ty))
				.map_err(|_| anyhow::anyhow!("duplicate parameter name {:?}", param.name))?;
		}

		let saved_locals = std::mem::take(&mut self.locals);
		let saved_out = std::mem::take(&mut self.out);
		for statement in body {
			self.emit_stmt(1, statement, &func_scope)?;
		}
		let body_text = std::mem::replace(&mut self.out, saved_out);
		let locals = std::mem::replace(&mut self.locals, saved_locals);

		let mut func = format!("(func ${name} (export \"{name}\") {} (result {})\n", param_decls.join(" "), wat_type(ret_type));
		for (local_name, local_ty) in &locals {
			func.push_str(&format!("  (local ${local_name} {})\n", wat_type(*local_ty)));
		}
		func.push_str(&body_text);
		func.push_str(")\n");
		self.functions.push(func);

		scope.define(name.to_owned(), WatSlot::Global(ret_type)).map_err(|_| anyhow::anyhow!("{name:?} is already declared"))?;
		Ok(())
	}
}

fn loop_labels(scope: &Scope<WatSlot>) -> anyhow::Result<(WatSlot, WatSlot)> {
	scope.loop_labels().ok_or_else(|| anyhow::anyhow!("`break`/`continue` outside of an enclosing `while` loop"))
}

/// Emits a full WAT module (§4.5): imported print hosts, one exported function per
/// `FuncDecl`, and a synthetic `main` running the top-level statements.
pub fn emit(program: &Program) -> anyhow::Result<String> {
	let mut emitter = Emitter::new();
	let globals = Scope::root();

	// Functions are hoisted the same way the WVM compiler hoists them, so forward/mutual
	// calls resolve without a second pass.
	for statement in &program.statements {
		if let StmtKind::FuncDecl { name, ret_type, .. } = &statement.kind {
			globals.define(name.clone(), WatSlot::Global(*ret_type)).map_err(|_| anyhow::anyhow!("{name:?} is already declared"))?;
		}
	}

	let mut main_body = String::new();
	for statement in &program.statements {
		if matches!(statement.kind, StmtKind::FuncDecl { .. }) {
			let StmtKind::FuncDecl { name, params, ret_type, body } = &statement.kind else { unreachable!() };
			emitter.emit_func_decl(name, params, *ret_type, body, &globals)?;
		} else {
			emitter.emit_stmt(1, statement, &globals)?;
		}
	}
	main_body.push_str(&emitter.out);

	let mut module = String::new();
	module.push_str("(module\n");
	module.push_str("  (import \"host\" \"_printi\" (func $_printi (param i32)))\n");
	module.push_str("  (import \"host\" \"_printf\" (func $_printf (param f64)))\n");
	module.push_str("  (import \"host\" \"_printb\" (func $_printb (param i32)))\n");
	module.push_str("  (import \"host\" \"_printc\" (func $_printc (param i32)))\n");
	for function in &emitter.functions {
		for line in function.lines() {
			module.push_str("  ");
			module.push_str(line);
			module.push('\n');
		}
	}
	module.push_str("  (func $main (export \"main\")\n");
	for line in main_body.lines() {
		module.push_str("  ");
		module.push_str(line);
		module.push('\n');
	}
	module.push_str("  )\n");
	module.push_str(")\n");
	Ok(module)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::lexer::tokenize;
	use crate::parser::parse;

	#[test]
	fn emits_a_well_formed_module() {
		let (tokens, _) = tokenize("print 2 + 3 * 4;");
		let (program, _) = parse(tokens).unwrap();
		let wat = emit(&program).unwrap();
		assert!(wat.starts_with("(module\n"));
		assert!(wat.trim_end().ends_with(")"));
		assert!(wat.contains("_printi"));
	}
}
