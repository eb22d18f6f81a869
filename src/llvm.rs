//! The LLVM-IR emitter (§4.6): textual LLVM-IR with a single numeric SSA counter, the same
//! accumulate-into-a-`String` shape as [`crate::wasm`].

use std::fmt::Write as _;

use crate::ast::{BinOp, ExprKind, ExprNode, Program, StmtKind, StmtNode, Type, UnaryOp};
use crate::scopes::Scope;

/// `int`→`i32`, `float`→`double`, `bool`→`i1`, `char`→`i8` (§4.6).
fn llvm_type(ty: Type) -> &'static str {
	match ty {
		Type::Int => "i32",
		Type::Float => "double",
		Type::Bool => "i1",
		Type::Char => "i8",
	}
}

/// What a name resolves to: a global pointer, a stack `alloca`'d local pointer (both
/// needing an explicit `load` to read), or the `break`/`continue` target block-label pair.
#[derive(Debug, Clone)]
enum LlvmValue {
	Global { name: String, ty: Type },
	Local { register: String, ty: Type },
	Loop { exit: String, test: String },
}

struct Emitter {
	counter: u32,
	globals_text: String,
	functions_text: String,
	body: String,
	/// The label of the basic block currently being appended to, updated every time
	/// [`Self::emit_label`] opens a new one. A `phi`'s incoming-block operand must name
	/// this, not the label that was merely the *target* of some earlier `br`.
	current_block: String,
}

impl Emitter {
	fn new() -> Self {
		Self { counter: 0, globals_text: String::new(), functions_text: String::new(), body: String::new(), current_block: "entry".to_owned() }
	}

	fn fresh(&mut self) -> String {
		let id = self.counter;
		self.counter += 1;
		format!("%\".{id}\"")
	}

	fn fresh_label(&mut self) -> String {
		let id = self.counter;
		self.counter += 1;
		format!(".{id}")
	}

	fn emit(&mut self, line: &str) {
		let _ = writeln!(self.body, "  {line}");
	}

	fn emit_label(&mut self, label: &str) {
		let _ = writeln!(self.body, "{label}:");
		self.current_block = label.to_owned();
	}

	fn emit_expr(&mut self, expr: &ExprNode, scope: &Scope<LlvmValue>) -> anyhow::Result<(String, Type)> {
		match &expr.kind {
			ExprKind::Integer(value) => Ok((value.to_string(), Type::Int)),
			ExprKind::Float(value) => Ok((format!("{value:e}"), Type::Float)),
			ExprKind::Character(value) => Ok(((*value as u32).to_string(), Type::Char)),
			ExprKind::BoolLit(value) => Ok((i32::from(*value).to_string(), Type::Bool)),
			ExprKind::TypeName(name) => anyhow::bail!("bare type name {name:?} is not a value"),
			ExprKind::Name(name) => {
				let binding = scope.get(name).ok_or_else(|| anyhow::anyhow!("undefined name {name:?}"))?;
				match binding {
					LlvmValue::Global { name: global, ty } => {
						let dest = self.fresh();
						self.emit(&format!("{dest} = load {}, {}* @{global}", llvm_type(ty), llvm_type(ty)));
						Ok((dest, ty))
					},
					LlvmValue::Local { register, ty } => {
						let dest = self.fresh();
						self.emit(&format!("{dest} = load {}, {}* {register}", llvm_type(ty), llvm_type(ty)));
						Ok((dest, ty))
					},
					LlvmValue::Loop { .. } => anyhow::bail!("{name:?} is a reserved loop-target name"),
				}
			},
			ExprKind::Grouping(inner) => self.emit_expr(inner, scope),
			ExprKind::Unary(op, operand) => self.emit_unary(*op, operand, scope),
			ExprKind::Binary(op, left, right) => self.emit_binary(*op, left, right, scope),
			ExprKind::Assignment(target, value) => self.emit_assignment(target, value, scope),
			ExprKind::Call(callee, args) => self.emit_call(callee, args, scope),
			ExprKind::CompoundExpr(statements) => {
				let (init, last) = statements.split_at(statements.len().checked_sub(1).expect("grammar guarantees non-empty compound expression"));
				let block_scope = scope.child();
				for statement in init {
					self.emit_stmt(statement, &block_scope)?;
				}
				let StmtKind::ExprStmt(trailing) = &last[0].kind else {
					anyhow::bail!("the final statement of a compound expression must be an expression statement");
				};
				self.emit_expr(trailing, &block_scope)
			},
		}
	}

	fn emit_unary(&mut self, op: UnaryOp, operand: &ExprNode, scope: &Scope<LlvmValue>) -> anyhow::Result<(String, Type)> {
		let (value, ty) = self.emit_expr(operand, scope)?;
		match (op, ty) {
			(UnaryOp::Pos, Type::Int | Type::Float) => Ok((value, ty)),
			(UnaryOp::Neg, Type::Int) => {
				let dest = self.fresh();
				self.emit(&format!("{dest} = sub i32 0, {value}"));
				Ok((dest, Type::Int))
			},
			(UnaryOp::Neg, Type::Float) => {
				let dest = self.fresh();
				self.emit(&format!("{dest} = fneg double {value}"));
				Ok((dest, Type::Float))
			},
			(UnaryOp::Not, Type::Bool) => {
				let dest = self.fresh();
				self.emit(&format!("{dest} = xor i1 {value}, true"));
				Ok((dest, Type::Bool))
			},
			(op, ty) => anyhow::bail!("operator {op:?} does not apply to {}", ty.name()),
		}
	}

	fn emit_binary(&mut self, op: BinOp, left: &ExprNode, right: &ExprNode, scope: &Scope<LlvmValue>) -> anyhow::Result<(String, Type)> {
		if matches!(op, BinOp::LogAnd | BinOp::LogOr) {
			return self.emit_logical(op, left, right, scope);
		}
		let (left_value, left_ty) = self.emit_expr(left, scope)?;
		let (right_value, right_ty) = self.emit_expr(right, scope)?;
		use BinOp::{Add, Div, Eq, Ge, Gt, Le, Lt, Mul, Ne, Sub};
		match op {
			Add | Sub | Mul | Div => {
				if left_ty != right_ty || !matches!(left_ty, Type::Int | Type::Float) {
					anyhow::bail!("arithmetic requires matching int/float operands, got {} and {}", left_ty.name(), right_ty.name());
				}
				let dest = self.fresh();
				let opcode = match (left_ty, op) {
					(Type::Int, Add) => "add",
					(Type::Int, Sub) => "sub",
					(Type::Int, Mul) => "mul",
					(Type::Int, Div) => "sdiv",
					(Type::Float, Add) => "fadd",
					(Type::Float, Sub) => "fsub",
					(Type::Float, Mul) => "fmul",
					(Type::Float, Div) => "fdiv",
					_ => unreachable!("matched against Add | Sub | Mul | Div above"),
				};
				self.emit(&format!("{dest} = {opcode} {} {left_value}, {right_value}", llvm_type(left_ty)));
				Ok((dest, left_ty))
			},
			Lt | Le | Gt | Ge | Eq | Ne => {
				if left_ty != right_ty {
					anyhow::bail!("comparison requires matching operand types, got {} and {}", left_ty.name(), right_ty.name());
				}
				let dest = self.fresh();
				let is_float = left_ty == Type::Float;
				let cc = match (op, is_float) {
					(Lt, false) => "slt",
					(Le, false) => "sle",
					(Gt, false) => "sgt",
					(Ge, false) => "sge",
					(Eq, false) => "eq",
					(Ne, false) => "ne",
					(Lt, true) => "olt",
					(Le, true) => "ole",
					(Gt, true) => "ogt",
					(Ge, true) => "oge",
					(Eq, true) => "oeq",
					(Ne, true) => "one",
					_ => unreachable!("matched against Lt | Le | Gt | Ge | Eq | Ne above"),
				};
				let instruction = if is_float { "fcmp" } else { "icmp" };
				self.emit(&format!("{dest} = {instruction} {cc} {} {left_value}, {right_value}", llvm_type(left_ty)));
				Ok((dest, Type::Bool))
			},
			BinOp::LogAnd | BinOp::LogOr => unreachable!("handled above"),
		}
	}

	/// Short-circuit `&&`/`||` (§4.6): a three-block diamond with a `phi` collecting the
	/// per-branch `i1` result.
	fn emit_logical(&mut self, op: BinOp, left: &ExprNode, right: &ExprNode, scope: &Scope<LlvmValue>) -> anyhow::Result<(String, Type)> {
		let (left_value, left_ty) = self.emit_expr(left, scope)?;
		if left_ty != Type::Bool {
			anyhow::bail!("`&&`/`||` require bool operands, got {}", left_ty.name());
		}
		let entry_block = self.current_block.clone();
		let rhs_label = self.fresh_label();
		let merge_label = self.fresh_label();

		if op == BinOp::LogAnd {
			self.emit(&format!("br i1 {left_value}, label %{rhs_label}, label %{merge_label}"));
		} else {
			self.emit(&format!("br i1 {left_value}, label %{merge_label}, label %{rhs_label}"));
		}
		self.emit_label(&rhs_label);
		let (right_value, right_ty) = self.emit_expr(right, scope)?;
		if right_ty != Type::Bool {
			anyhow::bail!("`&&`/`||` require bool operands, got {}", right_ty.name());
		}
		let rhs_exit_block = self.current_block.clone();
		self.emit(&format!("br label %{merge_label}"));
		self.emit_label(&merge_label);
		let dest = self.fresh();
		let short_circuit_value = if op == BinOp::LogAnd { "false" } else { "true" };
		self.emit(&format!("{dest} = phi i1 [ {short_circuit_value}, %{entry_block} ], [ {right_value}, %{rhs_exit_block} ]"));
		Ok((dest, Type::Bool))
	}

	fn emit_assignment(&mut self, target: &ExprNode, value: &ExprNode, scope: &Scope<LlvmValue>) -> anyhow::Result<(String, Type)> {
		let ExprKind::Name(name) = &target.kind else {
			anyhow::bail!("the only valid assignment target is a bare name");
		};
		let binding = scope.get(name).ok_or_else(|| anyhow::anyhow!("undefined name {name:?}"))?;
		let (pointer, declared_ty) = match &binding {
			LlvmValue::Global { name: global, ty } => (format!("@{global}"), *ty),
			LlvmValue::Local { register, ty } => (register.clone(), *ty),
			LlvmValue::Loop { .. } => anyhow::bail!("{name:?} is a reserved loop-target name"),
		};
		let (value_text, value_ty) = self.emit_expr(value, scope)?;
		if value_ty != declared_ty {
			anyhow::bail!("cannot assign a {} to {name:?}, which has type {}", value_ty.name(), declared_ty.name());
		}
		self.emit(&format!("store {} {value_text}, {}* {pointer}", llvm_type(declared_ty), llvm_type(declared_ty)));
		Ok((value_text, declared_ty))
	}

	fn emit_call(&mut self, callee: &ExprNode, args: &[ExprNode], scope: &Scope<LlvmValue>) -> anyhow::Result<(String, Type)> {
		let ExprKind::Name(name) = &callee.kind else {
			anyhow::bail!("called value must be a bare function name");
		};
		if let Some(ty) = Type::from_name(name) {
			if scope.get(name).is_none() {
				if args.len() != 1 {
					anyhow::bail!("cast `{name}(...)` takes exactly one argument");
				}
				let (value, source_ty) = self.emit_expr(&args[0], scope)?;
				return self.emit_cast(ty, source_ty, value);
			}
		}
		let ret_type = match scope.get(name).ok_or_else(|| anyhow::anyhow!("undefined function {name:?}"))? {
			LlvmValue::Global { ty, .. } => ty,
			_ => anyhow::bail!("{name:?} is not callable"),
		};
		let mut arg_texts = Vec::with_capacity(args.len());
		for arg in args {
			let (value, ty) = self.emit_expr(arg, scope)?;
			arg_texts.push(format!("{} {value}", llvm_type(ty)));
		}
		let dest = self.fresh();
		self.emit(&format!("{dest} = call {} @{name}({})", llvm_type(ret_type), arg_texts.join(", ")));
		Ok((dest, ret_type))
	}

	fn emit_cast(&mut self, target: Type, source: Type, value: String) -> anyhow::Result<(String, Type)> {
		if target == source {
			return Ok((value, target));
		}
		let dest = self.fresh();
		match (target, source) {
			(Type::Int, Type::Float) => self.emit(&format!("{dest} = fptosi double {value} to i32")),
			(Type::Float, Type::Int) => self.emit(&format!("{dest} = sitofp i32 {value} to double")),
			(Type::Int, Type::Bool) => self.emit(&format!("{dest} = zext i1 {value} to i32")),
			(Type::Int, Type::Char) => self.emit(&format!("{dest} = zext i8 {value} to i32")),
			(Type::Bool, Type::Int) => self.emit(&format!("{dest} = icmp ne i32 {value}, 0")),
			(Type::Char, Type::Int) => self.emit(&format!("{dest} = trunc i32 {value} to i8")),
			(Type::Bool, Type::Char) => self.emit(&format!("{dest} = icmp ne i8 {value}, 0")),
			(Type::Char, Type::Bool) => self.emit(&format!("{dest} = zext i1 {value} to i8")),
			_ => anyhow::bail!("cannot cast {} to {}", source.name(), target.name()),
		}
		Ok((dest, target))
	}

	fn emit_stmt(&mut self, statement: &StmtNode, scope: &Scope<LlvmValue>) -> anyhow::Result<()> {
		match &statement.kind {
			StmtKind::Print(expr) => {
				let (value, ty) = self.emit_expr(expr, scope)?;
				let host = match ty {
					Type::Int => "_printi",
					Type::Float => "_printf",
					Type::Bool => "_printb",
					Type::Char => "_printc",
				};
				self.emit(&format!("call void @{host}({} {value})", llvm_type(ty)));
				Ok(())
			},
			StmtKind::ExprStmt(expr) => {
				self.emit_expr(expr, scope)?;
				Ok(())
			},
			StmtKind::ConstDecl { name, ty, value } => self.declare(name, *ty, value, scope),
			StmtKind::VarDecl { name, ty, value } => match value {
				Some(value) => self.declare(name, *ty, value, scope),
				None => anyhow::bail!("`var` declarations without an initializer are not supported: no default value for {ty:?}"),
			},
			StmtKind::If { test, then_branch, else_branch } => {
				let (test_value, test_ty) = self.emit_expr(test, scope)?;
				if test_ty != Type::Bool {
					anyhow::bail!("`if` condition must be bool, got {}", test_ty.name());
				}
				let then_label = self.fresh_label();
				let else_label = self.fresh_label();
				let merge_label = self.fresh_label();
				self.emit(&format!("br i1 {test_value}, label %{then_label}, label %{else_label}"));
				self.emit_label(&then_label);
				self.compile_branch(then_branch, scope)?;
				self.emit(&format!("br label %{merge_label}"));
				self.emit_label(&else_label);
				if let Some(else_branch) = else_branch {
					self.compile_branch(else_branch, scope)?;
				}
				self.emit(&format!("br label %{merge_label}"));
				self.emit_label(&merge_label);
				Ok(())
			},
			StmtKind::While { test, body } => {
				let test_label = self.fresh_label();
				let body_label = self.fresh_label();
				let exit_label = self.fresh_label();
				self.emit(&format!("br label %{test_label}"));
				self.emit_label(&test_label);
				let (test_value, test_ty) = self.emit_expr(test, scope)?;
				if test_ty != Type::Bool {
					anyhow::bail!("`while` condition must be bool, got {}", test_ty.name());
				}
				self.emit(&format!("br i1 {test_value}, label %{body_label}, label %{exit_label}"));
				self.emit_label(&body_label);
				let body_scope = scope.child();
				body_scope.bind_loop_labels(LlvmValue::Loop { exit: exit_label.clone(), test: test_label.clone() }, LlvmValue::Loop { exit: exit_label.clone(), test: test_label.clone() });
				for statement in body {
					self.emit_stmt(statement, &body_scope)?;
				}
				self.emit(&format!("br label %{test_label}"));
				self.emit_label(&exit_label);
				Ok(())
			},
			StmtKind::Break => {
				let (LlvmValue::Loop { exit, .. }, _) = loop_labels(scope)? else { unreachable!() };
				self.emit(&format!("br label %{exit}"));
				Ok(())
			},
			StmtKind::Continue => {
				let (_, LlvmValue::Loop { test, .. }) = loop_labels(scope)? else { unreachable!() };
				self.emit(&format!("br label %{test}"));
				Ok(())
			},
			StmtKind::Return(expr) => {
				let (value, ty) = self.emit_expr(expr, scope)?;
				self.emit(&format!("ret {} {value}", llvm_type(ty)));
				Ok(())
			},
			StmtKind::FuncDecl { name, params, ret_type, body } => self.emit_func_decl(name, params, *ret_type, body, scope),
		}
	}

	fn compile_branch(&mut self, statements: &[StmtNode], scope: &Scope<LlvmValue>) -> anyhow::Result<()> {
		let branch_scope = scope.child();
		for statement in statements {
			self.emit_stmt(statement, &branch_scope)?;
		}
		Ok(())
	}

	fn declare(&mut self, name: &str, ty: Option<Type>, value: &ExprNode, scope: &Scope<LlvmValue>) -> anyhow::Result<()> {
		let (value_text, value_ty) = self.emit_expr(value, scope)?;
		if let Some(declared) = ty {
			if declared != value_ty {
				anyhow::bail!("{name:?}: declared type {} does not match initializer type {}", declared.name(), value_ty.name());
			}
		}
		let register = format!("%{name}");
		self.emit(&format!("{register} = alloca {}", llvm_type(value_ty)));
		self.emit(&format!("store {} {value_text}, {}* {register}", llvm_type(value_ty), llvm_type(value_ty)));
		scope
			.define(name.to_owned(), LlvmValue::Local { register, ty: value_ty })
			.map_err(|_| anyhow::anyhow!("{name:?} is already declared in this scope"))
	}

	fn emit_func_decl(&mut self, name: &str, params: &[crate::ast::Param], ret_type: Type, body: &[StmtNode], scope: &Scope<LlvmValue>) -> anyhow::Result<()> {
		let func_scope = scope.child();
		let saved_body = std::mem::take(&mut self.body);
		let saved_block = std::mem::replace(&mut self.current_block, "entry".to_owned());

		let param_list: Vec<String> = params.iter().map(|param| format!("{} %{}.arg", llvm_type(param.ty), param.name)).collect();
		for param in params {
			let register = format!("%{}", param.name);
			self.emit(&format!("{register} = alloca {}", llvm_type(param.ty)));
			self.emit(&format!("store {} %{}.arg, {}* {register}", llvm_type(param.ty), param.name, llvm_type(param.ty)));
			func_scope
				.define(param.name.clone(), LlvmValue::Local { register, ty: param.ty })
				.map_err(|_| anyhow::anyhow!("duplicate parameter name {:?}", param.name))?;
		}

		for statement in body {
			self.emit_stmt(statement, &func_scope)?;
		}
		let body_text = std::mem::replace(&mut self.body, saved_body);
		self.current_block = saved_block;

		let _ = writeln!(
			self.functions_text,
			"define {} @{name}({}) {{\nentry:\n{body_text}}}\n",
			llvm_type(ret_type),
			param_list.join(", ")
		);

		scope
			.define(name.to_owned(), LlvmValue::Global { name: name.to_owned(), ty: ret_type })
			.map_err(|_| anyhow::anyhow!("{name:?} is already declared"))
	}
}

fn loop_labels(scope: &Scope<LlvmValue>) -> anyhow::Result<(LlvmValue, LlvmValue)> {
	scope.loop_labels().ok_or_else(|| anyhow::anyhow!("`break`/`continue` outside of an enclosing `while` loop"))
}

/// Emits a full LLVM-IR module (§4.6): external print declarations, one `define` per
/// `FuncDecl`, globals for top-level `const`/`var`, and a synthetic `main` wrapping the
/// remaining top-level statements.
pub fn emit(program: &Program) -> anyhow::Result<String> {
	let mut emitter = Emitter::new();
	let globals = Scope::root();

	for statement in &program.statements {
		if let StmtKind::FuncDecl { name, ret_type, .. } = &statement.kind {
			globals.define(name.clone(), LlvmValue::Global { name: name.clone(), ty: *ret_type }).map_err(|_| anyhow::anyhow!("{name:?} is already declared"))?;
		}
	}

	for statement in &program.statements {
		match &statement.kind {
			StmtKind::FuncDecl { name, params, ret_type, body } => emitter.emit_func_decl(name, params, *ret_type, body, &globals)?,
			StmtKind::ConstDecl { name, ty, value } | StmtKind::VarDecl { name, ty, value: Some(value) } => {
				emitter.emit_toplevel_global(name, *ty, value, &globals)?;
			},
			StmtKind::VarDecl { value: None, .. } => anyhow::bail!("top-level `var` needs an initializer"),
			_ => emitter.emit_stmt(statement, &globals)?,
		}
	}

	let mut module = String::new();
	module.push_str("target triple = \"unknown-unknown-unknown\"\n\n");
	module.push_str("declare void @_printi(i32)\n");
	module.push_str("declare void @_printf(double)\n");
	module.push_str("declare void @_printb(i1)\n");
	module.push_str("declare void @_printc(i8)\n\n");
	module.push_str(&emitter.globals_text);
	module.push('\n');
	module.push_str(&emitter.functions_text);
	let _ = writeln!(module, "define i32 @main() {{\nentry:\n{}  ret i32 0\n}}", emitter.body);
	Ok(module)
}

impl Emitter {
	/// Top-level `const`/`var` declarations (§4.6): the global itself is `zeroinitializer`
	/// (LLVM global initializers must be constant, and a Wabbit initializer need not be),
	/// with the actual initializing `store` compiled into synthetic `main`'s entry block --
	/// the same place every other top-level statement's code lands.
	fn emit_toplevel_global(&mut self, name: &str, ty: Option<Type>, value: &ExprNode, scope: &Scope<LlvmValue>) -> anyhow::Result<()> {
		// The declared/inferred type must be known before compiling the initializer, since
		// the global's type is fixed at declaration -- so peek it the same way the
		// interpreter does, from the annotation if present.
		let (value_text, value_ty) = self.emit_expr(value, scope)?;
		if let Some(declared) = ty {
			if declared != value_ty {
				anyhow::bail!("{name:?}: declared type {} does not match initializer type {}", declared.name(), value_ty.name());
			}
		}
		let _ = writeln!(self.globals_text, "@{name} = global {} zeroinitializer", llvm_type(value_ty));
		self.emit(&format!("store {} {value_text}, {}* @{name}", llvm_type(value_ty), llvm_type(value_ty)));
		scope
			.define(name.to_owned(), LlvmValue::Global { name: name.to_owned(), ty: value_ty })
			.map_err(|_| anyhow::anyhow!("{name:?} is already declared"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::lexer::tokenize;
	use crate::parser::parse;

	#[test]
	fn emits_declarations_and_main() {
		let (tokens, _) = tokenize("print 2 + 3 * 4;");
		let (program, _) = parse(tokens).unwrap();
		let ir = emit(&program).unwrap();
		assert!(ir.contains("declare void @_printi(i32)"));
		assert!(ir.contains("define i32 @main()"));
		assert!(ir.contains("ret i32 0"));
	}

	/// Every block a `br`/`phi` names as a target must have a matching `label:` definition
	/// somewhere in the module -- regression coverage for a label-trimming bug where
	/// definitions were emitted as `3:` while references used `%.3`.
	#[test]
	fn every_referenced_label_has_a_matching_definition() {
		let (tokens, _) = tokenize("var flag = true && false; var other = true || flag; print flag;");
		let (program, _) = parse(tokens).unwrap();
		let ir = emit(&program).unwrap();

		let mut referenced = std::collections::HashSet::new();
		for line in ir.lines() {
			for piece in line.split('%').skip(1) {
				let label: String = piece.chars().take_while(|c| c.is_ascii_alphanumeric() || *c == '.').collect();
				if label.starts_with('.') {
					referenced.insert(label);
				}
			}
		}
		assert!(!referenced.is_empty(), "expected at least one block label reference in:\n{ir}");
		for label in referenced {
			assert!(ir.contains(&format!("{label}:")), "no definition found for referenced label {label} in:\n{ir}");
		}
	}

	/// A `phi`'s incoming-block operand must name the block that actually held the `br`,
	/// not a synthesized label that was never emitted.
	#[test]
	fn logical_and_produces_a_well_formed_phi() {
		let (tokens, _) = tokenize("func truthy() bool { return true; } print false && truthy();");
		let (program, _) = parse(tokens).unwrap();
		let ir = emit(&program).unwrap();
		let phi_line = ir.lines().find(|line| line.contains("= phi i1")).expect("expected a phi instruction");
		assert!(phi_line.contains("%entry"), "phi should name the entry block: {phi_line}");
	}
}
