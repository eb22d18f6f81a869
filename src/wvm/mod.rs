//! The WVM: a custom stack machine, its compiler, and its execution loop (§4.4).
//!
//! Two operand stacks (`int`/`float`), a global slot array per stack kind, and a per-frame
//! local slot array per stack kind. `bool`/`char` share the integer stack with `int`, same
//! as the interpreter's type system collapsing at this lower level -- the WVM itself has
//! no static type checker (§4.4/Open Question (a)); the [`Compiler`] is what enforces
//! Wabbit's type rules before an instruction is ever emitted.

use std::fmt;

use crate::ast::{BinOp, ExprKind, ExprNode, Program as AstProgram, StmtKind, StmtNode, Type, UnaryOp};
use crate::scopes::Scope;

/// The operator carried by `ICMP`/`FCMP` (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
	Lt,
	Le,
	Gt,
	Ge,
	Eq,
	Ne,
}

impl fmt::Display for CmpOp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let text = match self {
			Self::Lt => "<",
			Self::Le => "<=",
			Self::Gt => ">",
			Self::Ge => ">=",
			Self::Eq => "==",
			Self::Ne => "!=",
		};
		write!(f, "{text}")
	}
}

/// A single WVM instruction (§4.4's ISA table). `Label` occupies a slot in the program but
/// performs no work at execution time -- it exists purely so `Goto`/`Bz`/`Call` have a
/// stable target to resolve in the label prepass.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
	IPush(i64),
	FPush(f64),
	IDup,
	IPop,
	FDup,
	FPop,
	IAdd,
	ISub,
	IMul,
	IDiv,
	INeg,
	FAdd,
	FSub,
	FMul,
	FDiv,
	FNeg,
	And,
	Or,
	Xor,
	ICmp(CmpOp),
	FCmp(CmpOp),
	IToF,
	FToI,
	ILoadLocal(usize),
	IStoreLocal(usize),
	FLoadLocal(usize),
	FStoreLocal(usize),
	ILoadGlobal(usize),
	IStoreGlobal(usize),
	FLoadGlobal(usize),
	FStoreGlobal(usize),
	Label(u32),
	Goto(u32),
	Bz(u32),
	Call(u32),
	Return,
	Halt,
	PrintI,
	PrintF,
	PrintB,
	PrintC,
}

/// A compiled WVM program: the flat instruction list plus how many global slots each stack
/// kind needs, so the [`Vm`] can size its globals arrays up front.
#[derive(Debug, Clone)]
pub struct Program {
	pub instructions: Vec<Instr>,
	pub int_globals: usize,
	pub float_globals: usize,
	/// The widest `(int, float)` local-slot usage across every function body, so the
	/// [`Vm`] can size each call frame's local arrays once, up front.
	pub max_int_locals: usize,
	pub max_float_locals: usize,
}

impl Program {
	/// The supplemental textual dump described in SPEC_FULL.md §2, one instruction per
	/// line with its program counter, for the `wvm --dump` CLI flag.
	#[must_use]
	pub fn disassemble(&self) -> String {
		let mut out = String::new();
		for (pc, instr) in self.instructions.iter().enumerate() {
			out.push_str(&format!("{pc:>5}  {instr:?}\n"));
		}
		out
	}
}

/// Which operand stack a compiled value lives on; `bool`/`char`/`int` all resolve to `Int`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StackKind {
	Int,
	Float,
}

fn stack_kind_of(ty: Type) -> StackKind {
	match ty {
		Type::Float => StackKind::Float,
		Type::Int | Type::Bool | Type::Char => StackKind::Int,
	}
}

/// What a name resolves to at compile time: a storage slot (with its declared Wabbit type,
/// needed to pick `I*`/`F*` instructions), a function's entry label, or -- via
/// [`Scope::bind_loop_labels`] -- a loop's `break`/`continue` target label.
#[derive(Debug, Clone)]
enum SlotBinding {
	Local { slot: usize, ty: Type },
	Global { slot: usize, ty: Type },
	Function { label: u32, params: Vec<Type>, ret_type: Type },
	Loop(u32),
}

/// Compiles an AST into a [`Program`] (§4.4's "Compilation contract").
pub struct Compiler {
	instructions: Vec<Instr>,
	next_label: u32,
	next_int_global: usize,
	next_float_global: usize,
	/// The current function's `(next_int_local, next_float_local)` counters, pushed on
	/// entering a `FuncDecl` body and popped on leaving it. Empty outside any function,
	/// which is how [`Compiler::declare`] tells a top-level declaration from a local one
	/// (Wabbit's grammar allows a nested `func` inside a body, hence a stack rather than a
	/// single pair).
	local_counters: Vec<(usize, usize)>,
	max_int_locals: usize,
	max_float_locals: usize,
}

impl Compiler {
	#[must_use]
	pub fn new() -> Self {
		Self {
			instructions: Vec::new(),
			next_label: 0,
			next_int_global: 0,
			next_float_global: 0,
			local_counters: Vec::new(),
			max_int_locals: 0,
			max_float_locals: 0,
		}
	}

	fn note_local_high_water(&mut self) {
		if let Some((int_count, float_count)) = self.local_counters.last() {
			self.max_int_locals = self.max_int_locals.max(*int_count);
			self.max_float_locals = self.max_float_locals.max(*float_count);
		}
	}

	fn fresh_label(&mut self) -> u32 {
		let label = self.next_label;
		self.next_label += 1;
		label
	}

	fn emit(&mut self, instr: Instr) {
		self.instructions.push(instr);
	}

	pub fn compile(mut self, program: &AstProgram) -> anyhow::Result<Program> {
		let globals = Scope::root();
		// Functions are hoisted so mutually-recursive/forward calls resolve, matching the
		// interpreter's FuncDecl binding which happens before the body is ever walked.
		for statement in &program.statements {
			if let StmtKind::FuncDecl { name, params, ret_type, .. } = &statement.kind {
				let label = self.fresh_label();
				let param_types = params.iter().map(|param| param.ty).collect();
				globals
					.define(name.clone(), SlotBinding::Function { label, params: param_types, ret_type: *ret_type })
					.map_err(|_| anyhow::anyhow!("{name:?} is already declared"))?;
			}
		}
		for statement in &program.statements {
			self.compile_stmt(statement, &globals)?;
		}
		self.emit(Instr::Halt);
		Ok(Program {
			instructions: self.instructions,
			int_globals: self.next_int_global,
			float_globals: self.next_float_global,
			max_int_locals: self.max_int_locals,
			max_float_locals: self.max_float_locals,
		})
	}

	fn compile_block(&mut self, statements: &[StmtNode], scope: &Scope<SlotBinding>) -> anyhow::Result<()> {
		for statement in statements {
			self.compile_stmt(statement, scope)?;
		}
		Ok(())
	}

	fn compile_stmt(&mut self, statement: &StmtNode, scope: &Scope<SlotBinding>) -> anyhow::Result<()> {
		match &statement.kind {
			StmtKind::Print(expr) => {
				let ty = self.compile_expr(expr, scope)?;
				self.emit(match ty {
					Type::Int => Instr::PrintI,
					Type::Float => Instr::PrintF,
					Type::Bool => Instr::PrintB,
					Type::Char => Instr::PrintC,
				});
				Ok(())
			},
			StmtKind::ExprStmt(expr) => {
				let ty = self.compile_expr(expr, scope)?;
				self.emit(pop_instr(ty));
				Ok(())
			},
			StmtKind::ConstDecl { name, ty, value } | StmtKind::VarDecl { name, ty, value: Some(value) } => {
				let value_ty = self.compile_expr(value, scope)?;
				if let Some(declared) = ty {
					if *declared != value_ty {
						anyhow::bail!("{name:?}: declared type {} does not match initializer type {}", declared.name(), value_ty.name());
					}
				}
				self.declare(name, value_ty, scope)
			},
			StmtKind::VarDecl { name, ty: Some(ty), value: None } => {
				// No initializer: reserve the slot but leave it at its zero value.
				self.declare(name, *ty, scope)
			},
			StmtKind::VarDecl { value: None, ty: None, .. } => {
				anyhow::bail!("`var` declaration needs either a type or an initializer")
			},
			StmtKind::If { test, then_branch, else_branch } => {
				let test_ty = self.compile_expr(test, scope)?;
				if test_ty != Type::Bool {
					anyhow::bail!("`if` condition must be bool, got {}", test_ty.name());
				}
				let else_label = self.fresh_label();
				let end_label = self.fresh_label();
				self.emit(Instr::Bz(else_label));
				self.compile_block(then_branch, &scope.child())?;
				self.emit(Instr::Goto(end_label));
				self.emit(Instr::Label(else_label));
				if let Some(else_branch) = else_branch {
					self.compile_block(else_branch, &scope.child())?;
				}
				self.emit(Instr::Label(end_label));
				Ok(())
			},
			StmtKind::While { test, body } => {
				let test_label = self.fresh_label();
				let exit_label = self.fresh_label();
				self.emit(Instr::Label(test_label));
				let test_ty = self.compile_expr(test, scope)?;
				if test_ty != Type::Bool {
					anyhow::bail!("`while` condition must be bool, got {}", test_ty.name());
				}
				self.emit(Instr::Bz(exit_label));
				let body_scope = scope.child();
				body_scope.bind_loop_labels(SlotBinding::Loop(exit_label), SlotBinding::Loop(test_label));
				self.compile_block(body, &body_scope)?;
				self.emit(Instr::Goto(test_label));
				self.emit(Instr::Label(exit_label));
				Ok(())
			},
			StmtKind::Break => {
				let (exit, _) = loop_labels(scope)?;
				self.emit(Instr::Goto(exit));
				Ok(())
			},
			StmtKind::Continue => {
				let (_, test) = loop_labels(scope)?;
				self.emit(Instr::Goto(test));
				Ok(())
			},
			StmtKind::Return(expr) => {
				self.compile_expr(expr, scope)?;
				self.emit(Instr::Return);
				Ok(())
			},
			StmtKind::FuncDecl { name, params, body, .. } => self.compile_func_decl(name, params, body, scope),
		}
	}

	fn declare(&mut self, name: &str, ty: Type, scope: &Scope<SlotBinding>) -> anyhow::Result<()> {
		let kind = stack_kind_of(ty);
		let binding = if let Some((next_int, next_float)) = self.local_counters.last_mut() {
			let slot = match kind {
				StackKind::Int => {
					let slot = *next_int;
					*next_int += 1;
					slot
				},
				StackKind::Float => {
					let slot = *next_float;
					*next_float += 1;
					slot
				},
			};
			self.emit(match kind {
				StackKind::Int => Instr::IStoreLocal(slot),
				StackKind::Float => Instr::FStoreLocal(slot),
			});
			self.note_local_high_water();
			SlotBinding::Local { slot, ty }
		} else {
			let slot = match kind {
				StackKind::Int => {
					let slot = self.next_int_global;
					self.next_int_global += 1;
					slot
				},
				StackKind::Float => {
					let slot = self.next_float_global;
					self.next_float_global += 1;
					slot
				},
			};
			self.emit(match kind {
				StackKind::Int => Instr::IStoreGlobal(slot),
				StackKind::Float => Instr::FStoreGlobal(slot),
			});
			SlotBinding::Global { slot, ty }
		};
		scope.define(name.to_owned(), binding).map_err(|_| anyhow::anyhow!("{name:?} is already declared in this scope"))
	}

	fn compile_func_decl(&mut self, name: &str, params: &[crate::ast::Param], body: &[StmtNode], scope: &Scope<SlotBinding>) -> anyhow::Result<()> {
		let SlotBinding::Function { label, .. } = scope.get(name).ok_or_else(|| anyhow::anyhow!("function {name:?} was not hoisted"))? else {
			anyhow::bail!("{name:?} is bound but is not a function");
		};
		let end_label = self.fresh_label();
		self.emit(Instr::Goto(end_label));
		self.emit(Instr::Label(label));

		let func_scope = scope.child();
		let mut next_int = 0usize;
		let mut next_float = 0usize;
		let mut param_slots = Vec::with_capacity(params.len());
		for param in params {
			let slot = match stack_kind_of(param.ty) {
				StackKind::Int => {
					let slot = next_int;
					next_int += 1;
					slot
				},
				StackKind::Float => {
					let slot = next_float;
					next_float += 1;
					slot
				},
			};
			param_slots.push((param, slot));
			func_scope
				.define(param.name.clone(), SlotBinding::Local { slot, ty: param.ty })
				.map_err(|_| anyhow::anyhow!("duplicate parameter name {:?}", param.name))?;
		}
		// Arguments were pushed left-to-right by the caller, so the last argument is on
		// top; popping into slots in reverse order lines slot 0 up with the first param.
		for (param, slot) in param_slots.iter().rev() {
			self.emit(match stack_kind_of(param.ty) {
				StackKind::Int => Instr::IStoreLocal(*slot),
				StackKind::Float => Instr::FStoreLocal(*slot),
			});
		}

		self.local_counters.push((next_int, next_float));
		self.note_local_high_water();
		self.compile_block(body, &func_scope)?;
		self.local_counters.pop();
		self.emit(Instr::Label(end_label));
		Ok(())
	}

	fn compile_expr(&mut self, expr: &ExprNode, scope: &Scope<SlotBinding>) -> anyhow::Result<Type> {
		match &expr.kind {
			ExprKind::Integer(value) => {
				self.emit(Instr::IPush(*value));
				Ok(Type::Int)
			},
			ExprKind::Float(value) => {
				self.emit(Instr::FPush(*value));
				Ok(Type::Float)
			},
			ExprKind::Character(value) => {
				self.emit(Instr::IPush(i64::from(*value as u32)));
				Ok(Type::Char)
			},
			ExprKind::BoolLit(value) => {
				self.emit(Instr::IPush(i64::from(*value)));
				Ok(Type::Bool)
			},
			ExprKind::TypeName(name) => anyhow::bail!("bare type name {name:?} has no runtime representation"),
			ExprKind::Name(name) => {
				let binding = scope.get(name).ok_or_else(|| anyhow::anyhow!("undefined name {name:?}"))?;
				match binding {
					SlotBinding::Local { slot, ty } => {
						self.emit(match stack_kind_of(ty) {
							StackKind::Int => Instr::ILoadLocal(slot),
							StackKind::Float => Instr::FLoadLocal(slot),
						});
						Ok(ty)
					},
					SlotBinding::Global { slot, ty } => {
						self.emit(match stack_kind_of(ty) {
							StackKind::Int => Instr::ILoadGlobal(slot),
							StackKind::Float => Instr::FLoadGlobal(slot),
						});
						Ok(ty)
					},
					SlotBinding::Function { .. } => anyhow::bail!("{name:?} is a function; it cannot be used as a value"),
					SlotBinding::Loop(_) => anyhow::bail!("{name:?} is a reserved loop-target name"),
				}
			},
			ExprKind::Grouping(inner) => self.compile_expr(inner, scope),
			ExprKind::Unary(op, operand) => self.compile_unary(*op, operand, scope),
			ExprKind::Binary(op, left, right) => self.compile_binary(*op, left, right, scope),
			ExprKind::Assignment(target, value) => self.compile_assignment(target, value, scope),
			ExprKind::Call(callee, args) => self.compile_call(callee, args, scope),
			ExprKind::CompoundExpr(statements) => {
				let (init, last) = statements.split_at(statements.len().checked_sub(1).expect("grammar guarantees a non-empty compound expression"));
				let block_scope = scope.child();
				self.compile_block(init, &block_scope)?;
				let StmtKind::ExprStmt(trailing) = &last[0].kind else {
					anyhow::bail!("the final statement of a compound expression must be an expression statement");
				};
				self.compile_expr(trailing, &block_scope)
			},
		}
	}

	fn compile_unary(&mut self, op: UnaryOp, operand: &ExprNode, scope: &Scope<SlotBinding>) -> anyhow::Result<Type> {
		let ty = self.compile_expr(operand, scope)?;
		match (op, ty) {
			(UnaryOp::Pos, Type::Int | Type::Float) => Ok(ty),
			(UnaryOp::Neg, Type::Int) => {
				self.emit(Instr::INeg);
				Ok(Type::Int)
			},
			(UnaryOp::Neg, Type::Float) => {
				self.emit(Instr::FNeg);
				Ok(Type::Float)
			},
			(UnaryOp::Not, Type::Bool) => {
				// No dedicated NOT opcode: `!b` lowers to `b XOR 1`.
				self.emit(Instr::IPush(1));
				self.emit(Instr::Xor);
				Ok(Type::Bool)
			},
			(op, ty) => anyhow::bail!("operator {op:?} does not apply to {}", ty.name()),
		}
	}

	fn compile_binary(&mut self, op: BinOp, left: &ExprNode, right: &ExprNode, scope: &Scope<SlotBinding>) -> anyhow::Result<Type> {
		match op {
			BinOp::LogAnd | BinOp::LogOr => return self.compile_logical(op, left, right, scope),
			_ => {},
		}
		let left_ty = self.compile_expr(left, scope)?;
		let right_ty = self.compile_expr(right, scope)?;
		use BinOp::{Add, Div, Eq, Ge, Gt, Le, Lt, Mul, Ne, Sub};
		match op {
			Add | Sub | Mul | Div => {
				if left_ty != right_ty || !matches!(left_ty, Type::Int | Type::Float) {
					anyhow::bail!("arithmetic requires matching int or float operands, got {} and {}", left_ty.name(), right_ty.name());
				}
				self.emit(match (left_ty, op) {
					(Type::Int, Add) => Instr::IAdd,
					(Type::Int, Sub) => Instr::ISub,
					(Type::Int, Mul) => Instr::IMul,
					(Type::Int, Div) => Instr::IDiv,
					(Type::Float, Add) => Instr::FAdd,
					(Type::Float, Sub) => Instr::FSub,
					(Type::Float, Mul) => Instr::FMul,
					(Type::Float, Div) => Instr::FDiv,
					_ => unreachable!("matched against Add | Sub | Mul | Div above"),
				});
				Ok(left_ty)
			},
			Lt | Le | Gt | Ge => {
				if left_ty != right_ty || !matches!(left_ty, Type::Int | Type::Float | Type::Char) {
					anyhow::bail!("ordering operators require matching int/float/char operands, got {} and {}", left_ty.name(), right_ty.name());
				}
				let cmp = cmp_op(op);
				self.emit(if left_ty == Type::Float { Instr::FCmp(cmp) } else { Instr::ICmp(cmp) });
				Ok(Type::Bool)
			},
			Eq | Ne => {
				if left_ty != right_ty {
					anyhow::bail!("`==`/`!=` require matching operand types, got {} and {}", left_ty.name(), right_ty.name());
				}
				let cmp = cmp_op(op);
				self.emit(if left_ty == Type::Float { Instr::FCmp(cmp) } else { Instr::ICmp(cmp) });
				Ok(Type::Bool)
			},
			BinOp::LogAnd | BinOp::LogOr => unreachable!("handled above"),
		}
	}

	/// Short-circuit lowering for `&&`/`||` (§4.4): evaluate the left operand; if it
	/// already determines the result, skip the right operand entirely.
	fn compile_logical(&mut self, op: BinOp, left: &ExprNode, right: &ExprNode, scope: &Scope<SlotBinding>) -> anyhow::Result<Type> {
		let left_ty = self.compile_expr(left, scope)?;
		if left_ty != Type::Bool {
			anyhow::bail!("`&&`/`||` require bool operands, got {}", left_ty.name());
		}
		let short_circuit = self.fresh_label();
		let end_label = self.fresh_label();
		match op {
			BinOp::LogAnd => {
				// false && _ -> false without evaluating the right side.
				self.emit(Instr::IDup);
				self.emit(Instr::Bz(short_circuit));
				self.emit(Instr::IPop);
				let right_ty = self.compile_expr(right, scope)?;
				if right_ty != Type::Bool {
					anyhow::bail!("`&&` requires bool operands, got {}", right_ty.name());
				}
				self.emit(Instr::Goto(end_label));
				self.emit(Instr::Label(short_circuit));
				self.emit(Instr::Label(end_label));
			},
			BinOp::LogOr => {
				// true || _ -> true without evaluating the right side.
				self.emit(Instr::IDup);
				let zero_check = self.fresh_label();
				self.emit(Instr::Bz(zero_check));
				self.emit(Instr::Goto(short_circuit));
				self.emit(Instr::Label(zero_check));
				self.emit(Instr::IPop);
				let right_ty = self.compile_expr(right, scope)?;
				if right_ty != Type::Bool {
					anyhow::bail!("`||` requires bool operands, got {}", right_ty.name());
				}
				self.emit(Instr::Goto(end_label));
				self.emit(Instr::Label(short_circuit));
				self.emit(Instr::Label(end_label));
			},
			_ => unreachable!("compile_logical is only called for LogAnd/LogOr"),
		}
		Ok(Type::Bool)
	}

	fn compile_assignment(&mut self, target: &ExprNode, value: &ExprNode, scope: &Scope<SlotBinding>) -> anyhow::Result<Type> {
		let ExprKind::Name(name) = &target.kind else {
			anyhow::bail!("the only valid assignment target is a bare name");
		};
		let binding = scope.get(name).ok_or_else(|| anyhow::anyhow!("undefined name {name:?}"))?;
		let (slot, declared_ty, is_global) = match binding {
			SlotBinding::Local { slot, ty } => (slot, ty, false),
			SlotBinding::Global { slot, ty } => (slot, ty, true),
			SlotBinding::Function { .. } => anyhow::bail!("cannot assign to function {name:?}"),
			SlotBinding::Loop(_) => anyhow::bail!("{name:?} is a reserved loop-target name"),
		};
		let value_ty = self.compile_expr(value, scope)?;
		if value_ty != declared_ty {
			anyhow::bail!("cannot assign a {} to {name:?}, which has type {}", value_ty.name(), declared_ty.name());
		}
		// Assignment is an expression (§3.4/§4.3): duplicate so a value remains on the
		// stack after the store, matching the WAT emitter's get-after-set convention.
		self.emit(match stack_kind_of(declared_ty) {
			StackKind::Int => Instr::IDup,
			StackKind::Float => Instr::FDup,
		});
		self.emit(match (stack_kind_of(declared_ty), is_global) {
			(StackKind::Int, true) => Instr::IStoreGlobal(slot),
			(StackKind::Int, false) => Instr::IStoreLocal(slot),
			(StackKind::Float, true) => Instr::FStoreGlobal(slot),
			(StackKind::Float, false) => Instr::FStoreLocal(slot),
		});
		Ok(declared_ty)
	}

	fn compile_call(&mut self, callee: &ExprNode, args: &[ExprNode], scope: &Scope<SlotBinding>) -> anyhow::Result<Type> {
		if let ExprKind::Name(name) = &callee.kind {
			if let Some(ty) = Type::from_name(name) {
				if scope.get(name).is_none() {
					if args.len() != 1 {
						anyhow::bail!("cast `{name}(...)` takes exactly one argument");
					}
					let arg_ty = self.compile_expr(&args[0], scope)?;
					return self.compile_cast(ty, arg_ty);
				}
			}
		}
		let ExprKind::Name(name) = &callee.kind else {
			anyhow::bail!("called value must be a bare function name");
		};
		let SlotBinding::Function { label, params, ret_type } = scope.get(name).ok_or_else(|| anyhow::anyhow!("undefined function {name:?}"))? else {
			anyhow::bail!("{name:?} is not a function");
		};
		if args.len() != params.len() {
			anyhow::bail!("function {name:?} expects {} argument(s), got {}", params.len(), args.len());
		}
		for (arg, expected) in args.iter().zip(&params) {
			let arg_ty = self.compile_expr(arg, scope)?;
			if arg_ty != *expected {
				anyhow::bail!("function {name:?} expects {}, got {}", expected.name(), arg_ty.name());
			}
		}
		self.emit(Instr::Call(label));
		Ok(ret_type)
	}

	fn compile_cast(&mut self, target: Type, source: Type) -> anyhow::Result<Type> {
		match (target, source) {
			(Type::Int, Type::Float) => self.emit(Instr::FToI),
			(Type::Float, Type::Int) => self.emit(Instr::IToF),
			(a, b) if a == b => {},
			(Type::Int, Type::Bool | Type::Char) | (Type::Bool, Type::Int | Type::Char) | (Type::Char, Type::Int | Type::Bool) => {
				// bool/char/int all already share the int stack representation.
			},
			_ => anyhow::bail!("cannot cast {} to {}", source.name(), target.name()),
		}
		Ok(target)
	}
}

impl Default for Compiler {
	fn default() -> Self {
		Self::new()
	}
}

fn pop_instr(ty: Type) -> Instr {
	match stack_kind_of(ty) {
		StackKind::Int => Instr::IPop,
		StackKind::Float => Instr::FPop,
	}
}

fn cmp_op(op: BinOp) -> CmpOp {
	match op {
		BinOp::Lt => CmpOp::Lt,
		BinOp::Le => CmpOp::Le,
		BinOp::Gt => CmpOp::Gt,
		BinOp::Ge => CmpOp::Ge,
		BinOp::Eq => CmpOp::Eq,
		BinOp::Ne => CmpOp::Ne,
		_ => unreachable!("cmp_op is only called with a comparison operator"),
	}
}

/// A call frame (§4.4): return address plus this invocation's local slot arrays.
struct Frame {
	return_pc: usize,
	locals_i: Vec<i64>,
	locals_f: Vec<f64>,
}

/// Executes a compiled [`Program`] (§4.4's "Execution").
pub struct Vm<W> {
	output: W,
}

impl<W: std::io::Write> Vm<W> {
	#[must_use]
	pub fn new(output: W) -> Self {
		Self { output }
	}

	pub fn run(&mut self, program: &Program) -> anyhow::Result<()> {
		let label_pcs = index_labels(&program.instructions);

		let mut int_stack: Vec<i64> = Vec::new();
		let mut float_stack: Vec<f64> = Vec::new();
		let mut globals_i = vec![0i64; program.int_globals];
		let mut globals_f = vec![0f64; program.float_globals];
		let mut frames: Vec<Frame> = vec![Frame { return_pc: usize::MAX, locals_i: vec![0; program.max_int_locals], locals_f: vec![0.0; program.max_float_locals] }];
		let mut pc = 0usize;

		loop {
			let instr = program.instructions.get(pc).ok_or_else(|| anyhow::anyhow!("program counter {pc} ran off the end of the program"))?;
			match instr {
				Instr::IPush(value) => int_stack.push(*value),
				Instr::FPush(value) => float_stack.push(*value),
				Instr::IDup => {
					let value = *int_stack.last().ok_or_else(|| anyhow::anyhow!("IDUP on an empty int stack"))?;
					int_stack.push(value);
				},
				Instr::FDup => {
					let value = *float_stack.last().ok_or_else(|| anyhow::anyhow!("FDUP on an empty float stack"))?;
					float_stack.push(value);
				},
				Instr::IPop => {
					int_stack.pop().ok_or_else(|| anyhow::anyhow!("IPOP on an empty int stack"))?;
				},
				Instr::FPop => {
					float_stack.pop().ok_or_else(|| anyhow::anyhow!("FPOP on an empty float stack"))?;
				},
				Instr::IAdd => binary_int(&mut int_stack, i64::wrapping_add)?,
				Instr::ISub => binary_int(&mut int_stack, i64::wrapping_sub)?,
				Instr::IMul => binary_int(&mut int_stack, i64::wrapping_mul)?,
				Instr::IDiv => {
					let right = pop_i(&mut int_stack)?;
					let left = pop_i(&mut int_stack)?;
					if right == 0 {
						anyhow::bail!("integer division by zero");
					}
					int_stack.push(left / right);
				},
				Instr::INeg => {
					let value = pop_i(&mut int_stack)?;
					int_stack.push(-value);
				},
				Instr::FAdd => binary_float(&mut float_stack, |a, b| a + b)?,
				Instr::FSub => binary_float(&mut float_stack, |a, b| a - b)?,
				Instr::FMul => binary_float(&mut float_stack, |a, b| a * b)?,
				Instr::FDiv => binary_float(&mut float_stack, |a, b| a / b)?,
				Instr::FNeg => {
					let value = pop_f(&mut float_stack)?;
					float_stack.push(-value);
				},
				Instr::And => binary_int(&mut int_stack, |a, b| i64::from(a != 0 && b != 0))?,
				Instr::Or => binary_int(&mut int_stack, |a, b| i64::from(a != 0 || b != 0))?,
				Instr::Xor => binary_int(&mut int_stack, |a, b| a ^ b)?,
				Instr::ICmp(op) => {
					let right = pop_i(&mut int_stack)?;
					let left = pop_i(&mut int_stack)?;
					int_stack.push(i64::from(apply_cmp(*op, left.cmp(&right))));
				},
				Instr::FCmp(op) => {
					let right = pop_f(&mut float_stack)?;
					let left = pop_f(&mut float_stack)?;
					let ordering = left.partial_cmp(&right).ok_or_else(|| anyhow::anyhow!("FCMP on NaN"))?;
					int_stack.push(i64::from(apply_cmp(*op, ordering)));
				},
				Instr::IToF => {
					let value = pop_i(&mut int_stack)?;
					float_stack.push(value as f64);
				},
				Instr::FToI => {
					let value = pop_f(&mut float_stack)?;
					int_stack.push(value as i64);
				},
				Instr::ILoadLocal(slot) => int_stack.push(current_frame(&frames)?.locals_i[*slot]),
				Instr::FLoadLocal(slot) => float_stack.push(current_frame(&frames)?.locals_f[*slot]),
				Instr::IStoreLocal(slot) => {
					let value = pop_i(&mut int_stack)?;
					current_frame_mut(&mut frames)?.locals_i[*slot] = value;
				},
				Instr::FStoreLocal(slot) => {
					let value = pop_f(&mut float_stack)?;
					current_frame_mut(&mut frames)?.locals_f[*slot] = value;
				},
				Instr::ILoadGlobal(slot) => int_stack.push(globals_i[*slot]),
				Instr::FLoadGlobal(slot) => float_stack.push(globals_f[*slot]),
				Instr::IStoreGlobal(slot) => globals_i[*slot] = pop_i(&mut int_stack)?,
				Instr::FStoreGlobal(slot) => globals_f[*slot] = pop_f(&mut float_stack)?,
				Instr::Label(_) => {},
				Instr::Goto(label) => {
					pc = resolve(&label_pcs, *label)?;
					continue;
				},
				Instr::Bz(label) => {
					let value = pop_i(&mut int_stack)?;
					if value == 0 {
						pc = resolve(&label_pcs, *label)?;
						continue;
					}
				},
				Instr::Call(label) => {
					frames.push(Frame { return_pc: pc + 1, locals_i: vec![0; program.max_int_locals], locals_f: vec![0.0; program.max_float_locals] });
					pc = resolve(&label_pcs, *label)?;
					continue;
				},
				Instr::Return => {
					let frame = frames.pop().ok_or_else(|| anyhow::anyhow!("RETURN with no active call frame"))?;
					pc = frame.return_pc;
					continue;
				},
				Instr::Halt => return Ok(()),
				Instr::PrintI => writeln!(self.output, "{}", pop_i(&mut int_stack)?)?,
				Instr::PrintF => writeln!(self.output, "{}", pop_f(&mut float_stack)?)?,
				Instr::PrintB => writeln!(self.output, "{}", pop_i(&mut int_stack)? != 0)?,
				Instr::PrintC => {
					let value = pop_i(&mut int_stack)?;
					let ch = char::from_u32(value as u32).unwrap_or('\u{fffd}');
					write!(self.output, "{ch}")?;
				},
			}
			pc += 1;
		}
	}
}

fn index_labels(instructions: &[Instr]) -> std::collections::HashMap<u32, usize> {
	instructions
		.iter()
		.enumerate()
		.filter_map(|(pc, instr)| if let Instr::Label(id) = instr { Some((*id, pc)) } else { None })
		.collect()
}

fn resolve(label_pcs: &std::collections::HashMap<u32, usize>, label: u32) -> anyhow::Result<usize> {
	label_pcs.get(&label).copied().ok_or_else(|| anyhow::anyhow!("unresolved label {label}"))
}

fn current_frame(frames: &[Frame]) -> anyhow::Result<&Frame> {
	frames.last().ok_or_else(|| anyhow::anyhow!("no active call frame"))
}

fn current_frame_mut(frames: &mut [Frame]) -> anyhow::Result<&mut Frame> {
	frames.last_mut().ok_or_else(|| anyhow::anyhow!("no active call frame"))
}

fn pop_i(stack: &mut Vec<i64>) -> anyhow::Result<i64> {
	stack.pop().ok_or_else(|| anyhow::anyhow!("int stack underflow"))
}

fn pop_f(stack: &mut Vec<f64>) -> anyhow::Result<f64> {
	stack.pop().ok_or_else(|| anyhow::anyhow!("float stack underflow"))
}

fn binary_int(stack: &mut Vec<i64>, f: impl Fn(i64, i64) -> i64) -> anyhow::Result<()> {
	let right = pop_i(stack)?;
	let left = pop_i(stack)?;
	stack.push(f(left, right));
	Ok(())
}

fn binary_float(stack: &mut Vec<f64>, f: impl Fn(f64, f64) -> f64) -> anyhow::Result<()> {
	let right = pop_f(stack)?;
	let left = pop_f(stack)?;
	stack.push(f(left, right));
	Ok(())
}

fn apply_cmp(op: CmpOp, ordering: std::cmp::Ordering) -> bool {
	use std::cmp::Ordering::{Equal, Greater, Less};
	match (op, ordering) {
		(CmpOp::Lt, Less) | (CmpOp::Le, Less | Equal) | (CmpOp::Gt, Greater) | (CmpOp::Ge, Greater | Equal) => true,
		(CmpOp::Eq, Equal) => true,
		(CmpOp::Ne, Less | Greater) => true,
		_ => false,
	}
}

fn loop_labels(scope: &Scope<SlotBinding>) -> anyhow::Result<(u32, u32)> {
	let (SlotBinding::Loop(exit), SlotBinding::Loop(test)) = scope.loop_labels().ok_or_else(|| anyhow::anyhow!("`break`/`continue` outside of an enclosing `while` loop"))? else {
		anyhow::bail!("internal error: loop label slot held a non-loop binding");
	};
	Ok((exit, test))
}

pub fn compile(program: &AstProgram) -> anyhow::Result<Program> {
	Compiler::new().compile(program)
}

pub fn execute(program: &Program, output: impl std::io::Write) -> anyhow::Result<()> {
	Vm::new(output).run(program)
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
		let compiled = compile(&program).unwrap();
		let mut output = Vec::new();
		execute(&compiled, &mut output).unwrap();
		String::from_utf8(output).unwrap()
	}

	#[test]
	fn arithmetic_precedence() {
		assert_eq!(run_source("print 2 + 3 * 4;"), "14\n");
	}

	#[test]
	fn function_call_disassembly_starts_with_the_prologue() {
		let (tokens, lex_diagnostics) = tokenize("func add(x int, y int) int { return x + y; } print add(2, 3);");
		assert!(lex_diagnostics.is_empty());
		let (program, parse_diagnostics) = parse(tokens).unwrap();
		assert!(parse_diagnostics.is_empty());
		let compiled = compile(&program).unwrap();
		let listing = compiled.disassemble();
		let opcodes: Vec<&str> = listing
			.lines()
			.map(|line| line.split_whitespace().nth(1).unwrap_or(""))
			.take(4)
			.collect();
		assert_eq!(opcodes, ["Goto(1)", "Label(0)", "IStoreLocal(1)", "IStoreLocal(0)"]);

		let mut output = Vec::new();
		execute(&compiled, &mut output).unwrap();
		assert_eq!(String::from_utf8(output).unwrap(), "5\n");
	}

	#[test]
	fn logical_and_short_circuits() {
		assert_eq!(run_source("func boom() bool { print 1; return true; } print false && boom();"), "0\n");
	}

	#[test]
	fn logical_or_short_circuits() {
		assert_eq!(run_source("func boom() bool { print 1; return true; } print true || boom();"), "1\n");
	}

	#[test]
	fn while_with_break_and_continue() {
		assert_eq!(run_source("var n = 1; while true { if n == 3 { print n; break; } else { n = n + 1; continue; } }"), "3\n");
	}

	#[test]
	fn integer_division_truncates() {
		assert_eq!(run_source("print 7 / 2;"), "3\n");
	}

	#[test]
	fn comparison_and_equality() {
		assert_eq!(run_source("print 3 < 4; print 3 == 3; print 'a' != 'b';"), "1\n1\n1\n");
	}

	#[test]
	fn casts_between_numeric_types() {
		assert_eq!(run_source("print int(3.9); print float(2);"), "3\n2\n");
	}

	#[test]
	fn division_by_zero_is_a_runtime_error() {
		let (tokens, lex_diagnostics) = tokenize("print 1 / 0;");
		assert!(lex_diagnostics.is_empty());
		let (program, parse_diagnostics) = parse(tokens).unwrap();
		assert!(parse_diagnostics.is_empty());
		let compiled = compile(&program).unwrap();
		let mut output = Vec::new();
		assert!(execute(&compiled, &mut output).is_err());
	}
}
