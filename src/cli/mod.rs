//! Subcommand dispatch (§6.1), the teacher's `CabinCommand`/`enum_dispatch` pattern
//! fitted to Wabbit's five subcommands.

pub mod commands;

use commands::{InterpretCommand, LlvmCommand, TokenizeCommand, WasmCommand, WvmCommand};

#[enum_dispatch::enum_dispatch]
pub trait WabbitCommand {
	/// Executes this subcommand against its source file, writing to stdout/stderr and
	/// any on-disk artifact (`out.wat`/`out.ll`) it produces.
	fn execute(&self) -> anyhow::Result<()>;
}

#[derive(clap::Subcommand)]
#[enum_dispatch::enum_dispatch(WabbitCommand)]
pub enum Subcommand {
	/// Prints one token per line as `KIND(value)`.
	Tokenize(TokenizeCommand),
	/// Executes the program with the tree-walking interpreter.
	Interpret(InterpretCommand),
	/// Compiles to the WVM instruction set and runs it.
	Wvm(WvmCommand),
	/// Emits `out.wat` and invokes `wat2wasm` + a Node host to run it.
	Wasm(WasmCommand),
	/// Emits `out.ll` and invokes `clang` to build and run it.
	Llvm(LlvmCommand),
}
