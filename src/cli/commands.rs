//! One struct per subcommand (§6.1), each a thin driver over the shared
//! lexer/parser/interpreter/back-end pipeline.

use std::path::PathBuf;

use crate::context::Context;
use crate::lexer::tokenize;
use crate::parser::parse;

use super::WabbitCommand;

fn read_source(path: &PathBuf) -> anyhow::Result<String> {
	std::fs::read_to_string(path).map_err(|error| anyhow::anyhow!("failed to read {}: {error}", path.display()))
}

#[derive(clap::Parser)]
pub struct TokenizeCommand {
	pub source: PathBuf,
}

impl WabbitCommand for TokenizeCommand {
	fn execute(&self) -> anyhow::Result<()> {
		let source = read_source(&self.source)?;
		let (tokens, diagnostics) = tokenize(&source);
		for token in &tokens {
			println!("{}({})", token.kind.to_string().to_uppercase(), token.text);
		}
		diagnostics.into_result()
	}
}

#[derive(clap::Parser)]
pub struct InterpretCommand {
	pub source: PathBuf,
	#[arg(short, long)]
	pub verbose: bool,
}

impl WabbitCommand for InterpretCommand {
	fn execute(&self) -> anyhow::Result<()> {
		let source = read_source(&self.source)?;
		let context = Context::new(self.source.display().to_string(), self.verbose);
		let (tokens, lex_diagnostics) = tokenize(&source);
		lex_diagnostics.into_result()?;
		context.trace(format!("{} tokens", tokens.len()));
		let (program, parse_diagnostics) = parse(tokens)?;
		parse_diagnostics.into_result()?;
		crate::interpreter::run(&program, std::io::stdout())
	}
}

#[derive(clap::Parser)]
pub struct WvmCommand {
	pub source: PathBuf,
	/// Print the compiled instruction listing before running it (SPEC_FULL.md §2).
	#[arg(long)]
	pub dump: bool,
}

impl WabbitCommand for WvmCommand {
	fn execute(&self) -> anyhow::Result<()> {
		let source = read_source(&self.source)?;
		let (tokens, lex_diagnostics) = tokenize(&source);
		lex_diagnostics.into_result()?;
		let (ast, parse_diagnostics) = parse(tokens)?;
		parse_diagnostics.into_result()?;
		let program = crate::wvm::compile(&ast)?;
		if self.dump {
			print!("{}", program.disassemble());
		}
		crate::wvm::execute(&program, std::io::stdout())
	}
}

#[derive(clap::Parser)]
pub struct WasmCommand {
	pub source: PathBuf,
}

impl WabbitCommand for WasmCommand {
	fn execute(&self) -> anyhow::Result<()> {
		let source = read_source(&self.source)?;
		let (tokens, lex_diagnostics) = tokenize(&source);
		lex_diagnostics.into_result()?;
		let (ast, parse_diagnostics) = parse(tokens)?;
		parse_diagnostics.into_result()?;
		let wat = crate::wasm::emit(&ast)?;
		std::fs::write("out.wat", wat)?;

		// `wat2wasm`/`node` are external tools (§1/§6.1); this crate only shells out.
		let status = std::process::Command::new("wat2wasm").arg("out.wat").arg("-o").arg("out.wasm").status()?;
		if !status.success() {
			anyhow::bail!("wat2wasm exited with {status}");
		}
		let status = std::process::Command::new("node").arg("--experimental-wasm-modules").arg("out.wasm").status()?;
		if !status.success() {
			anyhow::bail!("node exited with {status}");
		}
		Ok(())
	}
}

#[derive(clap::Parser)]
pub struct LlvmCommand {
	pub source: PathBuf,
}

impl WabbitCommand for LlvmCommand {
	fn execute(&self) -> anyhow::Result<()> {
		let source = read_source(&self.source)?;
		let (tokens, lex_diagnostics) = tokenize(&source);
		lex_diagnostics.into_result()?;
		let (ast, parse_diagnostics) = parse(tokens)?;
		parse_diagnostics.into_result()?;
		let ir = crate::llvm::emit(&ast)?;
		std::fs::write("out.ll", ir)?;

		// `clang` is external (§1/§6.1); this crate only writes the artifact and invokes it.
		let status = std::process::Command::new("clang").arg("out.ll").arg("-o").arg("out").status()?;
		if !status.success() {
			anyhow::bail!("clang exited with {status}");
		}
		let status = std::process::Command::new("./out").status()?;
		if !status.success() {
			anyhow::bail!("compiled program exited with {status}");
		}
		Ok(())
	}
}
