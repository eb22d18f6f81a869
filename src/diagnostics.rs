//! Shared diagnostic types for the lexer, parser, and back-ends.
//!
//! Wabbit defines three error kinds (lex, parse, semantic/runtime); all three
//! are represented here as a single `Diagnostic` tagged by `DiagnosticKind`
//! so that every phase of the pipeline can aggregate and report errors the
//! same way, instead of inventing a parallel error type per phase.

use std::fmt;

use colored::Colorize as _;

/// Which phase of the pipeline raised a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
	/// An illegal byte, unterminated block comment, or unterminated character literal.
	Lex,
	/// An unexpected token given an `expect` set.
	Parse,
	/// A duplicate declaration, assignment-to-const, type mismatch, undefined name, wrong
	/// argument count, or non-bool test, surfaced either by the interpreter or a back-end.
	Semantic,
}

impl fmt::Display for DiagnosticKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Lex => "lex error",
			Self::Parse => "parse error",
			Self::Semantic => "semantic error",
		};
		write!(f, "{name}")
	}
}

/// A single recorded error with enough context to point a user at the offending source.
#[derive(Debug, Clone)]
pub struct Diagnostic {
	pub kind: DiagnosticKind,
	pub message: String,
	/// 1-based line number, when known.
	pub line: Option<usize>,
}

impl Diagnostic {
	#[must_use]
	pub fn new(kind: DiagnosticKind, message: impl Into<String>, line: Option<usize>) -> Self {
		Self { kind, message: message.into(), line }
	}

	#[must_use]
	pub fn lex(message: impl Into<String>, line: usize) -> Self {
		Self::new(DiagnosticKind::Lex, message, Some(line))
	}

	#[must_use]
	pub fn parse(message: impl Into<String>, line: usize) -> Self {
		Self::new(DiagnosticKind::Parse, message, Some(line))
	}

	#[must_use]
	pub fn semantic(message: impl Into<String>, line: Option<usize>) -> Self {
		Self::new(DiagnosticKind::Semantic, message, line)
	}
}

impl fmt::Display for Diagnostic {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let header = format!("{}", self.kind).red().bold();
		match self.line {
			Some(line) => write!(f, "{header}: {} (line {line})", self.message),
			None => write!(f, "{header}: {}", self.message),
		}
	}
}

/// An aggregate of every [`Diagnostic`] recorded while processing a source file.
///
/// A caller can inspect `is_empty()` and choose to proceed on a best-effort
/// basis (the lexer always returns its full token list alongside its
/// diagnostics) or abort.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
	entries: Vec<Diagnostic>,
}

impl Diagnostics {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, diagnostic: Diagnostic) {
		self.entries.push(diagnostic);
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
		self.entries.iter()
	}

	pub fn extend(&mut self, other: Diagnostics) {
		self.entries.extend(other.entries);
	}

	/// Converts this aggregate into an `anyhow::Error` if it holds any diagnostics.
	pub fn into_result(self) -> anyhow::Result<()> {
		if self.entries.is_empty() {
			Ok(())
		} else {
			anyhow::bail!("{self}")
		}
	}
}

impl fmt::Display for Diagnostics {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (index, diagnostic) in self.entries.iter().enumerate() {
			if index > 0 {
				writeln!(f)?;
			}
			write!(f, "{diagnostic}")?;
		}
		Ok(())
	}
}
