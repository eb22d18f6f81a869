//! The compilation context (SPEC_FULL.md §3): the source file name, a [`Diagnostics`]
//! sink, and a verbosity flag, threaded by `&mut` through every pipeline phase instead of
//! each phase inventing its own bookkeeping.

use crate::diagnostics::Diagnostics;

/// Carries cross-phase bookkeeping for a single invocation (§5: one source file per run).
pub struct Context {
	pub file_name: String,
	pub diagnostics: Diagnostics,
	pub verbose: bool,
}

impl Context {
	#[must_use]
	pub fn new(file_name: impl Into<String>, verbose: bool) -> Self {
		Self { file_name: file_name.into(), diagnostics: Diagnostics::new(), verbose }
	}

	/// Prints `message` to stderr when `--verbose` was requested, for echoing intermediate
	/// artifacts (tokens, instructions) the way SPEC_FULL.md §1 describes.
	pub fn trace(&self, message: impl std::fmt::Display) {
		if self.verbose {
			eprintln!("{message}");
		}
	}
}
