//! The lexer (§4.1/§6.2): a single left-to-right pass over the source text.
//!
//! `TokenKind` is a [`strum_macros::EnumIter`]-derived enum, the way the teacher's
//! `TokenType` is, but keyword recognition goes through a `phf::phf_map!` literal table
//! instead of an `EnumIter` scan -- the teacher already reaches for `phf` for its
//! builtin-function table, so this reuses the same crate for a different constant
//! lookup instead of introducing a new one.

use convert_case::Casing as _;

use crate::diagnostics::{Diagnostic, Diagnostics};

/// A token kind from the fixed enumeration in §6.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::EnumIter, strum_macros::Display)]
pub enum TokenKind {
	Plus,
	Minus,
	Times,
	Divide,
	Lt,
	Gt,
	Le,
	Ge,
	Eq,
	Ne,
	Assign,
	Land,
	Lor,
	Lnot,
	Semi,
	LParen,
	RParen,
	LBrace,
	RBrace,
	Comma,
	Integer,
	Float,
	Char,
	Id,
	If,
	Else,
	While,
	Var,
	Const,
	Break,
	Continue,
	Print,
	Func,
	Return,
	True,
	False,
	Eof,
}

impl TokenKind {
	/// A human-readable rendering used in "unexpected token, expected one of ..."
	/// diagnostics, the way the teacher's lexer converts `TokenType` variant names to
	/// title case for error messages.
	#[must_use]
	pub fn describe(self) -> String {
		self.to_string().to_case(convert_case::Case::Title)
	}
}

/// The reserved-word table (§4.1): an identifier lexeme that matches one of these becomes
/// the corresponding keyword token instead of `Id`.
static KEYWORDS: phf::Map<&'static str, TokenKind> = phf::phf_map! {
	"print" => TokenKind::Print,
	"if" => TokenKind::If,
	"else" => TokenKind::Else,
	"var" => TokenKind::Var,
	"const" => TokenKind::Const,
	"func" => TokenKind::Func,
	"while" => TokenKind::While,
	"break" => TokenKind::Break,
	"continue" => TokenKind::Continue,
	"return" => TokenKind::Return,
	"true" => TokenKind::True,
	"false" => TokenKind::False,
};

/// A single token: its kind, its original text, the 1-based line it began on, and its
/// 0-based byte offset into the source (§3.1).
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
	pub kind: TokenKind,
	pub text: String,
	pub line: usize,
	pub index: usize,
}

impl Token {
	fn new(kind: TokenKind, text: impl Into<String>, line: usize, index: usize) -> Self {
		Self { kind, text: text.into(), line, index }
	}
}

struct Lexer<'source> {
	source: &'source [u8],
	position: usize,
	line: usize,
	tokens: Vec<Token>,
	diagnostics: Diagnostics,
}

impl<'source> Lexer<'source> {
	fn new(source: &'source str) -> Self {
		Self {
			source: source.as_bytes(),
			position: 0,
			line: 1,
			tokens: Vec::new(),
			diagnostics: Diagnostics::new(),
		}
	}

	fn peek(&self) -> Option<u8> {
		self.source.get(self.position).copied()
	}

	fn peek_at(&self, offset: usize) -> Option<u8> {
		self.source.get(self.position + offset).copied()
	}

	fn advance(&mut self) -> Option<u8> {
		let byte = self.peek()?;
		self.position += 1;
		if byte == b'\n' {
			self.line += 1;
		}
		Some(byte)
	}

	fn starts_with(&self, needle: &str) -> bool {
		self.source[self.position..].starts_with(needle.as_bytes())
	}

	fn run(mut self) -> (Vec<Token>, Diagnostics) {
		while let Some(byte) = self.peek() {
			match byte {
				b' ' | b'\t' | b'\r' | b'\n' => {
					self.advance();
				},
				b'/' if self.starts_with("//") => self.skip_line_comment(),
				b'/' if self.starts_with("/*") => self.skip_block_comment(),
				b'0'..=b'9' => self.lex_number(),
				b'\'' => self.lex_char(),
				b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.lex_identifier(),
				_ => self.lex_operator_or_illegal(),
			}
		}
		let eof_line = self.line;
		let eof_index = self.position;
		self.tokens.push(Token::new(TokenKind::Eof, "", eof_line, eof_index));
		(self.tokens, self.diagnostics)
	}

	fn skip_line_comment(&mut self) {
		while let Some(byte) = self.peek() {
			if byte == b'\n' {
				break;
			}
			self.advance();
		}
	}

	fn skip_block_comment(&mut self) {
		let start_line = self.line;
		self.advance();
		self.advance();
		loop {
			if self.starts_with("*/") {
				self.advance();
				self.advance();
				return;
			}
			if self.advance().is_none() {
				self.diagnostics.push(Diagnostic::lex("unterminated block comment", start_line));
				return;
			}
		}
	}

	fn lex_number(&mut self) {
		let start_line = self.line;
		let start = self.position;
		while matches!(self.peek(), Some(b'0'..=b'9')) {
			self.advance();
		}
		let mut is_float = false;
		if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
			is_float = true;
			self.advance();
			while matches!(self.peek(), Some(b'0'..=b'9')) {
				self.advance();
			}
		}
		let text = String::from_utf8_lossy(&self.source[start..self.position]).into_owned();
		let kind = if is_float { TokenKind::Float } else { TokenKind::Integer };
		self.tokens.push(Token::new(kind, text, start_line, start));
	}

	fn lex_char(&mut self) {
		let start_line = self.line;
		let start = self.position;
		self.advance(); // opening quote
		let mut value = String::new();
		match self.advance() {
			Some(b'\\') => {
				if let Some(escaped) = self.advance() {
					value.push(unescape(escaped));
				}
			},
			Some(byte) => value.push(byte as char),
			None => {
				self.diagnostics.push(Diagnostic::lex("unterminated character literal", start_line));
				return;
			},
		}
		if self.peek() == Some(b'\'') {
			self.advance();
		} else {
			self.diagnostics.push(Diagnostic::lex("unterminated character literal", start_line));
			return;
		}
		self.tokens.push(Token::new(TokenKind::Char, value, start_line, start));
	}

	fn lex_identifier(&mut self) {
		let start_line = self.line;
		let start = self.position;
		while matches!(self.peek(), Some(b'a'..=b'z' | b'A'..=b'Z' | b'_')) {
			self.advance();
		}
		let text = String::from_utf8_lossy(&self.source[start..self.position]).into_owned();
		let kind = KEYWORDS.get(text.as_str()).copied().unwrap_or(TokenKind::Id);
		self.tokens.push(Token::new(kind, text, start_line, start));
	}

	fn lex_operator_or_illegal(&mut self) {
		const TWO_CHAR: &[(&str, TokenKind)] = &[
			("<=", TokenKind::Le),
			(">=", TokenKind::Ge),
			("==", TokenKind::Eq),
			("!=", TokenKind::Ne),
			("&&", TokenKind::Land),
			("||", TokenKind::Lor),
		];
		for (text, kind) in TWO_CHAR {
			if self.starts_with(text) {
				let start_line = self.line;
				let start = self.position;
				self.advance();
				self.advance();
				self.tokens.push(Token::new(*kind, *text, start_line, start));
				return;
			}
		}

		const ONE_CHAR: &[(u8, TokenKind)] = &[
			(b'+', TokenKind::Plus),
			(b'-', TokenKind::Minus),
			(b'*', TokenKind::Times),
			(b'/', TokenKind::Divide),
			(b'<', TokenKind::Lt),
			(b'>', TokenKind::Gt),
			(b'=', TokenKind::Assign),
			(b'!', TokenKind::Lnot),
			(b';', TokenKind::Semi),
			(b'(', TokenKind::LParen),
			(b')', TokenKind::RParen),
			(b'{', TokenKind::LBrace),
			(b'}', TokenKind::RBrace),
			(b',', TokenKind::Comma),
		];
		let byte = self.peek().expect("caller only invokes this with a byte available");
		if let Some((_, kind)) = ONE_CHAR.iter().find(|(candidate, _)| *candidate == byte) {
			let start_line = self.line;
			let start = self.position;
			self.advance();
			self.tokens.push(Token::new(*kind, (byte as char).to_string(), start_line, start));
			return;
		}

		let start_line = self.line;
		self.diagnostics.push(Diagnostic::lex(format!("illegal character '{}' on line {start_line}", byte as char), start_line));
		self.advance();
	}
}

fn unescape(escaped: u8) -> char {
	match escaped {
		b'n' => '\n',
		b't' => '\t',
		b'r' => '\r',
		b'0' => '\0',
		b'\\' => '\\',
		b'\'' => '\'',
		other => other as char,
	}
}

/// Tokenizes `source`, always returning a full best-effort token list (terminated by a
/// synthetic `Eof`) alongside any aggregated lex errors (§4.1).
#[must_use]
pub fn tokenize(source: &str) -> (Vec<Token>, Diagnostics) {
	Lexer::new(source).run()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn kinds(source: &str) -> Vec<TokenKind> {
		tokenize(source).0.into_iter().map(|token| token.kind).collect()
	}

	#[test]
	fn operators_and_punctuation() {
		use TokenKind::{Comma, Divide, Eq, Eof, Ge, Gt, LBrace, LParen, Land, Le, Lnot, Lor, Lt, Minus, Ne, Plus, RBrace, RParen, Semi, Times};
		assert_eq!(
			kinds("+ - * / < > <= >= == != = && || , ; ( ) { } !"),
			vec![Plus, Minus, Times, Divide, Lt, Gt, Le, Ge, Eq, Ne, TokenKind::Assign, Land, Lor, Comma, Semi, LParen, RParen, LBrace, RBrace, Lnot, Eof]
		);
	}

	#[test]
	fn integer_then_float() {
		let tokens = tokenize("123 123.45").0;
		assert_eq!(tokens[0].kind, TokenKind::Integer);
		assert_eq!(tokens[0].text, "123");
		assert_eq!(tokens[1].kind, TokenKind::Float);
		assert_eq!(tokens[1].text, "123.45");
		assert_eq!(tokens[2].kind, TokenKind::Eof);
	}

	#[test]
	fn keywords() {
		use TokenKind::{Break, Const, Continue, Eof, Else, False, Func, If, Print, Return, True, Var, While};
		assert_eq!(
			kinds("if else while var const break continue print func return true false"),
			vec![If, Else, While, Var, Const, Break, Continue, Print, Func, Return, True, False, Eof]
		);
	}

	#[test]
	fn line_comment_is_skipped() {
		assert_eq!(kinds("1 // two\n3"), vec![TokenKind::Integer, TokenKind::Integer, TokenKind::Eof]);
	}

	#[test]
	fn unterminated_block_comment_is_a_diagnostic_but_lexing_continues() {
		let (tokens, diagnostics) = tokenize("1 /* oops");
		assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
		assert!(!diagnostics.is_empty());
	}

	#[test]
	fn illegal_character_is_recorded_and_skipped() {
		let (tokens, diagnostics) = tokenize("1 @ 2");
		assert_eq!(tokens.iter().map(|token| token.kind).collect::<Vec<_>>(), vec![TokenKind::Integer, TokenKind::Integer, TokenKind::Eof]);
		assert_eq!(diagnostics.len(), 1);
	}

	#[test]
	fn char_literal_and_escape() {
		let tokens = tokenize("'a' '\\n'").0;
		assert_eq!(tokens[0].kind, TokenKind::Char);
		assert_eq!(tokens[0].text, "a");
		assert_eq!(tokens[1].text, "\n");
	}
}
