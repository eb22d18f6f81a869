use wabbit::lexer::{tokenize, TokenKind};

#[test]
fn tokenizes_arithmetic_and_keywords() {
	let (tokens, diagnostics) = tokenize("var x = 2 + 3 * 4;");
	assert!(diagnostics.is_empty(), "{diagnostics}");
	let kinds: Vec<TokenKind> = tokens.iter().map(|token| token.kind).collect();
	assert_eq!(
		kinds,
		vec![
			TokenKind::Var,
			TokenKind::Id,
			TokenKind::Assign,
			TokenKind::Integer,
			TokenKind::Plus,
			TokenKind::Integer,
			TokenKind::Times,
			TokenKind::Integer,
			TokenKind::Semi,
			TokenKind::Eof,
		]
	);
}

#[test]
fn tracks_line_numbers_across_newlines() {
	let (tokens, diagnostics) = tokenize("print 1;\nprint 2;\n");
	assert!(diagnostics.is_empty());
	let second_print = tokens.iter().find(|token| token.kind == TokenKind::Print && token.line == 2);
	assert!(second_print.is_some(), "expected a `print` token on line 2");
}

#[test]
fn char_literal_round_trips_its_codepoint() {
	let (tokens, diagnostics) = tokenize("print 'a';");
	assert!(diagnostics.is_empty());
	let char_token = tokens.iter().find(|token| token.kind == TokenKind::Char).expect("a char token");
	assert_eq!(char_token.text, "a");
}

#[test]
fn illegal_byte_is_a_lex_error() {
	let (_, diagnostics) = tokenize("var x = 1 $ 2;");
	assert!(!diagnostics.is_empty());
}

#[test]
fn unterminated_char_literal_is_a_lex_error() {
	let (_, diagnostics) = tokenize("print 'a;");
	assert!(!diagnostics.is_empty());
}
