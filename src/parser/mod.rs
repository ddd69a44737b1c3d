//! The recursive-descent parser (spec component C2).
//!
//! Holds a single token of lookahead on top of the lexer (which itself
//! tracks trivia); `next`/`peek` always skip whitespace and comments so
//! statement parsing never has to think about them.

pub mod expr;
pub mod stmt;

use crate::ast::Query;
use crate::err::{Error, Result};
use crate::syn::{Keyword, Lexer, Position, Token, TokenKind};

pub struct Parser<'a> {
	lexer: Lexer<'a>,
	buffer: std::collections::VecDeque<Token>,
	/// `Some(true)` once a named (`$name`) parameter has been seen in the
	/// statement currently being parsed, `Some(false)` for positional
	/// (`?`/`$1`). A single statement may not mix the two (spec section
	/// 4.4); resets on statement boundaries.
	param_style: Option<bool>,
	next_positional: u32,
}

impl<'a> Parser<'a> {
	pub fn new(source: &'a str) -> Self {
		Parser {
			lexer: Lexer::new(source),
			buffer: std::collections::VecDeque::new(),
			param_style: None,
			next_positional: 1,
		}
	}

	/// Parses every statement in `source`, separated by `;`. A trailing
	/// semicolon is optional; an empty source parses to an empty query.
	pub fn parse_query(source: &str) -> Result<Query> {
		let mut parser = Parser::new(source);
		let mut statements = Vec::new();
		loop {
			while parser.eat_kind(&TokenKind::Semicolon)? {}
			if parser.at_eof()? {
				break;
			}
			parser.param_style = None;
			parser.next_positional = 1;
			statements.push(stmt::parse_statement(&mut parser)?);
			if !parser.at_eof()? && !parser.at_kind(&TokenKind::Semicolon)? {
				let found = parser.peek()?.clone();
				return Err(Error::UnexpectedToken {
					position: found.position,
					found: found.kind.to_string(),
					expected: vec![";".into(), "<eof>".into()],
				});
			}
		}
		Ok(Query { statements })
	}

	pub(crate) fn position(&mut self) -> Result<Position> {
		Ok(self.peek()?.position)
	}

	fn fill(&mut self, upto: usize) -> Result<()> {
		while self.buffer.len() <= upto {
			let tok = loop {
				let t = self.lexer.next()?;
				if !t.is_trivia() {
					break t;
				}
			};
			self.buffer.push_back(tok);
		}
		Ok(())
	}

	pub(crate) fn peek(&mut self) -> Result<&Token> {
		self.peek_at(0)
	}

	/// Looks `n` significant tokens ahead without consuming any of them.
	/// Used to disambiguate `NOT IN`/`NOT LIKE`/`NOT BETWEEN` from a bare
	/// unary `NOT` before committing to either parse.
	pub(crate) fn peek_at(&mut self, n: usize) -> Result<&Token> {
		self.fill(n)?;
		Ok(&self.buffer[n])
	}

	pub(crate) fn bump(&mut self) -> Result<Token> {
		self.fill(0)?;
		Ok(self.buffer.pop_front().expect("filled above"))
	}

	pub(crate) fn at_eof(&mut self) -> Result<bool> {
		Ok(self.peek()?.is_eof())
	}

	pub(crate) fn at_kind(&mut self, kind: &TokenKind) -> Result<bool> {
		Ok(std::mem::discriminant(&self.peek()?.kind) == std::mem::discriminant(kind))
	}

	pub(crate) fn eat_kind(&mut self, kind: &TokenKind) -> Result<bool> {
		if self.at_kind(kind)? {
			self.bump()?;
			Ok(true)
		} else {
			Ok(false)
		}
	}

	pub(crate) fn expect_kind(&mut self, kind: TokenKind) -> Result<Token> {
		if self.at_kind(&kind)? {
			self.bump()
		} else {
			let found = self.peek()?.clone();
			Err(Error::UnexpectedToken {
				position: found.position,
				found: found.kind.to_string(),
				expected: vec![kind.to_string()],
			})
		}
	}

	pub(crate) fn at_keyword(&mut self, kw: Keyword) -> Result<bool> {
		Ok(matches!(&self.peek()?.kind, TokenKind::Keyword(k) if *k == kw))
	}

	pub(crate) fn eat_keyword(&mut self, kw: Keyword) -> Result<bool> {
		if self.at_keyword(kw)? {
			self.bump()?;
			Ok(true)
		} else {
			Ok(false)
		}
	}

	pub(crate) fn expect_keyword(&mut self, kw: Keyword) -> Result<()> {
		if self.eat_keyword(kw)? {
			Ok(())
		} else {
			let found = self.peek()?.clone();
			Err(Error::UnexpectedToken {
				position: found.position,
				found: found.kind.to_string(),
				expected: vec![format!("{kw:?}").to_uppercase()],
			})
		}
	}

	/// Accepts a bare or quoted identifier, including one that happens to
	/// also be a reserved keyword when backtick-quoted.
	pub(crate) fn expect_ident(&mut self) -> Result<String> {
		let tok = self.bump()?;
		match tok.kind {
			TokenKind::Identifier(s) | TokenKind::QuotedIdentifier(s) => Ok(s),
			other => Err(Error::UnexpectedToken {
				position: tok.position,
				found: other.to_string(),
				expected: vec!["identifier".into()],
			}),
		}
	}

	/// Records that a named or positional parameter was just parsed,
	/// rejecting the statement if the other style was already used.
	pub(crate) fn note_param_style(&mut self, named: bool) -> Result<()> {
		match self.param_style {
			None => {
				self.param_style = Some(named);
				Ok(())
			}
			Some(style) if style == named => Ok(()),
			Some(_) => Err(Error::MixedParameterStyle(self.peek()?.position)),
		}
	}

	pub(crate) fn next_positional_index(&mut self) -> u32 {
		let i = self.next_positional;
		self.next_positional += 1;
		i
	}
}
