use super::super::Parser;
use crate::ast::Statement;
use crate::err::Result;
use crate::syn::Keyword;

pub(crate) fn parse_begin(p: &mut Parser) -> Result<Statement> {
	p.expect_keyword(Keyword::Begin)?;
	p.eat_keyword(Keyword::Transaction)?;
	let read_only = if p.eat_keyword(Keyword::Read)? {
		if p.eat_keyword(Keyword::Only)? {
			true
		} else {
			p.expect_keyword(Keyword::Write)?;
			false
		}
	} else {
		false
	};
	Ok(Statement::Begin { read_only })
}
