//! Per-statement-kind parsing, dispatched on the first significant token.

mod ddl;
mod dml;
mod select;
mod txn;

use super::Parser;
use crate::ast::Statement;
use crate::err::{Error, Result};
use crate::syn::{Keyword, TokenKind};

pub(crate) use select::parse_select;

pub(crate) fn parse_statement(p: &mut Parser) -> Result<Statement> {
	let tok = p.peek()?.clone();
	match &tok.kind {
		TokenKind::Keyword(Keyword::Select) => Ok(Statement::Select(parse_select(p)?)),
		TokenKind::Keyword(Keyword::Insert) => dml::parse_insert(p),
		TokenKind::Keyword(Keyword::Update) => dml::parse_update(p),
		TokenKind::Keyword(Keyword::Delete) => dml::parse_delete(p),
		TokenKind::Keyword(Keyword::Create) => ddl::parse_create(p),
		TokenKind::Keyword(Keyword::Drop) => ddl::parse_drop(p),
		TokenKind::Keyword(Keyword::Alter) => ddl::parse_alter(p),
		TokenKind::Keyword(Keyword::Reindex) => ddl::parse_reindex(p),
		TokenKind::Keyword(Keyword::Begin) => txn::parse_begin(p),
		TokenKind::Keyword(Keyword::Commit) => {
			p.bump()?;
			Ok(Statement::Commit)
		}
		TokenKind::Keyword(Keyword::Rollback) => {
			p.bump()?;
			Ok(Statement::Rollback)
		}
		TokenKind::Keyword(Keyword::Explain) => {
			p.bump()?;
			Ok(Statement::Explain(Box::new(parse_statement(p)?)))
		}
		other => Err(Error::UnexpectedToken {
			position: tok.position,
			found: other.to_string(),
			expected: vec!["statement".into()],
		}),
	}
}

/// Shared `ORDER BY ... LIMIT ... OFFSET ...` tail used by `SELECT`,
/// `UPDATE` and `DELETE`.
pub(crate) fn parse_order_limit_offset(
	p: &mut Parser,
) -> Result<(Vec<crate::ast::OrderItem>, Option<crate::ast::Expr>, Option<crate::ast::Expr>)> {
	let mut order_by = Vec::new();
	if p.eat_keyword(Keyword::Order)? {
		p.expect_keyword(Keyword::By)?;
		loop {
			let expr = super::expr::parse_expr(p)?;
			let desc = if p.eat_keyword(Keyword::Desc)? {
				true
			} else {
				p.eat_keyword(Keyword::Asc)?;
				false
			};
			order_by.push(crate::ast::OrderItem { expr, desc });
			if !p.eat_kind(&TokenKind::Comma)? {
				break;
			}
		}
	}
	let limit = if p.eat_keyword(Keyword::Limit)? {
		Some(super::expr::parse_expr(p)?)
	} else {
		None
	};
	let offset = if p.eat_keyword(Keyword::Offset)? {
		Some(super::expr::parse_expr(p)?)
	} else {
		None
	};
	Ok((order_by, limit, offset))
}

/// `RETURNING <expr> [AS alias], ...` shared by `INSERT`/`UPDATE`/`DELETE`.
pub(crate) fn parse_returning(p: &mut Parser) -> Result<Vec<(crate::ast::Expr, Option<String>)>> {
	let mut out = Vec::new();
	if p.eat_keyword(Keyword::Returning)? {
		loop {
			out.push(select::parse_projection_item(p)?);
			if !p.eat_kind(&TokenKind::Comma)? {
				break;
			}
		}
	}
	Ok(out)
}
