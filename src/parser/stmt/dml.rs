use super::super::expr::parse_expr;
use super::super::Parser;
use super::{parse_order_limit_offset, parse_returning, parse_select};
use crate::ast::{
	Assignment, ConflictAction, ConflictClause, ConflictTarget, DeleteStmt, InsertSource,
	InsertStmt, Statement, UpdateStmt,
};
use crate::err::Result;
use crate::syn::{Keyword, TokenKind};

pub(crate) fn parse_insert(p: &mut Parser) -> Result<Statement> {
	p.expect_keyword(Keyword::Insert)?;
	p.expect_keyword(Keyword::Into)?;
	let table = p.expect_ident()?;

	let mut columns = Vec::new();
	if p.eat_kind(&TokenKind::LParen)? {
		loop {
			columns.push(p.expect_ident()?);
			if !p.eat_kind(&TokenKind::Comma)? {
				break;
			}
		}
		p.expect_kind(TokenKind::RParen)?;
	}

	let source = if p.eat_keyword(Keyword::Values)? {
		let mut rows = Vec::new();
		loop {
			p.expect_kind(TokenKind::LParen)?;
			let mut row = Vec::new();
			loop {
				row.push(parse_expr(p)?);
				if !p.eat_kind(&TokenKind::Comma)? {
					break;
				}
			}
			p.expect_kind(TokenKind::RParen)?;
			rows.push(row);
			if !p.eat_kind(&TokenKind::Comma)? {
				break;
			}
		}
		InsertSource::Values(rows)
	} else {
		InsertSource::Select(Box::new(parse_select(p)?))
	};

	let on_conflict = if p.eat_keyword(Keyword::On)? {
		p.expect_keyword(Keyword::Conflict)?;
		let target = if p.eat_kind(&TokenKind::LParen)? {
			let col = p.expect_ident()?;
			p.expect_kind(TokenKind::RParen)?;
			ConflictTarget::Column(col)
		} else {
			ConflictTarget::Unspecified
		};
		let action = if p.eat_keyword(Keyword::Do)? {
			if p.eat_keyword(Keyword::Nothing)? {
				ConflictAction::DoNothing
			} else {
				p.expect_keyword(Keyword::Replace)?;
				ConflictAction::DoReplace
			}
		} else if p.eat_keyword(Keyword::Ignore)? {
			ConflictAction::DoNothing
		} else {
			p.expect_keyword(Keyword::Replace)?;
			ConflictAction::DoReplace
		};
		Some(ConflictClause { target, action })
	} else {
		None
	};

	let returning = parse_returning(p)?;

	Ok(Statement::Insert(InsertStmt { table, columns, source, on_conflict, returning }))
}

pub(crate) fn parse_update(p: &mut Parser) -> Result<Statement> {
	p.expect_keyword(Keyword::Update)?;
	let table = p.expect_ident()?;
	p.expect_keyword(Keyword::Set)?;

	let mut assignments = Vec::new();
	loop {
		let column = p.expect_ident()?;
		p.expect_kind(TokenKind::Eq)?;
		let value = parse_expr(p)?;
		assignments.push(Assignment { column, value });
		if !p.eat_kind(&TokenKind::Comma)? {
			break;
		}
	}

	let filter = if p.eat_keyword(Keyword::Where)? {
		Some(parse_expr(p)?)
	} else {
		None
	};

	let (order_by, limit, offset) = parse_order_limit_offset(p)?;
	let returning = parse_returning(p)?;

	Ok(Statement::Update(UpdateStmt {
		table,
		assignments,
		filter,
		order_by,
		limit,
		offset,
		returning,
	}))
}

pub(crate) fn parse_delete(p: &mut Parser) -> Result<Statement> {
	p.expect_keyword(Keyword::Delete)?;
	p.expect_keyword(Keyword::From)?;
	let table = p.expect_ident()?;

	let filter = if p.eat_keyword(Keyword::Where)? {
		Some(parse_expr(p)?)
	} else {
		None
	};

	let (order_by, limit, offset) = parse_order_limit_offset(p)?;
	let returning = parse_returning(p)?;

	Ok(Statement::Delete(DeleteStmt { table, filter, order_by, limit, offset, returning }))
}
