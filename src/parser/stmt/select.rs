use super::super::expr::parse_expr;
use super::super::Parser;
use super::parse_order_limit_offset;
use crate::ast::{Expr, SelectCore, SelectSetOp, SelectStmt, TableRef};
use crate::err::Result;
use crate::syn::{Keyword, TokenKind};

pub(crate) fn parse_select(p: &mut Parser) -> Result<SelectStmt> {
	let core = parse_select_core(p)?;
	let mut combined = Vec::new();
	loop {
		if p.eat_keyword(Keyword::Union)? {
			let op = if p.eat_keyword(Keyword::All)? {
				SelectSetOp::UnionAll
			} else {
				SelectSetOp::Union
			};
			p.expect_keyword(Keyword::Select)?;
			combined.push((op, parse_select_core(p)?));
		} else {
			break;
		}
	}
	let (order_by, limit, offset) = parse_order_limit_offset(p)?;
	Ok(SelectStmt { core, combined, order_by, limit, offset })
}

fn parse_select_core(p: &mut Parser) -> Result<SelectCore> {
	p.expect_keyword(Keyword::Select)?;
	let distinct = p.eat_keyword(Keyword::Distinct)?;

	let mut projections = Vec::new();
	loop {
		projections.push(parse_projection_item(p)?);
		if !p.eat_kind(&TokenKind::Comma)? {
			break;
		}
	}

	let from = if p.eat_keyword(Keyword::From)? {
		Some(parse_table_ref(p)?)
	} else {
		None
	};

	let filter = if p.eat_keyword(Keyword::Where)? {
		Some(parse_expr(p)?)
	} else {
		None
	};

	let mut group_by = Vec::new();
	if p.eat_keyword(Keyword::Group)? {
		p.expect_keyword(Keyword::By)?;
		loop {
			group_by.push(parse_expr(p)?);
			if !p.eat_kind(&TokenKind::Comma)? {
				break;
			}
		}
	}

	Ok(SelectCore { distinct, projections, from, filter, group_by })
}

pub(crate) fn parse_projection_item(p: &mut Parser) -> Result<(Expr, Option<String>)> {
	let expr = parse_expr(p)?;
	let alias = if p.eat_keyword(Keyword::As)? {
		Some(p.expect_ident()?)
	} else if let TokenKind::Identifier(_) | TokenKind::QuotedIdentifier(_) = &p.peek()?.kind {
		Some(p.expect_ident()?)
	} else {
		None
	};
	Ok((expr, alias))
}

pub(crate) fn parse_table_ref(p: &mut Parser) -> Result<TableRef> {
	let name = p.expect_ident()?;
	let alias = if p.eat_keyword(Keyword::As)? {
		Some(p.expect_ident()?)
	} else if let TokenKind::Identifier(_) | TokenKind::QuotedIdentifier(_) = &p.peek()?.kind {
		Some(p.expect_ident()?)
	} else {
		None
	};
	Ok(TableRef { name, alias })
}
