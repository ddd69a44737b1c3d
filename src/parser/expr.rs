//! Precedence-climbing expression parser (spec section 4.2's nine-level
//! precedence table, lowest to highest): `OR`, `AND`, unary `NOT`,
//! equality (`= != IS IN LIKE BETWEEN`), ordering (`< <= > >=`), bitwise
//! (`| ^ &`), `+ -`, `* / %`, `||` (tightest). `CAST`/`::` and
//! parenthesisation bind tighter than all of them, at the prefix/atom
//! level.

use super::Parser;
use crate::ast::{AggregateCall, AggregateFunc, BinaryOp, CastType, ColumnRef, Expr};
use crate::err::{Error, Result};
use crate::ast::Value;
use crate::syn::{Keyword, TokenKind};

pub(crate) fn parse_expr(p: &mut Parser) -> Result<Expr> {
	parse_bp(p, 0)
}

fn parse_bp(p: &mut Parser, min_bp: u8) -> Result<Expr> {
	let mut lhs = parse_prefix(p)?;
	loop {
		let Some((bp, apply)) = peek_infix(p)? else {
			break;
		};
		if bp.0 < min_bp {
			break;
		}
		lhs = apply(p, lhs, bp.1)?;
	}
	Ok(lhs)
}

type InfixFn = fn(&mut Parser, Expr, u8) -> Result<Expr>;

fn peek_infix(p: &mut Parser) -> Result<Option<((u8, u8), InfixFn)>> {
	let tok = p.peek()?.clone();
	let simple = |op: BinaryOp, lbp: u8| Some(((lbp, lbp + 1), binary_apply(op) as InfixFn));
	Ok(match &tok.kind {
		TokenKind::Keyword(Keyword::Or) => simple(BinaryOp::Or, 1),
		TokenKind::Keyword(Keyword::And) => simple(BinaryOp::And, 3),
		TokenKind::Eq => simple(BinaryOp::Eq, 5),
		TokenKind::Neq => simple(BinaryOp::Neq, 5),
		TokenKind::Keyword(Keyword::Like) => Some(((5, 6), apply_like(false) as InfixFn)),
		TokenKind::Keyword(Keyword::In) => Some(((5, 6), apply_in(false) as InfixFn)),
		TokenKind::Keyword(Keyword::Between) => Some(((5, 6), apply_between(false) as InfixFn)),
		TokenKind::Keyword(Keyword::Is) => Some(((5, 6), apply_is as InfixFn)),
		TokenKind::Keyword(Keyword::Not) => match p.peek_at(1)?.kind {
			TokenKind::Keyword(Keyword::Like) => Some(((5, 6), apply_like(true) as InfixFn)),
			TokenKind::Keyword(Keyword::In) => Some(((5, 6), apply_in(true) as InfixFn)),
			TokenKind::Keyword(Keyword::Between) => Some(((5, 6), apply_between(true) as InfixFn)),
			_ => None,
		},
		TokenKind::Lt => simple(BinaryOp::Lt, 7),
		TokenKind::Lte => simple(BinaryOp::Lte, 7),
		TokenKind::Gt => simple(BinaryOp::Gt, 7),
		TokenKind::Gte => simple(BinaryOp::Gte, 7),
		TokenKind::Pipe => simple(BinaryOp::BitOr, 9),
		TokenKind::Amp => simple(BinaryOp::BitAnd, 9),
		TokenKind::Caret => simple(BinaryOp::BitXor, 9),
		TokenKind::Plus => simple(BinaryOp::Add, 11),
		TokenKind::Minus => simple(BinaryOp::Sub, 11),
		TokenKind::Star => simple(BinaryOp::Mul, 13),
		TokenKind::Slash => simple(BinaryOp::Div, 13),
		TokenKind::Percent => simple(BinaryOp::Mod, 13),
		TokenKind::Concat => simple(BinaryOp::Concat, 15),
		_ => None,
	})
}

fn binary_apply(op: BinaryOp) -> impl Fn(&mut Parser, Expr, u8) -> Result<Expr> {
	move |p, lhs, rbp| {
		p.bump()?;
		let rhs = parse_bp(p, rbp)?;
		Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
	}
}

fn apply_like(negated: bool) -> impl Fn(&mut Parser, Expr, u8) -> Result<Expr> {
	move |p, lhs, rbp| {
		if negated {
			p.bump()?;
		}
		p.bump()?;
		let rhs = parse_bp(p, rbp)?;
		let op = if negated { BinaryOp::NotLike } else { BinaryOp::Like };
		Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
	}
}

fn apply_is(p: &mut Parser, lhs: Expr, rbp: u8) -> Result<Expr> {
	p.bump()?;
	let negated = p.eat_keyword(Keyword::Not)?;
	let rhs = parse_bp(p, rbp)?;
	Ok(Expr::Is { expr: Box::new(lhs), value: Box::new(rhs), negated })
}

fn apply_in(negated: bool) -> impl Fn(&mut Parser, Expr, u8) -> Result<Expr> {
	move |p, lhs, _rbp| {
		if negated {
			p.bump()?;
		}
		p.bump()?;
		p.expect_kind(TokenKind::LParen)?;
		let mut list = Vec::new();
		if !p.at_kind(&TokenKind::RParen)? {
			loop {
				list.push(parse_expr(p)?);
				if !p.eat_kind(&TokenKind::Comma)? {
					break;
				}
			}
		}
		p.expect_kind(TokenKind::RParen)?;
		Ok(Expr::In { expr: Box::new(lhs), list, negated })
	}
}

fn apply_between(negated: bool) -> impl Fn(&mut Parser, Expr, u8) -> Result<Expr> {
	move |p, lhs, rbp| {
		if negated {
			p.bump()?;
		}
		p.bump()?;
		// BETWEEN's own AND binds tighter than a top-level AND so
		// `a BETWEEN 1 AND 2 AND b` parses as `(a BETWEEN 1 AND 2) AND b`.
		let low = parse_bp(p, rbp.max(5))?;
		p.expect_keyword(Keyword::And)?;
		let high = parse_bp(p, rbp.max(5))?;
		Ok(Expr::Between { expr: Box::new(lhs), low: Box::new(low), high: Box::new(high), negated })
	}
}

fn parse_prefix(p: &mut Parser) -> Result<Expr> {
	let tok = p.peek()?.clone();
	match &tok.kind {
		TokenKind::Keyword(Keyword::Not) => {
			p.bump()?;
			let inner = parse_bp(p, 5)?;
			Ok(Expr::Not(Box::new(inner)))
		}
		TokenKind::Minus => {
			p.bump()?;
			let inner = parse_bp(p, 21)?;
			if let Expr::Literal(Value::Int(n)) = inner {
				return Ok(Expr::Literal(Value::Int(-n)));
			}
			if let Expr::Literal(Value::Float(f)) = inner {
				return Ok(Expr::Literal(Value::Float(-f)));
			}
			Ok(Expr::Neg(Box::new(inner)))
		}
		TokenKind::Plus => {
			p.bump()?;
			parse_bp(p, 21)
		}
		_ => parse_postfix(p),
	}
}

fn parse_postfix(p: &mut Parser) -> Result<Expr> {
	let mut expr = parse_atom(p)?;
	loop {
		if p.eat_kind(&TokenKind::DoubleColon)? {
			let ty = parse_type_name(p)?;
			expr = Expr::Cast(Box::new(expr), ty);
		} else {
			break;
		}
	}
	Ok(expr)
}

fn parse_type_name(p: &mut Parser) -> Result<CastType> {
	let position = p.position()?;
	let name = p.expect_ident()?;
	type_name_from_str(&name).ok_or_else(|| Error::InvalidQuery(position, format!("unknown type `{name}`")))
}

fn type_name_from_str(name: &str) -> Option<CastType> {
	Some(match name.to_ascii_uppercase().as_str() {
		"INT" | "INTEGER" => CastType::Int,
		"FLOAT" | "DOUBLE" | "REAL" => CastType::Float,
		"TEXT" | "VARCHAR" | "STRING" => CastType::Text,
		"BOOL" | "BOOLEAN" => CastType::Bool,
		"BLOB" => CastType::Blob,
		_ => return None,
	})
}

fn parse_atom(p: &mut Parser) -> Result<Expr> {
	let tok = p.bump()?;
	match tok.kind {
		TokenKind::Int(n) => Ok(Expr::Literal(Value::Int(n))),
		TokenKind::Float(n) => Ok(Expr::Literal(Value::Float(n))),
		TokenKind::String(s) => Ok(Expr::Literal(Value::Text(s))),
		TokenKind::Blob(b) => Ok(Expr::Literal(Value::Blob(b))),
		TokenKind::Keyword(Keyword::Null) => Ok(Expr::Literal(Value::Null)),
		TokenKind::Keyword(Keyword::True) => Ok(Expr::Literal(Value::Bool(true))),
		TokenKind::Keyword(Keyword::False) => Ok(Expr::Literal(Value::Bool(false))),
		TokenKind::Star => Ok(Expr::Wildcard),
		TokenKind::NamedParam(name) => {
			p.note_param_style(true)?;
			Ok(Expr::NamedParam(name))
		}
		TokenKind::PositionalParam(explicit) => {
			p.note_param_style(false)?;
			let index = explicit.unwrap_or_else(|| p.next_positional_index());
			Ok(Expr::PositionalParam(index))
		}
		TokenKind::LParen => {
			let inner = parse_expr(p)?;
			p.expect_kind(TokenKind::RParen)?;
			Ok(Expr::Paren(Box::new(inner)))
		}
		TokenKind::Keyword(Keyword::Cast) => {
			p.expect_kind(TokenKind::LParen)?;
			let inner = parse_expr(p)?;
			p.expect_keyword(Keyword::As)?;
			let ty = parse_type_name(p)?;
			p.expect_kind(TokenKind::RParen)?;
			Ok(Expr::Cast(Box::new(inner), ty))
		}
		TokenKind::Keyword(Keyword::Next) => {
			p.expect_keyword(Keyword::Value)?;
			p.expect_keyword(Keyword::For)?;
			let name = p.expect_ident()?;
			Ok(Expr::NextValueFor(name))
		}
		TokenKind::Keyword(kw @ (Keyword::Count | Keyword::Min | Keyword::Max | Keyword::Sum | Keyword::Avg)) => {
			parse_aggregate(p, kw)
		}
		TokenKind::Identifier(name) | TokenKind::QuotedIdentifier(name) => parse_name(p, name),
		other => Err(Error::UnexpectedToken {
			position: tok.position,
			found: other.to_string(),
			expected: vec!["expression".into()],
		}),
	}
}

fn parse_aggregate(p: &mut Parser, kw: Keyword) -> Result<Expr> {
	let func = match kw {
		Keyword::Count => AggregateFunc::Count,
		Keyword::Min => AggregateFunc::Min,
		Keyword::Max => AggregateFunc::Max,
		Keyword::Sum => AggregateFunc::Sum,
		Keyword::Avg => AggregateFunc::Avg,
		_ => unreachable!(),
	};
	p.expect_kind(TokenKind::LParen)?;
	let arg = if func == AggregateFunc::Count && p.eat_kind(&TokenKind::Star)? {
		None
	} else {
		Some(Box::new(parse_expr(p)?))
	};
	p.expect_kind(TokenKind::RParen)?;
	Ok(Expr::Aggregate(AggregateCall { func, arg }))
}

/// Parses either a bare/qualified column reference or a function call;
/// both start with an identifier and are only disambiguated by a
/// following `(`.
fn parse_name(p: &mut Parser, first: String) -> Result<Expr> {
	if p.eat_kind(&TokenKind::LParen)? {
		let mut args = Vec::new();
		if !p.at_kind(&TokenKind::RParen)? {
			loop {
				args.push(parse_expr(p)?);
				if !p.eat_kind(&TokenKind::Comma)? {
					break;
				}
			}
		}
		p.expect_kind(TokenKind::RParen)?;
		return Ok(Expr::Function { name: first, args });
	}
	if p.eat_kind(&TokenKind::Dot)? {
		let column = p.expect_ident()?;
		return Ok(Expr::Column(ColumnRef { name: column, table: Some(first) }));
	}
	Ok(Expr::Column(ColumnRef { name: first, table: None }))
}
