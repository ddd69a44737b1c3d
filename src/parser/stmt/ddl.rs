use super::super::expr::parse_expr;
use super::super::Parser;
use crate::ast::{
	ColumnDef, ColumnOption, ColumnType, CreateIndexStmt, CreateSequenceStmt, CreateTableStmt,
	SequenceOptions, Statement, TableConstraint,
};
use crate::err::{Error, Result};
use crate::syn::{Keyword, TokenKind};

fn parse_if_not_exists(p: &mut Parser) -> Result<bool> {
	if p.eat_keyword(Keyword::If)? {
		p.expect_keyword(Keyword::Not)?;
		p.expect_keyword(Keyword::Exists)?;
		Ok(true)
	} else {
		Ok(false)
	}
}

fn parse_if_exists(p: &mut Parser) -> Result<bool> {
	if p.eat_keyword(Keyword::If)? {
		p.expect_keyword(Keyword::Exists)?;
		Ok(true)
	} else {
		Ok(false)
	}
}

pub(crate) fn parse_create(p: &mut Parser) -> Result<Statement> {
	p.expect_keyword(Keyword::Create)?;
	let unique = p.eat_keyword(Keyword::Unique)?;
	if unique || p.at_keyword(Keyword::Index)? {
		return parse_create_index(p, unique);
	}
	if p.eat_keyword(Keyword::Table)? {
		return parse_create_table(p);
	}
	if p.eat_keyword(Keyword::Sequence)? {
		return parse_create_sequence(p);
	}
	let found = p.peek()?.clone();
	Err(Error::UnexpectedToken {
		position: found.position,
		found: found.kind.to_string(),
		expected: vec!["TABLE".into(), "INDEX".into(), "SEQUENCE".into()],
	})
}

fn parse_column_type(p: &mut Parser) -> Result<ColumnType> {
	let position = p.position()?;
	let name = p.expect_ident()?;
	Ok(match name.to_ascii_uppercase().as_str() {
		"INT" | "INTEGER" => ColumnType::Int,
		"FLOAT" | "DOUBLE" | "REAL" => ColumnType::Float,
		"TEXT" | "VARCHAR" | "STRING" => ColumnType::Text,
		"BOOL" | "BOOLEAN" => ColumnType::Bool,
		"BLOB" => ColumnType::Blob,
		_ => return Err(Error::InvalidQuery(position, format!("unknown column type `{name}`"))),
	})
}

fn parse_column_def(p: &mut Parser) -> Result<ColumnDef> {
	let name = p.expect_ident()?;
	let ty = parse_column_type(p)?;
	let mut options = Vec::new();
	loop {
		let position = p.position()?;
		let option = if p.eat_keyword(Keyword::Primary)? {
			p.expect_keyword(Keyword::Key)?;
			ColumnOption::PrimaryKey
		} else if p.eat_keyword(Keyword::Not)? {
			p.expect_keyword(Keyword::Null)?;
			ColumnOption::NotNull
		} else if p.eat_keyword(Keyword::Unique)? {
			ColumnOption::Unique
		} else if p.eat_keyword(Keyword::Check)? {
			p.expect_kind(TokenKind::LParen)?;
			let e = parse_expr(p)?;
			p.expect_kind(TokenKind::RParen)?;
			ColumnOption::Check(e)
		} else if p.eat_keyword(Keyword::Default)? {
			ColumnOption::Default(parse_expr(p)?)
		} else {
			break;
		};
		let duplicate = match &option {
			ColumnOption::PrimaryKey => options.contains(&ColumnOption::PrimaryKey),
			ColumnOption::NotNull => options.contains(&ColumnOption::NotNull),
			ColumnOption::Unique => options.contains(&ColumnOption::Unique),
			ColumnOption::Default(_) => options.iter().any(|o| matches!(o, ColumnOption::Default(_))),
			ColumnOption::Check(_) => false,
		};
		if duplicate {
			return Err(Error::ConflictingOption(position, option.to_string()));
		}
		options.push(option);
	}
	Ok(ColumnDef { name, ty, options })
}

fn parse_create_table(p: &mut Parser) -> Result<Statement> {
	let if_not_exists = parse_if_not_exists(p)?;
	let name = p.expect_ident()?;
	p.expect_kind(TokenKind::LParen)?;

	let mut columns = Vec::new();
	let mut constraints = Vec::new();
	loop {
		if p.at_keyword(Keyword::Primary)? || p.at_keyword(Keyword::Unique)? || p.at_keyword(Keyword::Check)? {
			constraints.push(parse_table_constraint(p)?);
		} else {
			columns.push(parse_column_def(p)?);
		}
		if !p.eat_kind(&TokenKind::Comma)? {
			break;
		}
	}
	p.expect_kind(TokenKind::RParen)?;

	Ok(Statement::CreateTable(CreateTableStmt { name, if_not_exists, columns, constraints }))
}

fn parse_table_constraint(p: &mut Parser) -> Result<TableConstraint> {
	if p.eat_keyword(Keyword::Primary)? {
		p.expect_keyword(Keyword::Key)?;
		Ok(TableConstraint::PrimaryKey(parse_column_list(p)?))
	} else if p.eat_keyword(Keyword::Unique)? {
		Ok(TableConstraint::Unique(parse_column_list(p)?))
	} else {
		p.expect_keyword(Keyword::Check)?;
		p.expect_kind(TokenKind::LParen)?;
		let e = parse_expr(p)?;
		p.expect_kind(TokenKind::RParen)?;
		Ok(TableConstraint::Check(e))
	}
}

fn parse_column_list(p: &mut Parser) -> Result<Vec<String>> {
	p.expect_kind(TokenKind::LParen)?;
	let mut cols = Vec::new();
	loop {
		cols.push(p.expect_ident()?);
		if !p.eat_kind(&TokenKind::Comma)? {
			break;
		}
	}
	p.expect_kind(TokenKind::RParen)?;
	Ok(cols)
}

fn parse_create_index(p: &mut Parser, unique: bool) -> Result<Statement> {
	p.expect_keyword(Keyword::Index)?;
	let if_not_exists = parse_if_not_exists(p)?;
	let name = p.expect_ident()?;
	p.expect_keyword(Keyword::On)?;
	let table = p.expect_ident()?;
	let columns = parse_column_list(p)?;
	Ok(Statement::CreateIndex(CreateIndexStmt { name, if_not_exists, table, columns, unique }))
}

fn parse_create_sequence(p: &mut Parser) -> Result<Statement> {
	let if_not_exists = parse_if_not_exists(p)?;
	let name = p.expect_ident()?;
	let mut options = SequenceOptions::default();

	loop {
		if p.eat_keyword(Keyword::Increment)? {
			p.eat_keyword(Keyword::By)?;
			options.increment_by = parse_signed_int(p)?;
		} else if p.eat_keyword(Keyword::Minvalue)? {
			options.min_value = Some(parse_signed_int(p)?);
		} else if p.eat_keyword(Keyword::Maxvalue)? {
			options.max_value = Some(parse_signed_int(p)?);
		} else if p.eat_keyword(Keyword::Start)? {
			p.eat_keyword(Keyword::With)?;
			options.start_with = Some(parse_signed_int(p)?);
		} else if p.eat_keyword(Keyword::Cache)? {
			options.cache = Some(parse_signed_int(p)?);
		} else if p.eat_keyword(Keyword::Cycle)? {
			options.cycle = true;
		} else if p.eat_keyword(Keyword::No)? {
			if p.eat_keyword(Keyword::Minvalue)? {
				options.min_value = None;
			} else if p.eat_keyword(Keyword::Maxvalue)? {
				options.max_value = None;
			} else {
				p.expect_keyword(Keyword::Cycle)?;
				options.cycle = false;
			}
		} else {
			break;
		}
	}

	Ok(Statement::CreateSequence(CreateSequenceStmt { name, if_not_exists, options }))
}

fn parse_signed_int(p: &mut Parser) -> Result<i64> {
	let negative = p.eat_kind(&TokenKind::Minus)?;
	let tok = p.bump()?;
	let n = match tok.kind {
		TokenKind::Int(n) => n,
		other => {
			return Err(Error::UnexpectedToken {
				position: tok.position,
				found: other.to_string(),
				expected: vec!["integer".into()],
			})
		}
	};
	Ok(if negative { -n } else { n })
}

pub(crate) fn parse_drop(p: &mut Parser) -> Result<Statement> {
	p.expect_keyword(Keyword::Drop)?;
	if p.eat_keyword(Keyword::Table)? {
		let if_exists = parse_if_exists(p)?;
		let name = p.expect_ident()?;
		Ok(Statement::DropTable { name, if_exists })
	} else if p.eat_keyword(Keyword::Index)? {
		let if_exists = parse_if_exists(p)?;
		let name = p.expect_ident()?;
		Ok(Statement::DropIndex { name, if_exists })
	} else {
		p.expect_keyword(Keyword::Sequence)?;
		let if_exists = parse_if_exists(p)?;
		let name = p.expect_ident()?;
		Ok(Statement::DropSequence { name, if_exists })
	}
}

pub(crate) fn parse_alter(p: &mut Parser) -> Result<Statement> {
	p.expect_keyword(Keyword::Alter)?;
	p.expect_keyword(Keyword::Table)?;
	let table = p.expect_ident()?;
	if p.eat_keyword(Keyword::Rename)? {
		p.expect_keyword(Keyword::To)?;
		let new_name = p.expect_ident()?;
		Ok(Statement::AlterTableRename { table, new_name })
	} else {
		p.expect_keyword(Keyword::Add)?;
		p.eat_keyword(Keyword::Column)?;
		let column = parse_column_def(p)?;
		Ok(Statement::AlterTableAddColumn { table, column })
	}
}

/// `REINDEX [name]` (spec.md §4.2) — a bare optional index name, no `INDEX`/
/// `TABLE` keyword. An absent name means "every index".
pub(crate) fn parse_reindex(p: &mut Parser) -> Result<Statement> {
	p.expect_keyword(Keyword::Reindex)?;
	let index = match &p.peek()?.kind {
		TokenKind::Identifier(_) | TokenKind::QuotedIdentifier(_) => Some(p.expect_ident()?),
		_ => None,
	};
	Ok(Statement::Reindex { index })
}
