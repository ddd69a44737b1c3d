//! The expression model (spec component C3).
//!
//! Every node supports evaluation against a row environment, structural
//! equality (`#[derive(PartialEq)]` is sufficient since every leaf already
//! has it), a recursive walk with early-exit, and a canonical `Display`
//! rendering used both as the default projection alias and in `EXPLAIN`
//! output.

use super::row::Row;
use super::value::Value;
use crate::err::{Error, Result};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
	Add,
	Sub,
	Mul,
	Div,
	Mod,
	Eq,
	Neq,
	Lt,
	Lte,
	Gt,
	Gte,
	And,
	Or,
	BitOr,
	BitAnd,
	BitXor,
	Concat,
	Like,
	NotLike,
}

impl fmt::Display for BinaryOp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			BinaryOp::Add => "+",
			BinaryOp::Sub => "-",
			BinaryOp::Mul => "*",
			BinaryOp::Div => "/",
			BinaryOp::Mod => "%",
			BinaryOp::Eq => "=",
			BinaryOp::Neq => "!=",
			BinaryOp::Lt => "<",
			BinaryOp::Lte => "<=",
			BinaryOp::Gt => ">",
			BinaryOp::Gte => ">=",
			BinaryOp::And => "AND",
			BinaryOp::Or => "OR",
			BinaryOp::BitOr => "|",
			BinaryOp::BitAnd => "&",
			BinaryOp::BitXor => "^",
			BinaryOp::Concat => "||",
			BinaryOp::Like => "LIKE",
			BinaryOp::NotLike => "NOT LIKE",
		};
		write!(f, "{s}")
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastType {
	Int,
	Float,
	Text,
	Bool,
	Blob,
}

impl fmt::Display for CastType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			CastType::Int => "INT",
			CastType::Float => "FLOAT",
			CastType::Text => "TEXT",
			CastType::Bool => "BOOL",
			CastType::Blob => "BLOB",
		};
		write!(f, "{s}")
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateFunc {
	Count,
	Min,
	Max,
	Sum,
	Avg,
}

impl fmt::Display for AggregateFunc {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			AggregateFunc::Count => "COUNT",
			AggregateFunc::Min => "MIN",
			AggregateFunc::Max => "MAX",
			AggregateFunc::Sum => "SUM",
			AggregateFunc::Avg => "AVG",
		};
		write!(f, "{s}")
	}
}

/// A reference to a column. `table` starts empty from the parser and is
/// stamped by the binder (spec.md's data model invariant: every column
/// reference in a *prepared* stream carries a non-empty table name).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnRef {
	pub name: String,
	pub table: Option<String>,
}

impl fmt::Display for ColumnRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.table {
			Some(t) => write!(f, "{t}.{}", self.name),
			None => write!(f, "{}", self.name),
		}
	}
}

/// The aggregator *builder* — the parsed, schema-only form. Execution-time
/// state lives in [`crate::exec::aggregate::Accumulator`], which is built
/// from this once the group-by shape of a statement is known (spec.md
/// section 4.3: "two life-stages").
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateCall {
	pub func: AggregateFunc,
	/// `None` only for `COUNT(*)`.
	pub arg: Option<Box<Expr>>,
}

impl fmt::Display for AggregateCall {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.arg {
			Some(e) => write!(f, "{}({})", self.func, e),
			None => write!(f, "{}(*)", self.func),
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Expr {
	Literal(Value),
	Column(ColumnRef),
	PositionalParam(u32),
	NamedParam(String),
	Wildcard,
	Not(Box<Expr>),
	Neg(Box<Expr>),
	Cast(Box<Expr>, CastType),
	Binary(BinaryOp, Box<Expr>, Box<Expr>),
	/// Structurally distinct from a desugared `AND` pair so `EXPLAIN`/tests
	/// can tell a `BETWEEN` apart from a hand-written range, even though it
	/// evaluates identically to `lhs >= low AND lhs <= high`.
	Between {
		expr: Box<Expr>,
		low: Box<Expr>,
		high: Box<Expr>,
		negated: bool,
	},
	In {
		expr: Box<Expr>,
		list: Vec<Expr>,
		negated: bool,
	},
	Is {
		expr: Box<Expr>,
		value: Box<Expr>,
		negated: bool,
	},
	Paren(Box<Expr>),
	Function {
		name: String,
		args: Vec<Expr>,
	},
	Aggregate(AggregateCall),
	/// `NEXT VALUE FOR <sequence>` — marks the enclosing statement as not
	/// read-only (spec.md section 3).
	NextValueFor(String),
}

/// Controls whether [`Expr::walk`] continues descending.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Walk {
	Continue,
	Stop,
}

/// Anything that can resolve a column reference, a parameter, or advance a
/// sequence during evaluation. [`crate::exec::env::Env`] is the only
/// implementation; kept as a trait so expression evaluation doesn't need to
/// depend on the executor/transaction types directly.
pub trait Environment {
	fn current_row(&self) -> Option<&Row>;
	fn positional_param(&self, index: u32) -> Result<Value>;
	fn named_param(&self, name: &str) -> Result<Value>;
	fn next_sequence_value(&self, name: &str) -> Result<Value>;
}

impl Expr {
	/// Visits every node in this expression, calling `visit` pre-order;
	/// stops descending as soon as `visit` returns [`Walk::Stop`]. No
	/// hidden control flow: every recursive call explicitly checks and
	/// propagates the stop signal.
	pub fn walk(&self, visit: &mut impl FnMut(&Expr) -> Walk) -> Walk {
		if visit(self) == Walk::Stop {
			return Walk::Stop;
		}
		match self {
			Expr::Literal(_)
			| Expr::Column(_)
			| Expr::PositionalParam(_)
			| Expr::NamedParam(_)
			| Expr::Wildcard
			| Expr::NextValueFor(_) => Walk::Continue,
			Expr::Not(e) | Expr::Neg(e) | Expr::Cast(e, _) | Expr::Paren(e) => e.walk(visit),
			Expr::Binary(_, l, r) => {
				if l.walk(visit) == Walk::Stop {
					return Walk::Stop;
				}
				r.walk(visit)
			}
			Expr::Between { expr, low, high, .. } => {
				for e in [expr.as_ref(), low.as_ref(), high.as_ref()] {
					if e.walk(visit) == Walk::Stop {
						return Walk::Stop;
					}
				}
				Walk::Continue
			}
			Expr::In { expr, list, .. } => {
				if expr.walk(visit) == Walk::Stop {
					return Walk::Stop;
				}
				for e in list {
					if e.walk(visit) == Walk::Stop {
						return Walk::Stop;
					}
				}
				Walk::Continue
			}
			Expr::Is { expr, value, .. } => {
				if expr.walk(visit) == Walk::Stop {
					return Walk::Stop;
				}
				value.walk(visit)
			}
			Expr::Function { args, .. } => {
				for e in args {
					if e.walk(visit) == Walk::Stop {
						return Walk::Stop;
					}
				}
				Walk::Continue
			}
			Expr::Aggregate(call) => match &call.arg {
				Some(e) => e.walk(visit),
				None => Walk::Continue,
			},
		}
	}

	/// Whether this expression tree contains an aggregator.
	pub fn contains_aggregate(&self) -> bool {
		let mut found = false;
		self.walk(&mut |e| {
			if matches!(e, Expr::Aggregate(_)) {
				found = true;
				Walk::Stop
			} else {
				Walk::Continue
			}
		});
		found
	}

	/// Whether this expression contains `NEXT VALUE FOR`, which forces the
	/// enclosing statement to not be read-only.
	pub fn advances_sequence(&self) -> bool {
		let mut found = false;
		self.walk(&mut |e| {
			if matches!(e, Expr::NextValueFor(_)) {
				found = true;
				Walk::Stop
			} else {
				Walk::Continue
			}
		});
		found
	}

	pub fn evaluate(&self, env: &dyn Environment) -> Result<Value> {
		match self {
			Expr::Literal(v) => Ok(v.clone()),
			Expr::Column(col) => {
				let row = env.current_row().ok_or_else(|| {
					Error::in_operator("column reference", "no current row")
				})?;
				Ok(row.get(&col.name).cloned().unwrap_or(Value::Null))
			}
			Expr::PositionalParam(i) => env.positional_param(*i),
			Expr::NamedParam(n) => env.named_param(n),
			Expr::Wildcard => Err(Error::in_operator("evaluate", "wildcard has no scalar value")),
			Expr::Not(e) => Ok(Value::Bool(!e.evaluate(env)?.is_truthy())),
			Expr::Neg(e) => negate(e.evaluate(env)?),
			Expr::Cast(e, ty) => cast(e.evaluate(env)?, *ty),
			Expr::Paren(e) => e.evaluate(env),
			Expr::Binary(op, l, r) => eval_binary(*op, l.evaluate(env)?, r.evaluate(env)?),
			Expr::Between { expr, low, high, negated } => {
				let v = expr.evaluate(env)?;
				let lo = low.evaluate(env)?;
				let hi = high.evaluate(env)?;
				let inside = eval_binary(BinaryOp::Gte, v.clone(), lo)?.is_truthy()
					&& eval_binary(BinaryOp::Lte, v, hi)?.is_truthy();
				Ok(Value::Bool(inside != *negated))
			}
			Expr::In { expr, list, negated } => {
				let v = expr.evaluate(env)?;
				let mut found = false;
				for item in list {
					if v == item.evaluate(env)? {
						found = true;
						break;
					}
				}
				Ok(Value::Bool(found != *negated))
			}
			Expr::Is { expr, value, negated } => {
				let v = expr.evaluate(env)?;
				let target = value.evaluate(env)?;
				let matches = v.is_null() == target.is_null() && (v == target || target.is_null());
				Ok(Value::Bool(matches != *negated))
			}
			Expr::Function { name, args } => eval_function(name, args, env),
			Expr::Aggregate(_) => Err(Error::in_operator(
				"evaluate",
				"aggregate expressions only evaluate inside rows.GroupAggregate",
			)),
			Expr::NextValueFor(seq) => env.next_sequence_value(seq),
		}
	}
}

fn negate(v: Value) -> Result<Value> {
	match v {
		Value::Int(n) => n.checked_neg().map(Value::Int).ok_or(Error::Overflow),
		Value::Float(n) => Ok(Value::Float(-n)),
		Value::Null => Ok(Value::Null),
		other => Err(Error::in_operator("unary -", format!("cannot negate {}", other.type_name()))),
	}
}

fn cast(v: Value, ty: CastType) -> Result<Value> {
	if v.is_null() {
		return Ok(Value::Null);
	}
	Ok(match ty {
		CastType::Int => match v {
			Value::Int(n) => Value::Int(n),
			Value::Float(f) => Value::Int(f as i64),
			Value::Bool(b) => Value::Int(b as i64),
			Value::Text(s) => Value::Int(
				s.trim().parse().map_err(|_| Error::InvalidCast("INT".into()))?,
			),
			Value::Blob(_) | Value::Null => return Err(Error::InvalidCast("INT".into())),
		},
		CastType::Float => match v {
			Value::Int(n) => Value::Float(n as f64),
			Value::Float(f) => Value::Float(f),
			Value::Text(s) => Value::Float(
				s.trim().parse().map_err(|_| Error::InvalidCast("FLOAT".into()))?,
			),
			_ => return Err(Error::InvalidCast("FLOAT".into())),
		},
		CastType::Bool => Value::Bool(v.is_truthy()),
		CastType::Text => Value::Text(match v {
			Value::Text(s) => s,
			other => other.to_string(),
		}),
		CastType::Blob => match v {
			Value::Blob(b) => Value::Blob(b),
			Value::Text(s) => Value::Blob(s.into_bytes()),
			_ => return Err(Error::InvalidCast("BLOB".into())),
		},
	})
}

fn eval_binary(op: BinaryOp, l: Value, r: Value) -> Result<Value> {
	use BinaryOp::*;
	if matches!(op, And) {
		return Ok(Value::Bool(l.is_truthy() && r.is_truthy()));
	}
	if matches!(op, Or) {
		return Ok(Value::Bool(l.is_truthy() || r.is_truthy()));
	}
	if l.is_null() || r.is_null() {
		return Ok(match op {
			Eq | Neq | Lt | Lte | Gt | Gte | Like | NotLike => Value::Bool(false),
			_ => Value::Null,
		});
	}
	match op {
		Eq => Ok(Value::Bool(l == r)),
		Neq => Ok(Value::Bool(l != r)),
		Lt => Ok(Value::Bool(l.cmp_for_order(&r) == std::cmp::Ordering::Less)),
		Lte => Ok(Value::Bool(l.cmp_for_order(&r) != std::cmp::Ordering::Greater)),
		Gt => Ok(Value::Bool(l.cmp_for_order(&r) == std::cmp::Ordering::Greater)),
		Gte => Ok(Value::Bool(l.cmp_for_order(&r) != std::cmp::Ordering::Less)),
		Add | Sub | Mul | Div | Mod => arithmetic(op, l, r),
		BitOr | BitAnd | BitXor => bitwise(op, l, r),
		Concat => Ok(Value::Text(format!("{}{}", display_text(&l), display_text(&r)))),
		Like | NotLike => like(&l, &r, matches!(op, NotLike)),
		And | Or => unreachable!("handled above"),
	}
}

fn display_text(v: &Value) -> String {
	match v {
		Value::Text(s) => s.clone(),
		other => other.to_string(),
	}
}

fn arithmetic(op: BinaryOp, l: Value, r: Value) -> Result<Value> {
	use BinaryOp::*;
	if let (Value::Int(a), Value::Int(b)) = (&l, &r) {
		let (a, b) = (*a, *b);
		return Ok(Value::Int(match op {
			Add => a.checked_add(b).ok_or(Error::Overflow)?,
			Sub => a.checked_sub(b).ok_or(Error::Overflow)?,
			Mul => a.checked_mul(b).ok_or(Error::Overflow)?,
			Div => {
				if b == 0 {
					return Err(Error::DivideByZero);
				}
				a.checked_div(b).ok_or(Error::Overflow)?
			}
			Mod => {
				if b == 0 {
					return Err(Error::DivideByZero);
				}
				a % b
			}
			_ => unreachable!(),
		}));
	}
	let a = l.as_f64().ok_or_else(|| Error::in_operator("arithmetic", format!("{} is not numeric", l.type_name())))?;
	let b = r.as_f64().ok_or_else(|| Error::in_operator("arithmetic", format!("{} is not numeric", r.type_name())))?;
	Ok(Value::Float(match op {
		Add => a + b,
		Sub => a - b,
		Mul => a * b,
		Div => {
			if b == 0.0 {
				return Err(Error::DivideByZero);
			}
			a / b
		}
		Mod => {
			if b == 0.0 {
				return Err(Error::DivideByZero);
			}
			a % b
		}
		_ => unreachable!(),
	}))
}

fn bitwise(op: BinaryOp, l: Value, r: Value) -> Result<Value> {
	let a = match l {
		Value::Int(n) => n,
		_ => return Err(Error::in_operator("bitwise", "operand is not an integer")),
	};
	let b = match r {
		Value::Int(n) => n,
		_ => return Err(Error::in_operator("bitwise", "operand is not an integer")),
	};
	Ok(Value::Int(match op {
		BinaryOp::BitOr => a | b,
		BinaryOp::BitAnd => a & b,
		BinaryOp::BitXor => a ^ b,
		_ => unreachable!(),
	}))
}

/// Translates SQL `LIKE` wildcards (`%`, `_`) into an anchored regex and
/// matches, surfacing a malformed pattern as [`Error::BadRegex`].
fn like(value: &Value, pattern: &Value, negate: bool) -> Result<Value> {
	let text = display_text(value);
	let pat = display_text(pattern);
	let mut re = String::from("(?s)^");
	for c in pat.chars() {
		match c {
			'%' => re.push_str(".*"),
			'_' => re.push('.'),
			c if "\\.+*?()|[]{}^$".contains(c) => {
				re.push('\\');
				re.push(c);
			}
			c => re.push(c),
		}
	}
	re.push('$');
	let compiled = regex::Regex::new(&re)
		.map_err(|e| Error::in_operator("LIKE", format!("bad pattern {pat:?}: {e}")))?;
	Ok(Value::Bool(compiled.is_match(&text) != negate))
}

fn eval_function(name: &str, args: &[Expr], env: &dyn Environment) -> Result<Value> {
	let values = args
		.iter()
		.map(|a| a.evaluate(env))
		.collect::<Result<Vec<_>>>()?;
	match name.to_ascii_uppercase().as_str() {
		"LOWER" => Ok(Value::Text(display_text(&one(&values, name)?).to_lowercase())),
		"UPPER" => Ok(Value::Text(display_text(&one(&values, name)?).to_uppercase())),
		"LENGTH" => match one(&values, name)? {
			Value::Text(s) => Ok(Value::Int(s.chars().count() as i64)),
			Value::Blob(b) => Ok(Value::Int(b.len() as i64)),
			Value::Null => Ok(Value::Null),
			other => Err(Error::in_operator("LENGTH", format!("{} has no length", other.type_name()))),
		},
		"ABS" => match one(&values, name)? {
			Value::Int(n) => Ok(Value::Int(n.abs())),
			Value::Float(f) => Ok(Value::Float(f.abs())),
			Value::Null => Ok(Value::Null),
			other => Err(Error::in_operator("ABS", format!("{} is not numeric", other.type_name()))),
		},
		"COALESCE" => Ok(values.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null)),
		other => Err(Error::in_operator("function call", format!("unknown function `{other}`"))),
	}
}

fn one(values: &[Value], name: &str) -> Result<Value> {
	values
		.first()
		.cloned()
		.ok_or_else(|| Error::in_operator("function call", format!("{name} takes one argument")))
}

impl fmt::Display for Expr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Expr::Literal(v) => write!(f, "{v}"),
			Expr::Column(c) => write!(f, "{c}"),
			Expr::PositionalParam(i) => write!(f, "${i}"),
			Expr::NamedParam(n) => write!(f, "${n}"),
			Expr::Wildcard => write!(f, "*"),
			Expr::Not(e) => write!(f, "NOT {e}"),
			Expr::Neg(e) => write!(f, "-{e}"),
			Expr::Cast(e, ty) => write!(f, "CAST({e} AS {ty})"),
			Expr::Paren(e) => write!(f, "({e})"),
			Expr::Binary(op, l, r) => write!(f, "{l} {op} {r}"),
			Expr::Between { expr, low, high, negated } => {
				let not = if *negated { "NOT " } else { "" };
				write!(f, "{expr} {not}BETWEEN {low} AND {high}")
			}
			Expr::In { expr, list, negated } => {
				let not = if *negated { "NOT " } else { "" };
				write!(f, "{expr} {not}IN (")?;
				for (i, e) in list.iter().enumerate() {
					if i > 0 {
						write!(f, ", ")?;
					}
					write!(f, "{e}")?;
				}
				write!(f, ")")
			}
			Expr::Is { expr, value, negated } => {
				let not = if *negated { " NOT" } else { "" };
				write!(f, "{expr} IS{not} {value}")
			}
			Expr::Function { name, args } => {
				write!(f, "{name}(")?;
				for (i, e) in args.iter().enumerate() {
					if i > 0 {
						write!(f, ", ")?;
					}
					write!(f, "{e}")?;
				}
				write!(f, ")")
			}
			Expr::Aggregate(call) => write!(f, "{call}"),
			Expr::NextValueFor(seq) => write!(f, "NEXT VALUE FOR {seq}"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct NoParams;
	impl Environment for NoParams {
		fn current_row(&self) -> Option<&Row> {
			None
		}
		fn positional_param(&self, _: u32) -> Result<Value> {
			unreachable!()
		}
		fn named_param(&self, _: &str) -> Result<Value> {
			unreachable!()
		}
		fn next_sequence_value(&self, _: &str) -> Result<Value> {
			unreachable!()
		}
	}

	fn lit(v: i64) -> Expr {
		Expr::Literal(Value::Int(v))
	}

	#[test]
	fn evaluates_arithmetic() {
		let e = Expr::Binary(BinaryOp::Add, Box::new(lit(2)), Box::new(lit(3)));
		assert_eq!(e.evaluate(&NoParams).unwrap(), Value::Int(5));
	}

	#[test]
	fn division_by_zero_is_an_execute_error_not_a_plan_error() {
		let e = Expr::Binary(BinaryOp::Div, Box::new(lit(1)), Box::new(lit(0)));
		assert!(matches!(e.evaluate(&NoParams), Err(Error::DivideByZero)));
	}

	#[test]
	fn between_renders_and_evaluates_like_a_conjunction() {
		let e = Expr::Between {
			expr: Box::new(lit(5)),
			low: Box::new(lit(1)),
			high: Box::new(lit(10)),
			negated: false,
		};
		assert_eq!(e.to_string(), "5 BETWEEN 1 AND 10");
		assert_eq!(e.evaluate(&NoParams).unwrap(), Value::Bool(true));
	}

	#[test]
	fn like_translates_sql_wildcards() {
		let e = Expr::Binary(
			BinaryOp::Like,
			Box::new(Expr::Literal(Value::Text("hello world".into()))),
			Box::new(Expr::Literal(Value::Text("hello%".into()))),
		);
		assert_eq!(e.evaluate(&NoParams).unwrap(), Value::Bool(true));
	}

	#[test]
	fn walk_finds_aggregate_calls() {
		let e = Expr::Binary(
			BinaryOp::Add,
			Box::new(Expr::Aggregate(AggregateCall {
				func: AggregateFunc::Count,
				arg: None,
			})),
			Box::new(lit(1)),
		);
		assert!(e.contains_aggregate());
	}
}
