//! Bound parameter values for one statement run (spec.md §6: `$name` named,
//! `?`/`$N` 1-based positional).

use std::collections::BTreeMap;

use crate::ast::Value;
use crate::err::{Error, Result};

#[derive(Clone, Debug, Default)]
pub struct Params {
	/// Index 0 holds `$1`/the first `?`.
	positional: Vec<Value>,
	named: BTreeMap<String, Value>,
}

impl Params {
	pub fn new() -> Self {
		Params::default()
	}

	pub fn with_positional(values: Vec<Value>) -> Self {
		Params { positional: values, named: BTreeMap::new() }
	}

	pub fn set_named(&mut self, name: impl Into<String>, value: Value) {
		self.named.insert(name.into(), value);
	}

	pub fn positional(&self, index: u32) -> Result<Value> {
		let i = index.checked_sub(1).ok_or_else(|| Error::BadParameter(format!("${index}")))? as usize;
		self.positional.get(i).cloned().ok_or_else(|| Error::MissingParameter(format!("${index}")))
	}

	pub fn named(&self, name: &str) -> Result<Value> {
		self.named.get(name).cloned().ok_or_else(|| Error::MissingParameter(name.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn positional_params_are_one_based() {
		let p = Params::with_positional(vec![Value::Int(10), Value::Int(20)]);
		assert_eq!(p.positional(1).unwrap(), Value::Int(10));
		assert_eq!(p.positional(2).unwrap(), Value::Int(20));
		assert!(p.positional(3).is_err());
	}

	#[test]
	fn missing_named_param_is_an_error() {
		let p = Params::new();
		assert!(matches!(p.named("x"), Err(Error::MissingParameter(_))));
	}
}
