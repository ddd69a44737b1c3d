//! Small helper macros shared across the crate.

/// Lazily parses a value from an environment variable, falling back to a
/// default when the variable is unset or fails to parse.
#[macro_export]
macro_rules! lazy_env_parse {
	($key:expr, $t:ty, $default:expr) => {
		once_cell::sync::Lazy::new(|| {
			std::env::var($key)
				.ok()
				.and_then(|s| s.parse::<$t>().ok())
				.unwrap_or($default)
		})
	};
}

/// Builds a `BTreeMap` from `key => value` pairs — used for catalog lookups
/// and other name-keyed collections where name order (not schema order) is
/// an acceptable deterministic order.
#[macro_export]
macro_rules! map {
	($($k:expr => $v:expr),* $(,)?) => {{
		let mut m = ::std::collections::BTreeMap::new();
		$(m.insert($k, $v);)*
		m
	}};
}
