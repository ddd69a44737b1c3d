//! Per-statement execution context (spec §5, "Concurrency & Resource
//! Model"): a cancellation token and an optional deadline the executor
//! polls between rows and between operator boundaries.
//!
//! Grounded on the teacher's `ctx::Context` (a cancellable, deadline-aware
//! context threaded through every async call); collapsed to a plain
//! synchronous struct since spec.md §5 is explicit that the core performs
//! no async scheduling of its own.

use crate::err::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct Context {
	cancelled: Arc<AtomicBool>,
	deadline: Option<Instant>,
}

impl Default for Context {
	fn default() -> Self {
		Context {
			cancelled: Arc::new(AtomicBool::new(false)),
			deadline: None,
		}
	}
}

impl Context {
	pub fn new() -> Self {
		Self::default()
	}

	/// A context that reports [`Error::DeadlineExceeded`] once `timeout`
	/// has elapsed since construction.
	pub fn with_timeout(timeout: Duration) -> Self {
		Context {
			cancelled: Arc::new(AtomicBool::new(false)),
			deadline: Some(Instant::now() + timeout),
		}
	}

	/// Requests cancellation. `Context` is cheaply `Clone`, and every
	/// clone shares the same flag, so cancelling the handle a caller kept
	/// is observed by the executor mid-statement.
	pub fn cancel(&self) {
		self.cancelled.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::SeqCst)
	}

	/// Polled by the executor between rows and between operator
	/// boundaries (spec.md §5).
	pub fn check(&self) -> Result<()> {
		if self.is_cancelled() {
			return Err(Error::Cancelled);
		}
		if let Some(deadline) = self.deadline {
			if Instant::now() >= deadline {
				return Err(Error::DeadlineExceeded);
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cancellation_is_observed_after_cancel() {
		let ctx = Context::new();
		assert!(ctx.check().is_ok());
		ctx.cancel();
		assert!(matches!(ctx.check(), Err(Error::Cancelled)));
	}

	#[test]
	fn deadline_is_observed_once_elapsed() {
		let ctx = Context::with_timeout(Duration::from_millis(0));
		std::thread::sleep(Duration::from_millis(5));
		assert!(matches!(ctx.check(), Err(Error::DeadlineExceeded)));
	}
}
