//! The logical stream/operator model (spec component C4) and the
//! rule-based planner that rewrites it (spec component C7).
//!
//! Grounded on the teacher's `dbs::iterator`/`dbs::statement` lowering: a
//! statement reduces its expressions into a small vocabulary of typed steps
//! executed in sequence, except that here the steps are captured as data
//! (`Stream`/`Op`) so the planner can rewrite them before anything runs,
//! rather than being interpreted straight off the AST.

pub mod planner;
pub mod stream;

pub use planner::optimize;
pub use stream::{Aggregator, IndexRange, Op, Stream};
