//! caskql — an embeddable relational query core.
//!
//! This crate is the SQL front end, logical stream model, and query
//! planner/executor for a transactional, indexed on-disk table store. The
//! storage engine and catalog are consumed through the traits in
//! [`kvs`] and [`catalog`]; a single-process in-memory implementation of
//! both ships here so the crate is runnable on its own, but a real
//! deployment is expected to supply its own.

#[macro_use]
extern crate tracing;

#[macro_use]
mod mac;

pub mod cnf;
pub mod err;

pub mod syn;
pub mod parser;
pub mod ast;

pub mod catalog;
pub mod kvs;
pub mod key;

pub mod bind;
pub mod plan;
pub mod doc;
pub mod exec;

pub mod ctx;
pub mod dbs;

pub use dbs::{Connection, Response, Session};
pub use err::{Error, Result};
