//! Deterministic, pure logic shared by the loop controller.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod contract;
pub mod failure;
pub mod guard;
pub mod path_rules;
pub mod stories;
pub mod types;
