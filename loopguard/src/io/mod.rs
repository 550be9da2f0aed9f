//! I/O adapters for loopguard commands.

pub mod agent;
pub mod atomic;
pub mod config;
pub mod contract_doc;
pub mod failure_store;
pub mod git;
pub mod init;
pub mod policy_store;
pub mod process;
pub mod prompt;
pub mod state_store;
pub mod story_store;
pub mod workspace;
