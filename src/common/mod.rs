//! Common types and utilities shared across pagetree.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants
//! - Error types
//! - Node references

pub mod config;
pub mod error;
mod node_ref;

pub use error::{Error, Result};
pub use node_ref::NodeRef;
