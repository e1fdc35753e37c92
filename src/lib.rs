//! Storyloom — branching interactive story generation driven by chat models.
//!
//! Grows a tree of scenes and choices by repeatedly prompting a language
//! model: every unresolved choice is expanded depth-first until all branches
//! reach the configured scene count, and the whole tree is republished to a
//! snapshot file after each mutation so external viewers can poll it.

pub mod core;
pub mod schema;
