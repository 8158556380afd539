//! CLI command implementations.

pub mod clear;
pub mod collections;
pub mod pending;
