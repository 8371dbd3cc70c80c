//! Deterministic, pure logic shared by the kernel.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod plan;
pub mod resolution;
pub mod taxonomy;
pub mod types;
pub mod version;
