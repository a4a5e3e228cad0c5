//! Pure utility functions.
//!
//! Stateless helpers used by embedding binaries and tests.

pub mod bootstrap;
