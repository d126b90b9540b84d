//! Shared driver plumbing for the skuld binaries.

pub mod common;
