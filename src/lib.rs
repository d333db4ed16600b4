//! lintpatch library crate
//!
//! Reads a linter report, asks a text-generation backend for fixed file
//! content, and only writes a fix back once it has passed the safety gate.

pub mod commit;
pub mod config;
pub mod fix;
pub mod gate;
pub mod llm;
pub mod report;
pub mod util;
