//! # gocallgraph
//!
//! Static call graph extraction for Go modules, with streaming persistence.
//!
//! A run resolves the enclosing Go module, loads and type-resolves every
//! package under the analysis root, builds a raw call graph with one of four
//! algorithms, filters it down to module-internal edges and streams the
//! result to a [`storage::CallGraphStore`] through two bounded channels.
//!
//! ## Algorithms
//!
//! - **static**: statically dispatched calls only
//! - **cha**: class hierarchy analysis
//! - **rta**: rapid type analysis rooted at `main`
//! - **vta**: variable type analysis

pub mod callgraph;
pub mod config;
pub mod core;
pub mod error;
pub mod formatters;
pub mod ir;
pub mod parsers;
pub mod storage;

pub use config::{parse_ignore_paths, Algorithm, AnalysisConfig};
pub use error::{AnalysisError, Diagnostic, StoreError};
