//! # EntiGraph Testkit
//!
//! Test utilities for EntiGraph.
//!
//! This crate provides:
//! - Mapped sample entities and graph helpers
//! - Scripted records, states and stores that log every call
//! - Property-based test generators using proptest
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use entigraph_testkit::prelude::*;
//!
//! #[test]
//! fn saves_alice() {
//!     with_graph(|graph, transmitter| {
//!         let node = empty_node(graph);
//!         transmitter.save_entity(&alice(), &node, graph).unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod doubles;
pub mod fixtures;
pub mod generators;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::doubles::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
}

pub use doubles::*;
pub use fixtures::*;
pub use generators::*;
pub use logging::*;
