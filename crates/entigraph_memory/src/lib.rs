//! # EntiGraph Memory
//!
//! In-memory graph store for EntiGraph.
//!
//! This crate provides:
//! - [`MemoryGraph`], a property graph with undo-log transactions
//! - [`GraphRecord`], local and remote-style record handles
//! - [`GraphEntityState`] and [`GraphStateFactory`], the property-container
//!   entity state used by the [`Transmitter`](entigraph_core::Transmitter)
//!
//! It is intended for tests and for embedding where durability is not
//! required.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod graph;
mod record;
mod state;
mod transaction;

pub use graph::MemoryGraph;
pub use record::GraphRecord;
pub use state::{referenced_ids, GraphEntityState, GraphStateFactory, TYPE_KEY};
pub use transaction::{MemoryTransaction, TransactionId};
