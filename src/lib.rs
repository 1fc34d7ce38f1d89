//! Hierarchical, checkable launch-argument trees.
//!
//! Each project owns an [`core::tree::ArgTree`]: an arena of groups and
//! typed parameters with tri-state checkboxes. Mutations emit
//! [`core::events::TreeEvent`]s that the owning [`core::view_model::TreeViewModel`]
//! hands out stamped with the project they came from, and
//! [`core::aggregator`] flattens the checked subset of a tree into the
//! command line, environment map, working directory and launch override
//! for a debug session.

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
