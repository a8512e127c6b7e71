pub mod ancestor;
pub mod builder;
pub mod error;
pub mod infer;
pub mod matcher;
pub mod tables;

/* private use */
pub use crate::{ancestor::*, builder::*, error::*, infer::*, matcher::*, tables::*};

/// Index of a node in the builder's parallel time/flags arrays.
pub type NodeId = i32;

/// Marker for "no node", e.g. the parent of a root.
pub const NULL_NODE: NodeId = -1;
