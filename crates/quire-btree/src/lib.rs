//! Persistent copy-on-write B-tree representing a commit's key→value map.
//!
//! A tree is a set of [`TreeNode`] objects in the object store, referenced by
//! the root node's id. Trees are never mutated in place: applying a change
//! batch rewrites the nodes on the touched paths and returns a new root,
//! structurally sharing every untouched subtree with the old one.
//!
//! Operations:
//!
//! - [`apply_changes`] -- sorted change stream → new root + newly written nodes
//! - [`for_each_entry`] -- ordered iteration from a minimum key
//! - [`for_each_diff`] -- ordered entry-level diff of two trees
//! - [`get_entry`] -- point lookup
//! - [`reachable_object_ids`] -- node and eager-value enumeration for
//!   sync/GC accounting

pub mod builder;
pub mod diff;
pub mod error;
pub mod iter;
pub mod node;
pub mod reachable;

pub use builder::apply_changes;
pub use diff::for_each_diff;
pub use error::{TreeError, TreeResult};
pub use iter::{for_each_entry, get_entry};
pub use node::TreeNode;
pub use reachable::reachable_object_ids;
