use std::collections::HashSet;

use quire_store::ObjectStore;
use quire_types::{KeyPriority, ObjectId};

use crate::error::TreeResult;
use crate::node::TreeNode;

/// Enumerate the object ids reachable from `root_id`: every tree node, plus
/// the value objects of eager entries.
///
/// Lazy entries contribute their node but not their value; their values are
/// fetched on demand and need not be present locally.
pub fn reachable_object_ids(
    store: &dyn ObjectStore,
    root_id: ObjectId,
) -> TreeResult<HashSet<ObjectId>> {
    let mut ids = HashSet::new();
    let mut pending = vec![root_id];
    while let Some(id) = pending.pop() {
        if id.is_null() || !ids.insert(id) {
            continue;
        }
        let node = TreeNode::load(store, &id)?;
        for entry in node.entries() {
            if entry.priority == KeyPriority::Eager {
                ids.insert(entry.object_id);
            }
        }
        pending.extend(node.children().iter().copied().filter(|c| !c.is_null()));
    }
    Ok(ids)
}
