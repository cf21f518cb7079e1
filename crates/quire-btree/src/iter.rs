use quire_store::ObjectStore;
use quire_types::{Entry, ObjectId};

use crate::error::TreeResult;
use crate::node::TreeNode;

/// Stream the entries of the tree rooted at `root_id` whose key is >=
/// `min_key`, in ascending key order.
///
/// `on_next` returns `true` to continue, `false` to stop early. Stopping
/// early is not an error.
pub fn for_each_entry(
    store: &dyn ObjectStore,
    root_id: ObjectId,
    min_key: &[u8],
    mut on_next: impl FnMut(&Entry) -> bool,
) -> TreeResult<()> {
    visit(store, &root_id, min_key, &mut on_next)?;
    Ok(())
}

/// In-order walk of one subtree; returns `false` once the callback stops.
fn visit(
    store: &dyn ObjectStore,
    id: &ObjectId,
    min_key: &[u8],
    on_next: &mut dyn FnMut(&Entry) -> bool,
) -> TreeResult<bool> {
    if id.is_null() {
        return Ok(true);
    }
    let node = TreeNode::load(store, id)?;
    // An exact hit starts at that entry; a miss starts at the child that
    // would hold the key (everything before it is < min_key).
    let (mut index, mut descend) = match node.find_key_or_child(min_key) {
        Ok(i) => (i, false),
        Err(i) => (i, true),
    };
    loop {
        if descend && !visit(store, &node.child_id(index), min_key, on_next)? {
            return Ok(false);
        }
        if index >= node.key_count() {
            return Ok(true);
        }
        if !on_next(&node.entries()[index]) {
            return Ok(false);
        }
        index += 1;
        descend = true;
    }
}

/// Look up the entry for `key` in the tree rooted at `root_id`.
pub fn get_entry(
    store: &dyn ObjectStore,
    root_id: ObjectId,
    key: &[u8],
) -> TreeResult<Option<Entry>> {
    let mut id = root_id;
    loop {
        if id.is_null() {
            return Ok(None);
        }
        let node = TreeNode::load(store, &id)?;
        match node.find_key_or_child(key) {
            Ok(i) => return Ok(Some(node.entries()[i].clone())),
            Err(i) => id = node.child_id(i),
        }
    }
}
