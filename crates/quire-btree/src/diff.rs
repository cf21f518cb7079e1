use quire_store::ObjectStore;
use quire_types::{Entry, EntryChange, ObjectId};

use crate::error::TreeResult;
use crate::node::TreeNode;

/// Stream the entry-level difference between the trees rooted at `base_root`
/// and `other_root`, in ascending key order.
///
/// Each emitted change is an addition, a deletion, or an update (emitted
/// with `deleted == false` and the new entry). Applied to the base tree, the
/// emitted sequence produces the other tree. Subtrees with equal object ids
/// are skipped without being read.
///
/// `on_change` returns `true` to continue, `false` to stop early.
pub fn for_each_diff(
    store: &dyn ObjectStore,
    base_root: ObjectId,
    other_root: ObjectId,
    mut on_change: impl FnMut(EntryChange) -> bool,
) -> TreeResult<()> {
    if base_root == other_root {
        return Ok(());
    }
    let mut base = Cursor::new(base_root);
    let mut other = Cursor::new(other_root);
    let mut base_entry: Option<Entry> = None;
    let mut other_entry: Option<Entry> = None;

    loop {
        // Whenever both cursors are about to descend into the same subtree,
        // skip it on both sides: identical ids mean identical entries, which
        // cancel out of the diff.
        while let (Some(a), Some(b)) = (base.pending_child(), other.pending_child()) {
            if a != b {
                break;
            }
            base.skip_pending_child();
            other.skip_pending_child();
        }

        if base_entry.is_none() {
            base_entry = base.next(store)?;
        }
        if other_entry.is_none() {
            other_entry = other.next(store)?;
        }

        let emitted = match (base_entry.as_ref(), other_entry.as_ref()) {
            (None, None) => return Ok(()),
            (Some(_), None) => base_entry.take().map(EntryChange::delete),
            (None, Some(_)) => other_entry.take().map(EntryChange::put),
            (Some(a), Some(b)) => match a.key.cmp(&b.key) {
                std::cmp::Ordering::Less => base_entry.take().map(EntryChange::delete),
                std::cmp::Ordering::Greater => other_entry.take().map(EntryChange::put),
                std::cmp::Ordering::Equal => {
                    let differs = a != b;
                    let newer = other_entry.take();
                    base_entry = None;
                    if differs {
                        newer.map(EntryChange::put)
                    } else {
                        None
                    }
                }
            },
        };
        if let Some(change) = emitted {
            if !on_change(change) {
                return Ok(());
            }
        }
    }
}

/// In-order streaming cursor over one tree.
///
/// A frame alternates between descending into the child at `index` and
/// yielding the entry at `index`; `descend_pending` records which comes next.
struct Cursor {
    stack: Vec<Frame>,
}

struct Frame {
    node: TreeNode,
    index: usize,
    descend_pending: bool,
}

impl Frame {
    fn new(node: TreeNode) -> Self {
        Self {
            node,
            index: 0,
            descend_pending: true,
        }
    }
}

impl Cursor {
    fn new(root: ObjectId) -> Self {
        let mut stack = Vec::new();
        if !root.is_null() {
            // Defer the root load to the first `next` call by starting from
            // a synthetic frame whose only child is the root.
            stack.push(Frame::new(TreeNode::seed(root)));
        }
        Self { stack }
    }

    /// The id of the non-absent subtree the cursor would descend into next,
    /// if its next step is a descent. Pops exhausted frames on the way.
    fn pending_child(&mut self) -> Option<ObjectId> {
        loop {
            let top = self.stack.last_mut()?;
            if top.descend_pending {
                let id = top.node.child_id(top.index);
                if id.is_null() {
                    top.descend_pending = false;
                    continue;
                }
                return Some(id);
            }
            if top.index < top.node.key_count() {
                return None;
            }
            self.stack.pop();
        }
    }

    /// Skip the subtree reported by `pending_child` without reading it.
    fn skip_pending_child(&mut self) {
        if let Some(top) = self.stack.last_mut() {
            top.descend_pending = false;
        }
    }

    fn next(&mut self, store: &dyn ObjectStore) -> TreeResult<Option<Entry>> {
        loop {
            let Some(top) = self.stack.last_mut() else {
                return Ok(None);
            };
            if top.descend_pending {
                top.descend_pending = false;
                let id = top.node.child_id(top.index);
                if !id.is_null() {
                    let node = TreeNode::load(store, &id)?;
                    self.stack.push(Frame::new(node));
                }
                continue;
            }
            if top.index < top.node.key_count() {
                let entry = top.node.entries()[top.index].clone();
                top.index += 1;
                top.descend_pending = true;
                return Ok(Some(entry));
            }
            self.stack.pop();
        }
    }
}
