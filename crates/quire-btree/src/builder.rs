use std::collections::HashSet;

use quire_store::ObjectStore;
use quire_types::{Entry, EntryChange, ObjectId};

use crate::error::{TreeError, TreeResult};
use crate::node::TreeNode;

/// Apply a strictly-ascending stream of changes to the tree rooted at
/// `root_id`.
///
/// Returns the new root id and the exact set of tree-node ids written by this
/// batch (for GC and sync accounting). Untouched subtrees are structurally
/// shared with the old root; the old root remains valid, so a failure part
/// way through leaves the on-disk tree consistent.
///
/// A node ends the batch with at most `max_entries_per_node` entries: an
/// overfull node of `n` entries splits into `ceil((n+1)/(max+1))` children
/// with entry counts as even as possible, promoting the boundary entries.
/// Deleting an entry held by an inner node merges its two child subtrees.
pub fn apply_changes(
    store: &dyn ObjectStore,
    root_id: ObjectId,
    max_entries_per_node: usize,
    changes: impl IntoIterator<Item = EntryChange>,
) -> TreeResult<(ObjectId, HashSet<ObjectId>)> {
    if max_entries_per_node == 0 {
        return Err(TreeError::Malformed(
            "max_entries_per_node must be positive".to_string(),
        ));
    }

    let mut root = WorkNode::load(store, &root_id)?;

    let mut last_key: Option<Vec<u8>> = None;
    for change in changes {
        if let Some(prev) = &last_key {
            if change.entry.key <= *prev {
                return Err(TreeError::UnsortedChanges(
                    String::from_utf8_lossy(&change.entry.key).into_owned(),
                ));
            }
        }
        last_key = Some(change.entry.key.clone());
        root.apply(store, &change)?;
    }

    // A root left without entries collapses onto its single child.
    while root.entries.is_empty() && root.children.len() == 1 {
        match root.children.swap_remove(0) {
            Child::Loaded(child) => root = *child,
            Child::Stored(id) if !id.is_null() => root = WorkNode::load(store, &id)?,
            absent => {
                root.children.push(absent);
                break;
            }
        }
    }

    let mut new_nodes = HashSet::new();
    let mut finished = root.finish(store, max_entries_per_node, &mut new_nodes)?;
    // Promoted entries grow a new root level; that root may itself be
    // overfull, so keep going until nothing is promoted.
    while !finished.promoted.is_empty() {
        let level = WorkNode {
            entries: finished.promoted,
            children: finished.ids.into_iter().map(Child::Stored).collect(),
            stored_id: None,
        };
        finished = level.finish(store, max_entries_per_node, &mut new_nodes)?;
    }

    Ok((finished.ids[0], new_nodes))
}

/// A child slot of an in-memory node under mutation.
enum Child {
    /// Untouched subtree referenced by id; the null id marks an absent child.
    Stored(ObjectId),
    /// Subtree loaded into memory because a change descended into it.
    Loaded(Box<WorkNode>),
}

impl Child {
    fn is_absent(&self) -> bool {
        matches!(self, Child::Stored(id) if id.is_null())
    }
}

/// An in-memory image of a tree node while a change batch is applied.
///
/// `stored_id` is the id the node had when loaded; it is cleared as soon as
/// the node's bytes would differ, which lets `finish` skip rewriting clean
/// subtrees and report the exact set of new nodes.
struct WorkNode {
    entries: Vec<Entry>,
    children: Vec<Child>,
    stored_id: Option<ObjectId>,
}

/// Outcome of finishing a node: the written pieces and the entries promoted
/// to the parent between them (`ids.len() == promoted.len() + 1`).
struct Finished {
    promoted: Vec<Entry>,
    ids: Vec<ObjectId>,
}

impl WorkNode {
    fn load(store: &dyn ObjectStore, id: &ObjectId) -> TreeResult<Self> {
        let node = TreeNode::load(store, id)?;
        Ok(Self {
            entries: node.entries().to_vec(),
            children: node.children().iter().copied().map(Child::Stored).collect(),
            stored_id: Some(*id),
        })
    }

    fn find(&self, key: &[u8]) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| e.key.as_slice().cmp(key))
    }

    /// Apply one change to the subtree rooted at this node.
    ///
    /// Returns whether anything changed; a changed child dirties this node
    /// too, since the child's id is part of this node's bytes.
    fn apply(&mut self, store: &dyn ObjectStore, change: &EntryChange) -> TreeResult<bool> {
        match self.find(&change.entry.key) {
            Ok(i) => {
                if change.deleted {
                    let right = self.children.remove(i + 1);
                    let left = std::mem::replace(
                        &mut self.children[i],
                        Child::Stored(ObjectId::null()),
                    );
                    self.children[i] = merge_children(store, left, right)?;
                    self.entries.remove(i);
                    self.stored_id = None;
                    Ok(true)
                } else if self.entries[i] != change.entry {
                    self.entries[i] = change.entry.clone();
                    self.stored_id = None;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Err(i) => {
                if self.children[i].is_absent() {
                    if change.deleted {
                        // Deleting a key the tree does not have is a no-op.
                        return Ok(false);
                    }
                    self.entries.insert(i, change.entry.clone());
                    self.children.insert(i, Child::Stored(ObjectId::null()));
                    self.stored_id = None;
                    Ok(true)
                } else {
                    let child = self.load_child(store, i)?;
                    let changed = child.apply(store, change)?;
                    if changed {
                        self.stored_id = None;
                    }
                    Ok(changed)
                }
            }
        }
    }

    fn load_child(&mut self, store: &dyn ObjectStore, i: usize) -> TreeResult<&mut WorkNode> {
        if let Child::Stored(id) = self.children[i] {
            let loaded = WorkNode::load(store, &id)?;
            self.children[i] = Child::Loaded(Box::new(loaded));
        }
        match &mut self.children[i] {
            Child::Loaded(node) => Ok(node),
            Child::Stored(_) => Err(TreeError::Malformed(
                "descended into an absent child".to_string(),
            )),
        }
    }

    /// Write this subtree out, splitting overfull nodes, and report the
    /// resulting piece ids plus the entries promoted to the parent.
    fn finish(
        self,
        store: &dyn ObjectStore,
        max: usize,
        new_nodes: &mut HashSet<ObjectId>,
    ) -> TreeResult<Finished> {
        if let Some(id) = self.stored_id {
            // Untouched subtree: keep sharing it.
            return Ok(Finished {
                promoted: Vec::new(),
                ids: vec![id],
            });
        }

        // Finish children first; their promoted entries splice into this
        // node's entry list at the child's position.
        let mut entries = Vec::with_capacity(self.entries.len());
        let mut children = Vec::with_capacity(self.children.len());
        let mut own_entries = self.entries.into_iter();
        let child_count = self.children.len();
        for (i, child) in self.children.into_iter().enumerate() {
            match child {
                Child::Stored(id) => children.push(id),
                Child::Loaded(sub) => {
                    let sub = sub.finish(store, max, new_nodes)?;
                    for (j, id) in sub.ids.iter().enumerate() {
                        children.push(*id);
                        if j < sub.promoted.len() {
                            entries.push(sub.promoted[j].clone());
                        }
                    }
                }
            }
            if i + 1 < child_count {
                match own_entries.next() {
                    Some(entry) => entries.push(entry),
                    None => {
                        return Err(TreeError::Malformed(
                            "entry/child arity mismatch while finishing".to_string(),
                        ))
                    }
                }
            }
        }

        write_pieces(store, entries, children, max, new_nodes)
    }
}

/// Write `entries`/`children` as one node, or split them into evenly filled
/// pieces when over `max`.
fn write_pieces(
    store: &dyn ObjectStore,
    entries: Vec<Entry>,
    children: Vec<ObjectId>,
    max: usize,
    new_nodes: &mut HashSet<ObjectId>,
) -> TreeResult<Finished> {
    let n = entries.len();
    if n <= max {
        let id = write_node(store, entries, children, new_nodes)?;
        return Ok(Finished {
            promoted: Vec::new(),
            ids: vec![id],
        });
    }

    let pieces = (n + 1 + max) / (max + 1);
    let kept = n - (pieces - 1);
    let base = kept / pieces;
    let extra = kept % pieces;

    let mut promoted = Vec::with_capacity(pieces - 1);
    let mut ids = Vec::with_capacity(pieces);
    let mut e = 0;
    let mut c = 0;
    for i in 0..pieces {
        let size = base + usize::from(i < extra);
        let piece_entries = entries[e..e + size].to_vec();
        let piece_children = children[c..c + size + 1].to_vec();
        e += size;
        c += size + 1;
        ids.push(write_node(store, piece_entries, piece_children, new_nodes)?);
        if i + 1 < pieces {
            promoted.push(entries[e].clone());
            e += 1;
        }
    }
    Ok(Finished { promoted, ids })
}

fn write_node(
    store: &dyn ObjectStore,
    entries: Vec<Entry>,
    children: Vec<ObjectId>,
    new_nodes: &mut HashSet<ObjectId>,
) -> TreeResult<ObjectId> {
    let id = TreeNode::new(entries, children)?.write(store)?;
    new_nodes.insert(id);
    Ok(id)
}

/// Merge the two child subtrees left and right of a deleted entry.
///
/// Mirrors bottom-up node merging: the merged node's middle child is the
/// recursive merge of left's last child and right's first child.
fn merge_children(store: &dyn ObjectStore, left: Child, right: Child) -> TreeResult<Child> {
    let left = into_work(store, left)?;
    let right = into_work(store, right)?;
    match (left, right) {
        (None, None) => Ok(Child::Stored(ObjectId::null())),
        (Some(mut left), Some(mut right)) => {
            let left_last = left.children.pop().ok_or_else(|| {
                TreeError::Malformed("node without child slots".to_string())
            })?;
            let right_first = right.children.remove(0);
            let middle = merge_children(store, left_last, right_first)?;

            let mut entries = left.entries;
            entries.extend(right.entries);
            let mut children = left.children;
            children.push(middle);
            children.extend(right.children);
            Ok(Child::Loaded(Box::new(WorkNode {
                entries,
                children,
                stored_id: None,
            })))
        }
        _ => Err(TreeError::Malformed(
            "sibling depth mismatch while merging".to_string(),
        )),
    }
}

fn into_work(store: &dyn ObjectStore, child: Child) -> TreeResult<Option<WorkNode>> {
    match child {
        Child::Stored(id) if id.is_null() => Ok(None),
        Child::Stored(id) => Ok(Some(WorkNode::load(store, &id)?)),
        Child::Loaded(node) => Ok(Some(*node)),
    }
}
