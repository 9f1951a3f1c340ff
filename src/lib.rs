//! # fineTree
//! Concurrent in-memory B+-tree index with fine-grained locking.
//!
//! Every node carries its own reader-writer lock. Readers descend with shared lock coupling
//! (at most two node locks at a time), writers descend with exclusive lock coupling and keep
//! locks only on the part of the path which can be changed by split or merge. Leaves keep
//! key-value pairs unsorted and locate keys with a SIMD equality scan; inner nodes are
//! sorted and binary searched for the predecessor of the key.
//!
//! # Usage
//! ```
//! use finetree::{FineTree, TreeConfig};
//!
//! let tree = FineTree::with_config(0u64, TreeConfig::default().with_leaf_capacity(4));
//! for key in 1..=10 {
//!     assert_eq!(tree.insert(key, key.to_string()).unwrap(), None);
//! }
//! assert_eq!(tree.get(&7).unwrap(), Some("7".to_string()));
//! assert_eq!(tree.insert(7, "seven".to_string()).unwrap(), Some("7".to_string()));
//!
//! assert_eq!(tree.delete(&7).unwrap(), Some("seven".to_string()));
//! assert_eq!(tree.get(&7).unwrap(), None);
//! assert_eq!(tree.len(), 9);
//! assert!(tree.height() > 1);
//! tree.validate().unwrap();
//! ```

mod config;
mod error;
mod ids;
mod node;
mod path;
mod scanner;
mod tracing_helpers;

pub use crate::config::{TreeConfig, DEFAULT_INNER_FANOUT, DEFAULT_LEAF_CAPACITY};
pub use crate::error::{Error, Result};
pub use crate::ids::{NodeId, NodeIds};
pub use crate::scanner::{find_exact_portable, LaneKey};

use crate::ids::NodeBudget;
use crate::node::{Child, LeafNode, Node, NodeBody, NodeKind, NodeRef, ReadGuard, WriteGuard};
use crate::path::TraversePath;
use crate::tracing_helpers::{debug_log, error_log, trace_log, warn_log};
use parking_lot::RwLock;
use std::collections::{TryReserveError, VecDeque};
use std::fmt::{Debug, Write};
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Concurrent B+-tree.
///
/// # Key-value trait bounds
///
/// Keys are primitive integers(see [LaneKey]): leaf scan compares keys lane-by-lane inside
/// vector registers. Values are returned by clone, because lookup releases all locks before
/// it returns.
///
/// # Structure
/// Tree always has an inner root. Fresh tree consists of root at level 1 with single empty
/// leaf, which lower bound is `min_key`. Keys smaller than `min_key` can't be stored.
///
/// # Visibility of changes
/// `insert` and `delete` are linearizable: change is made under exclusive lock of the leaf
/// and is visible to every `get` which acquires leaf lock later. Root replacement happens
/// under the anchor lock, so readers always see either the old or the new root, both fully
/// initialized.
///
/// # Thread safety
/// FineTree can be safely shared between threads, e.g. it implements [Send] and [Sync].
pub struct FineTree<K: LaneKey, V> {
    /// Anchor: holds current root. Exclusive anchor lock is required to replace root.
    root: RwLock<NodeRef<K, V>>,
    min_key: K,
    config: TreeConfig,
    ids: NodeIds,
    budget: NodeBudget,
    len: AtomicUsize,
}

/// Shape of the tree collected by [FineTree::validate].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TreeStats {
    pub height: usize,
    pub inner_nodes: usize,
    pub leaf_nodes: usize,
    pub entries: usize,
}

enum Rebalance<K, V> {
    /// Underflowed node was merged with its sibling. Carries the left sibling guard if the
    /// node was merged into it and retired.
    Merged(Option<WriteGuard<K, V>>),
    Redistributed,
    NoSibling,
}

/// Nodes allocated before split starts to modify the tree.
struct SpareNodes<K, V> {
    leaf: Node<K, V>,
    /// Siblings for inner nodes, from the lowest split level to the highest.
    inner: Vec<Node<K, V>>,
    root: Option<Node<K, V>>,
}

impl<K: LaneKey, V> FineTree<K, V> {
    /// Create new tree with default node sizes.
    pub fn new(min_key: K) -> FineTree<K, V> {
        Self::with_config(min_key, TreeConfig::default())
    }

    /// Create new tree with passed node sizes and limits.
    pub fn with_config(min_key: K, config: TreeConfig) -> FineTree<K, V> {
        Self::with_node_ids(min_key, config, NodeIds::new())
    }

    /// Create new tree which draws node ids from passed sequence.
    pub fn with_node_ids(min_key: K, config: TreeConfig, ids: NodeIds) -> FineTree<K, V> {
        config.assert_valid();
        let root_id = ids.next_id();
        let leaf = Node::new_leaf(
            ids.next_id(),
            min_key,
            Some(root_id),
            config.leaf_capacity as usize,
        );
        let root = Node::new_root(
            root_id,
            1,
            min_key,
            Child::new(leaf),
            config.inner_fanout as usize,
        );
        // root and its first leaf
        let budget = NodeBudget::new(2, config.max_nodes);
        FineTree {
            root: RwLock::new(Arc::new(RwLock::new(root))),
            min_key,
            config,
            ids,
            budget,
            len: AtomicUsize::new(0),
        }
    }

    /// Get value associated with key.
    ///
    /// `Ok(None)` means that key is not present.
    pub fn get(&self, key: &K) -> Result<Option<V>>
    where
        V: Clone,
    {
        if *key < self.min_key {
            return Ok(None);
        }
        self.read_leaf(key, |leaf| leaf.get(key).cloned())
    }

    pub fn contains_key(&self, key: &K) -> Result<bool> {
        if *key < self.min_key {
            return Ok(false);
        }
        self.read_leaf(key, |leaf| leaf.find(key).is_some())
    }

    /// Insert key-value pair or replace value of existing key.
    ///
    /// # Return
    /// Returns previous value if key was already in tree.
    /// Returns [Error::ResourceExhausted] if split required new nodes which can't be allocated,
    /// tree is not changed in this case.
    pub fn insert(&self, key: K, value: V) -> Result<Option<V>> {
        if key < self.min_key {
            return Err(Error::KeyBelowMinimum);
        }

        let mut path = TraversePath::lock_root(&self.root, |root| root.is_insert_safe());
        self.descend(&mut path, &key, |node| node.is_insert_safe())?;

        let leaf = Self::leaf_of(&mut path)?;
        if let Some(idx) = leaf.find(&key) {
            return Ok(Some(leaf.replace(idx, value)));
        }
        if !leaf.is_full() {
            leaf.push(key, value);
            self.len.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        self.split_and_insert(&mut path, key, value)?;
        self.len.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    /// Delete key from tree.
    ///
    /// # Return
    /// Returns removed value or `None` if key is not present.
    pub fn delete(&self, key: &K) -> Result<Option<V>> {
        if *key < self.min_key {
            return Ok(None);
        }

        let mut path = TraversePath::lock_root(&self.root, |root| root.is_delete_safe(true));
        self.descend(&mut path, key, |node| node.is_delete_safe(false))?;

        let leaf = Self::leaf_of(&mut path)?;
        let idx = match leaf.find(key) {
            Some(idx) => idx,
            None => return Ok(None),
        };
        let (_, value) = leaf.remove(idx);
        self.len.fetch_sub(1, Ordering::Relaxed);

        self.rebalance(&mut path)?;
        Ok(Some(value))
    }

    /// Count of key-value pairs in tree.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count of levels, including leaf level.
    pub fn height(&self) -> usize {
        let anchor = self.root.read();
        let root = anchor.read();
        root.level() as usize + 1
    }

    #[inline]
    pub fn min_key(&self) -> K {
        self.min_key
    }

    #[inline]
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Sequence used to assign ids to nodes of this tree.
    pub fn node_ids(&self) -> &NodeIds {
        &self.ids
    }

    /// Count of nodes currently linked into tree.
    pub fn live_nodes(&self) -> usize {
        self.budget.live()
    }

    /// Dump all nodes breadth-first, one node per line.
    ///
    /// Nodes are locked one by one, so output is consistent only if there are no concurrent
    /// writers.
    pub fn describe(&self) -> String
    where
        V: Debug,
    {
        let mut out = String::new();
        let anchor = self.root.read();
        let mut queue = VecDeque::new();
        queue.push_back(Arc::clone(&*anchor));
        while let Some(node_ref) = queue.pop_front() {
            let node = node_ref.read();
            let _ = writeln!(out, "{}", *node);
            if let NodeBody::Inner(inner) = node.body() {
                queue.extend(inner.children().iter().map(|child| Arc::clone(&child.node)));
            }
        }
        out
    }

    /// Check structure of the whole tree.
    ///
    /// Should be called when there are no concurrent writers: entry and node counters
    /// are compared with the actual content of the tree.
    pub fn validate(&self) -> Result<TreeStats> {
        let anchor = self.root.read();
        let root = anchor.read();
        if root.kind() != NodeKind::Inner {
            return Err(Error::invariant(format!("root {} is not inner node", root.id())));
        }
        if root.lower_bound() != self.min_key {
            return Err(Error::invariant(format!(
                "root lower bound {:?} is not minimal key {:?}",
                root.lower_bound(),
                self.min_key
            )));
        }

        let mut stats = TreeStats {
            height: root.level() as usize + 1,
            ..TreeStats::default()
        };
        self.validate_node(&root, None, self.min_key, None, &mut stats)?;

        if stats.entries != self.len() {
            return Err(Error::invariant(format!(
                "tree contains {} entries, counter is {}",
                stats.entries,
                self.len()
            )));
        }
        let nodes = stats.inner_nodes + stats.leaf_nodes;
        if nodes != self.budget.live() {
            return Err(Error::invariant(format!(
                "tree contains {} nodes, budget accounts {}",
                nodes,
                self.budget.live()
            )));
        }
        Ok(stats)
    }

    fn validate_node(
        &self,
        node: &Node<K, V>,
        parent: Option<NodeId>,
        lower: K,
        upper: Option<K>,
        stats: &mut TreeStats,
    ) -> Result<()> {
        let broken = |what: String| Error::invariant(format!("node {}: {}", node.id(), what));
        if node.parent() != parent {
            return Err(broken(format!(
                "parent link is {:?}, expected {:?}",
                node.parent(),
                parent
            )));
        }
        if node.lower_bound() != lower {
            return Err(broken(format!(
                "lower bound is {:?}, separator in parent is {:?}",
                node.lower_bound(),
                lower
            )));
        }
        let in_range = |key: &K| *key >= lower && upper.map_or(true, |upper| *key < upper);

        match node.body() {
            NodeBody::Inner(inner) => {
                stats.inner_nodes += 1;
                let keys = inner.keys();
                if keys.is_empty() || keys.len() != inner.children().len() {
                    return Err(broken(format!(
                        "{} keys for {} children",
                        keys.len(),
                        inner.children().len()
                    )));
                }
                if node.is_full() {
                    return Err(broken("inner node is full at rest".to_string()));
                }
                if keys[0] != lower {
                    return Err(broken(format!("first key {:?} != lower bound", keys[0])));
                }
                if !keys.windows(2).all(|pair| pair[0] < pair[1]) {
                    return Err(broken(format!("keys are not increasing: {:?}", keys)));
                }
                if !keys.iter().all(in_range) {
                    return Err(broken(format!("keys {:?} out of parent range", keys)));
                }

                for (i, child) in inner.children().iter().enumerate() {
                    let child_node = child.node.read();
                    if child_node.id() != child.id {
                        return Err(broken(format!(
                            "slot {} links {} but node has id {}",
                            i,
                            child.id,
                            child_node.id()
                        )));
                    }
                    if child_node.level() + 1 != node.level() {
                        return Err(broken(format!(
                            "child {} at level {}",
                            child.id,
                            child_node.level()
                        )));
                    }
                    let child_upper = keys.get(i + 1).copied().or(upper);
                    self.validate_node(&child_node, Some(node.id()), keys[i], child_upper, stats)?;
                }
            }
            NodeBody::Leaf(leaf) => {
                stats.leaf_nodes += 1;
                if node.level() != 0 {
                    return Err(broken(format!("leaf at level {}", node.level())));
                }
                if leaf.keys().len() != leaf.values().len() || node.len() > node.capacity() {
                    return Err(broken(format!(
                        "{} keys, {} values, capacity {}",
                        leaf.keys().len(),
                        leaf.values().len(),
                        node.capacity()
                    )));
                }
                if let Some(key) = leaf.keys().iter().find(|key| !in_range(*key)) {
                    return Err(broken(format!("key {:?} out of node range", key)));
                }
                let mut keys = leaf.keys().to_vec();
                keys.sort_unstable();
                if let Some(pair) = keys.windows(2).find(|pair| pair[0] == pair[1]) {
                    return Err(broken(format!("duplicate key {:?}", pair[0])));
                }
                stats.entries += leaf.len();
            }
        }
        Ok(())
    }

    /// Shared lock coupling from root to leaf which can contain key.
    fn read_leaf<R>(&self, key: &K, read: impl FnOnce(&LeafNode<K, V>) -> R) -> Result<R> {
        let anchor = self.root.read();
        let mut node: ReadGuard<K, V> = anchor.read_arc();
        drop(anchor);

        loop {
            let child = match node.body() {
                NodeBody::Inner(inner) => {
                    let idx = node.route(key).map_err(|err| {
                        error_log!("lookup aborted: {}", err);
                        err
                    })?;
                    inner.child(idx).node.read_arc()
                }
                NodeBody::Leaf(leaf) => return Ok(read(leaf)),
            };
            // parent lock released only after child lock is acquired
            node = child;
        }
    }

    /// Exclusive lock coupling from the last node of path to leaf.
    fn descend(
        &self,
        path: &mut TraversePath<'_, K, V>,
        key: &K,
        is_safe: impl Fn(&Node<K, V>) -> bool,
    ) -> Result<()> {
        loop {
            let child = {
                let node = path
                    .last()
                    .ok_or_else(|| Error::invariant("traverse path is empty"))?;
                if node.kind() == NodeKind::Leaf {
                    return Ok(());
                }
                let idx = node.route(key).map_err(|err| {
                    error_log!("update aborted: {}", err);
                    err
                })?;
                node.inner()?.child(idx).node.write_arc()
            };
            let safe = is_safe(&child);
            trace_log!("locked node {} (safe: {})", child.id(), safe);
            path.push(child, safe);
        }
    }

    fn leaf_of<'p>(path: &'p mut TraversePath<'_, K, V>) -> Result<&'p mut LeafNode<K, V>> {
        path.last_mut()
            .ok_or_else(|| Error::invariant("traverse path is empty"))?
            .leaf_mut()
    }

    /// Split full leaf(and its full ancestors) and insert new KV.
    fn split_and_insert(&self, path: &mut TraversePath<'_, K, V>, key: K, value: V) -> Result<()> {
        let holds_root = path.holds_root();
        let (anchor, nodes) = path.split_mut();
        let SpareNodes { leaf, inner, root } = self.reserve_split(nodes, holds_root)?;
        let mut spare_inner = inner.into_iter();
        let mut spare_root = root;
        let leaf_pos = nodes.len() - 1;

        let mut sibling = leaf;
        let separator = nodes[leaf_pos].split_leaf_into(&mut sibling)?;
        if key < separator {
            nodes[leaf_pos].leaf_mut()?.push(key, value);
        } else {
            sibling.leaf_mut()?.push(key, value);
        }
        debug_log!(
            "leaf {} split at {:?}, new sibling {}",
            nodes[leaf_pos].id(),
            separator,
            sibling.id()
        );

        let mut carry = (separator, sibling);
        for pos in (0..leaf_pos).rev() {
            let (upper, lower) = nodes.split_at_mut(pos + 1);
            let parent = &mut upper[pos];
            let (separator, mut node) = carry;
            node.set_parent(Some(parent.id()));
            parent.insert_child(separator, Child::new(node))?;
            if !parent.is_full() {
                self.budget.release(spare_inner.len() + spare_root.is_some() as usize);
                return Ok(());
            }

            let mut sibling = spare_inner
                .next()
                .ok_or_else(|| Error::invariant("no spare node for inner split"))?;
            let median = parent.split_inner_into(&mut sibling)?;
            Self::adopt(sibling.inner()?.children(), sibling.id(), lower.first_mut());
            debug_log!(
                "inner node {} split at {:?}, new sibling {}",
                parent.id(),
                median,
                sibling.id()
            );
            carry = (median, sibling);
        }

        // every retained node was split, so nodes[0] is the root
        let anchor = anchor.ok_or_else(|| Error::invariant("split reached unlocked root"))?;
        let mut new_root = spare_root
            .take()
            .ok_or_else(|| Error::invariant("no spare node for new root"))?;
        let (separator, mut sibling) = carry;
        let old_root = &mut nodes[0];
        old_root.set_parent(Some(new_root.id()));
        sibling.set_parent(Some(new_root.id()));
        let inner = new_root.inner_mut()?;
        inner.push(
            old_root.lower_bound(),
            Child::from_ref(old_root.id(), Arc::clone(anchor)),
        );
        inner.push(separator, Child::new(sibling));
        debug_log!(
            "root {} split, new root {} at level {}",
            old_root.id(),
            new_root.id(),
            new_root.level()
        );
        *anchor = Arc::new(RwLock::new(new_root));
        Ok(())
    }

    /// Reserve and allocate every node required to split the last node of path.
    fn reserve_split(&self, nodes: &[WriteGuard<K, V>], holds_root: bool) -> Result<SpareNodes<K, V>> {
        let ancestors = match nodes.split_last() {
            Some((_, ancestors)) if !ancestors.is_empty() => ancestors,
            _ => return Err(Error::invariant("full leaf locked without its parent")),
        };
        let inner_splits = ancestors
            .iter()
            .rev()
            .take_while(|node| !node.is_insert_safe())
            .count();
        let root_split = inner_splits == ancestors.len();
        if root_split && !holds_root {
            return Err(Error::invariant(format!(
                "split reached node {} which was considered safe",
                ancestors[0].id()
            )));
        }

        let requested = 1 + inner_splits + root_split as usize;
        self.budget.reserve(requested).map_err(|err| {
            warn_log!("split rejected: {}", err);
            err
        })?;

        self.allocate_spare(ancestors, inner_splits, root_split)
            .map_err(|_| {
                self.budget.release(requested);
                let err = Error::ResourceExhausted {
                    requested,
                    live: self.budget.live(),
                    limit: None,
                };
                warn_log!("split rejected: {}", err);
                err
            })
    }

    fn allocate_spare(
        &self,
        ancestors: &[WriteGuard<K, V>],
        inner_splits: usize,
        root_split: bool,
    ) -> std::result::Result<SpareNodes<K, V>, TryReserveError> {
        let fanout = self.config.inner_fanout as usize;
        let leaf = Node::try_new_leaf(
            self.ids.next_id(),
            self.min_key,
            self.config.leaf_capacity as usize,
        )?;
        let mut inner = Vec::new();
        inner.try_reserve_exact(inner_splits)?;
        for node in ancestors.iter().rev().take(inner_splits) {
            inner.push(Node::try_new_inner(
                self.ids.next_id(),
                node.level(),
                node.lower_bound(),
                fanout,
            )?);
        }
        let root = match ancestors.first() {
            Some(old_root) if root_split => Some(Node::try_new_inner(
                self.ids.next_id(),
                old_root.level() + 1,
                old_root.lower_bound(),
                fanout,
            )?),
            _ => None,
        };
        Ok(SpareNodes { leaf, inner, root })
    }

    /// Fix underflow of the last node of path, cascading up while parents underflow.
    fn rebalance(&self, path: &mut TraversePath<'_, K, V>) -> Result<()> {
        let (anchor, nodes) = path.split_mut();
        let mut pos = nodes.len() - 1;
        while pos > 0 && nodes[pos].is_few() {
            let (upper, lower) = nodes.split_at_mut(pos);
            let parent = &mut upper[pos - 1];
            let (node, below) = lower
                .split_first_mut()
                .ok_or_else(|| Error::invariant("underflowed node is not locked"))?;
            match self.rebalance_node(parent, node, below.first_mut())? {
                Rebalance::Merged(survivor) => {
                    // keep path a chain of parent-child guards for root collapse
                    if let Some(survivor) = survivor {
                        *node = survivor;
                    }
                    pos -= 1;
                }
                Rebalance::Redistributed | Rebalance::NoSibling => break,
            }
        }

        if let Some(anchor) = anchor {
            self.collapse_root(anchor, nodes)?;
        }
        Ok(())
    }

    /// Merge underflowed node with its sibling or move part of sibling entries into it.
    /// `held` is the locked child of node(if any), which may be moved to another parent.
    fn rebalance_node(
        &self,
        parent: &mut WriteGuard<K, V>,
        node: &mut WriteGuard<K, V>,
        held: Option<&mut WriteGuard<K, V>>,
    ) -> Result<Rebalance<K, V>> {
        let idx = parent.inner()?.position_of(node.id()).ok_or_else(|| {
            Error::invariant(format!("node {} is not a child of {}", node.id(), parent.id()))
        })?;
        if parent.len() < 2 {
            return Ok(Rebalance::NoSibling);
        }

        let sibling_idx = if idx > 0 { idx - 1 } else { idx + 1 };
        let mut sibling = parent.inner()?.child(sibling_idx).node.write_arc();
        let count = std::cmp::max(sibling.len().saturating_sub(node.len()) / 2, 1);

        if sibling_idx < idx {
            if sibling.can_merge_with(node) {
                let moved = sibling.absorb(node)?;
                Self::adopt_moved(&sibling, moved, held)?;
                self.retire(parent, idx)?;
                debug_log!("node {} merged into left sibling {}", node.id(), sibling.id());
                Ok(Rebalance::Merged(Some(sibling)))
            } else {
                let (separator, moved) = node.borrow_from_left(&mut sibling, count)?;
                parent.inner_mut()?.set_key(idx, separator);
                Self::adopt_moved(node, moved, None)?;
                debug_log!(
                    "node {} took {} entries from left sibling {}",
                    node.id(),
                    count,
                    sibling.id()
                );
                Ok(Rebalance::Redistributed)
            }
        } else if node.can_merge_with(&sibling) {
            let moved = node.absorb(&mut sibling)?;
            Self::adopt_moved(node, moved, None)?;
            self.retire(parent, sibling_idx)?;
            debug_log!("right sibling {} merged into {}", sibling.id(), node.id());
            Ok(Rebalance::Merged(None))
        } else {
            let (separator, moved) = node.borrow_from_right(&mut sibling, count)?;
            parent.inner_mut()?.set_key(sibling_idx, separator);
            Self::adopt_moved(node, moved, None)?;
            debug_log!(
                "node {} took {} entries from right sibling {}",
                node.id(),
                count,
                sibling.id()
            );
            Ok(Rebalance::Redistributed)
        }
    }

    /// Unlink merged node from parent.
    fn retire(&self, parent: &mut Node<K, V>, index: usize) -> Result<()> {
        let (_, child) = parent.inner_mut()?.remove_at(index);
        trace_log!("node {} retired", child.id);
        drop(child);
        self.budget.release(1);
        Ok(())
    }

    /// Replace root which has single inner child by that child.
    fn collapse_root(&self, anchor: &mut NodeRef<K, V>, nodes: &mut [WriteGuard<K, V>]) -> Result<()> {
        let mut pos = 0;
        while pos + 1 < nodes.len() {
            let (upper, lower) = nodes.split_at_mut(pos + 1);
            let root = &mut upper[pos];
            if root.len() != 1 || root.level() <= 1 {
                break;
            }
            let child = &mut lower[0];
            let child_ref = {
                let only = root.inner()?.child(0);
                if only.id != child.id() {
                    return Err(Error::invariant(format!(
                        "root {} links {}, but path continues to {}",
                        root.id(),
                        only.id,
                        child.id()
                    )));
                }
                Arc::clone(&only.node)
            };
            child.set_parent(None);
            *anchor = child_ref;
            root.inner_mut()?.take_children();
            self.budget.release(1);
            debug_log!("root {} collapsed, new root {}", root.id(), child.id());
            pos += 1;
        }
        Ok(())
    }

    fn adopt_moved(
        node: &Node<K, V>,
        moved: Range<usize>,
        held: Option<&mut WriteGuard<K, V>>,
    ) -> Result<()> {
        if moved.is_empty() {
            return Ok(());
        }
        let children = &node.inner()?.children()[moved];
        Self::adopt(children, node.id(), held);
        Ok(())
    }

    /// Point parent links of moved children to their new parent. Child which is already
    /// locked by current operation is updated through its guard.
    fn adopt(children: &[Child<K, V>], parent: NodeId, mut held: Option<&mut WriteGuard<K, V>>) {
        for child in children {
            match held.as_mut() {
                Some(node) if node.id() == child.id => node.set_parent(Some(parent)),
                _ => child.node.write().set_parent(Some(parent)),
            }
        }
    }
}
