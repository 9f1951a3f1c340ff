pub(crate) mod search;

use crate::error::{Error, Result};
use crate::ids::NodeId;
use crate::scanner::LaneKey;
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};
use std::collections::TryReserveError;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Range;
use std::sync::Arc;

/// Shared handle of tree node. The lock covers node's own slots only, never its subtree.
pub(crate) type NodeRef<K, V> = Arc<RwLock<Node<K, V>>>;
/// Owned shared lock on node which can outlive the guard of node's parent.
pub(crate) type ReadGuard<K, V> = ArcRwLockReadGuard<RawRwLock, Node<K, V>>;
/// Owned exclusive lock on node which can outlive the guard of node's parent.
pub(crate) type WriteGuard<K, V> = ArcRwLockWriteGuard<RawRwLock, Node<K, V>>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Inner,
    Leaf,
}

/// Tree node: common header plus inner or leaf slots.
pub(crate) struct Node<K, V> {
    id: NodeId,
    /// Distance from leaf level, leaves have level 0.
    level: u16,
    /// All keys of node's subtree are `>=` this key. Equal to separator stored in parent.
    lower_bound: K,
    /// Non-owning link used by diagnostics and invariant checks.
    parent: Option<NodeId>,
    body: NodeBody<K, V>,
}

pub(crate) enum NodeBody<K, V> {
    Inner(InnerNode<K, V>),
    Leaf(LeafNode<K, V>),
}

/// Link to child node. Child id is duplicated here to identify child without locking it.
pub(crate) struct Child<K, V> {
    pub id: NodeId,
    pub node: NodeRef<K, V>,
}

impl<K, V> Child<K, V> {
    pub fn new(node: Node<K, V>) -> Self {
        Child {
            id: node.id,
            node: Arc::new(RwLock::new(node)),
        }
    }

    pub fn from_ref(id: NodeId, node: NodeRef<K, V>) -> Self {
        Child { id, node }
    }
}

/// Sorted (key, child) pairs. Key `i` is inclusive lower bound of child `i` subtree.
pub(crate) struct InnerNode<K, V> {
    keys: Vec<K>,
    children: Vec<Child<K, V>>,
    fanout: usize,
}

/// Unordered set of KVs. Keys and values are kept in separate arrays to let scanner load
/// keys into vector registers directly.
pub(crate) struct LeafNode<K, V> {
    keys: Vec<K>,
    values: Vec<V>,
    capacity: usize,
}

impl<K: LaneKey, V> Node<K, V> {
    pub fn new_leaf(id: NodeId, lower_bound: K, parent: Option<NodeId>, capacity: usize) -> Self {
        Node {
            id,
            level: 0,
            lower_bound,
            parent,
            body: NodeBody::Leaf(LeafNode::with_capacity(capacity)),
        }
    }

    pub fn new_inner(
        id: NodeId,
        level: u16,
        lower_bound: K,
        parent: Option<NodeId>,
        fanout: usize,
    ) -> Self {
        debug_assert!(level > 0, "Inner node can't be placed on leaf level");
        Node {
            id,
            level,
            lower_bound,
            parent,
            body: NodeBody::Inner(InnerNode::with_capacity(fanout)),
        }
    }

    /// Inner node without parent which has single child.
    pub fn new_root(
        id: NodeId,
        level: u16,
        lower_bound: K,
        first: Child<K, V>,
        fanout: usize,
    ) -> Self {
        let mut root = Self::new_inner(id, level, lower_bound, None, fanout);
        if let NodeBody::Inner(inner) = &mut root.body {
            inner.push(lower_bound, first);
        }
        root
    }

    /// Same as [`Node::new_leaf`], but reports allocation failure instead of aborting.
    pub fn try_new_leaf(
        id: NodeId,
        lower_bound: K,
        capacity: usize,
    ) -> std::result::Result<Self, TryReserveError> {
        Ok(Node {
            id,
            level: 0,
            lower_bound,
            parent: None,
            body: NodeBody::Leaf(LeafNode::try_with_capacity(capacity)?),
        })
    }

    /// Same as [`Node::new_inner`], but reports allocation failure instead of aborting.
    pub fn try_new_inner(
        id: NodeId,
        level: u16,
        lower_bound: K,
        fanout: usize,
    ) -> std::result::Result<Self, TryReserveError> {
        Ok(Node {
            id,
            level,
            lower_bound,
            parent: None,
            body: NodeBody::Inner(InnerNode::try_with_capacity(fanout)?),
        })
    }

    #[inline(always)]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline(always)]
    pub fn level(&self) -> u16 {
        self.level
    }

    #[inline(always)]
    pub fn lower_bound(&self) -> K {
        self.lower_bound
    }

    #[inline(always)]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[inline(always)]
    pub fn set_parent(&mut self, parent: Option<NodeId>) {
        self.parent = parent;
    }

    #[inline(always)]
    pub fn kind(&self) -> NodeKind {
        match self.body {
            NodeBody::Inner(_) => NodeKind::Inner,
            NodeBody::Leaf(_) => NodeKind::Leaf,
        }
    }

    #[inline(always)]
    pub fn body(&self) -> &NodeBody<K, V> {
        &self.body
    }

    #[inline]
    pub fn len(&self) -> usize {
        match &self.body {
            NodeBody::Inner(inner) => inner.len(),
            NodeBody::Leaf(leaf) => leaf.len(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        match &self.body {
            NodeBody::Inner(inner) => inner.fanout,
            NodeBody::Leaf(leaf) => leaf.capacity,
        }
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Node is underutilized and should be merged with or refilled from its sibling.
    #[inline]
    pub fn is_few(&self) -> bool {
        let len = self.len();
        len < self.capacity() / 4 || len == 0
    }

    /// Smallest occupancy which is not [`Node::is_few`].
    #[inline]
    fn min_occupancy(&self) -> usize {
        std::cmp::max(self.capacity() / 4, 1)
    }

    /// Node can't overflow even if one more entry will be added into it. Inner node splits
    /// as soon as it becomes full, so it must stay at least 2 slots below capacity.
    #[inline]
    pub fn is_insert_safe(&self) -> bool {
        match &self.body {
            NodeBody::Inner(inner) => inner.len() + 1 < inner.fanout,
            NodeBody::Leaf(leaf) => leaf.len() < leaf.capacity,
        }
    }

    /// Node can't start rebalancing cascade even if one entry will be removed from it.
    /// Root is special: it never underflows, but collapses when left with single inner child.
    #[inline]
    pub fn is_delete_safe(&self, is_root: bool) -> bool {
        if is_root {
            self.level == 1 || self.len() > 2
        } else {
            self.len() > self.min_occupancy()
        }
    }

    /// Sibling nodes can be merged into one node which is not overflowed.
    pub fn can_merge_with(&self, other: &Self) -> bool {
        let total = self.len() + other.len();
        match &self.body {
            // merged inner node must not be full, otherwise it had to be split immediately
            NodeBody::Inner(inner) => total < inner.fanout,
            NodeBody::Leaf(leaf) => total <= leaf.capacity,
        }
    }

    pub fn inner(&self) -> Result<&InnerNode<K, V>> {
        match &self.body {
            NodeBody::Inner(inner) => Ok(inner),
            NodeBody::Leaf(_) => Err(kind_mismatch(self.id, NodeKind::Leaf, NodeKind::Inner)),
        }
    }

    pub fn inner_mut(&mut self) -> Result<&mut InnerNode<K, V>> {
        let id = self.id;
        match &mut self.body {
            NodeBody::Inner(inner) => Ok(inner),
            NodeBody::Leaf(_) => Err(kind_mismatch(id, NodeKind::Leaf, NodeKind::Inner)),
        }
    }

    pub fn leaf_mut(&mut self) -> Result<&mut LeafNode<K, V>> {
        let id = self.id;
        match &mut self.body {
            NodeBody::Leaf(leaf) => Ok(leaf),
            NodeBody::Inner(_) => Err(kind_mismatch(id, NodeKind::Inner, NodeKind::Leaf)),
        }
    }

    /// Find index of child which subtree can contain passed key.
    pub fn route(&self, key: &K) -> Result<usize> {
        let inner = self.inner()?;
        let idx = inner.predecessor(key).ok_or_else(|| {
            Error::invariant(format!(
                "no predecessor of {:?} in inner node {} (len={}, first key={:?})",
                key,
                self.id,
                inner.len(),
                inner.keys.first()
            ))
        })?;
        if !search::brackets(&inner.keys, idx, key) {
            return Err(Error::invariant(format!(
                "keys of inner node {} are not strictly increasing around slot {}",
                self.id, idx
            )));
        }
        Ok(idx)
    }

    /// Insert separator pointing to new child using sorted-insert.
    pub fn insert_child(&mut self, key: K, child: Child<K, V>) -> Result<usize> {
        let id = self.id;
        self.inner_mut()?.insert_sorted(key, child).ok_or_else(|| {
            Error::invariant(format!(
                "separator {:?} can't be placed into inner node {}",
                key, id
            ))
        })
    }

    /// Move upper half of full leaf into empty `right` leaf.
    /// Returns separator: the smallest key of the upper half.
    pub fn split_leaf_into(&mut self, right: &mut Node<K, V>) -> Result<K> {
        let parent = self.parent;
        let separator = {
            let dst = right.leaf_mut()?;
            self.leaf_mut()?.split_into(dst)
        };
        right.lower_bound = separator;
        right.parent = parent;
        Ok(separator)
    }

    /// Move median entry and everything above it into empty `right` inner node.
    /// Returns median key which should be promoted into parent.
    pub fn split_inner_into(&mut self, right: &mut Node<K, V>) -> Result<K> {
        let parent = self.parent;
        let median = {
            let dst = right.inner_mut()?;
            self.inner_mut()?.split_into(dst)
        };
        right.lower_bound = median;
        right.parent = parent;
        Ok(median)
    }

    /// Move all entries of right sibling into this node.
    /// Returns slots of this node which received children of the right sibling.
    pub fn absorb(&mut self, right: &mut Node<K, V>) -> Result<Range<usize>> {
        let (id, kind, right_kind) = (self.id, self.kind(), right.kind());
        match (&mut self.body, &mut right.body) {
            (NodeBody::Leaf(leaf), NodeBody::Leaf(other)) => {
                leaf.append(other);
                Ok(0..0)
            }
            (NodeBody::Inner(inner), NodeBody::Inner(other)) => Ok(inner.append(other)),
            _ => Err(kind_mismatch(id, kind, right_kind)),
        }
    }

    /// Move `count` smallest entries of right sibling into this node.
    /// Returns new lower bound of right sibling and slots of this node which got children.
    pub fn borrow_from_right(
        &mut self,
        right: &mut Node<K, V>,
        count: usize,
    ) -> Result<(K, Range<usize>)> {
        let (id, kind, right_kind) = (self.id, self.kind(), right.kind());
        let (separator, moved) = match (&mut self.body, &mut right.body) {
            (NodeBody::Leaf(leaf), NodeBody::Leaf(other)) => (other.give_lowest(leaf, count), 0..0),
            (NodeBody::Inner(inner), NodeBody::Inner(other)) => other.give_front(inner, count),
            _ => return Err(kind_mismatch(id, kind, right_kind)),
        };
        right.lower_bound = separator;
        Ok((separator, moved))
    }

    /// Move `count` largest entries of left sibling into this node.
    /// Returns new lower bound of this node and slots of this node which got children.
    pub fn borrow_from_left(
        &mut self,
        left: &mut Node<K, V>,
        count: usize,
    ) -> Result<(K, Range<usize>)> {
        let (id, kind, left_kind) = (self.id, self.kind(), left.kind());
        let (separator, moved) = match (&mut self.body, &mut left.body) {
            (NodeBody::Leaf(leaf), NodeBody::Leaf(other)) => (other.give_highest(leaf, count), 0..0),
            (NodeBody::Inner(inner), NodeBody::Inner(other)) => other.give_back(inner, count),
            _ => return Err(kind_mismatch(id, kind, left_kind)),
        };
        self.lower_bound = separator;
        Ok((separator, moved))
    }
}

fn kind_mismatch(id: NodeId, actual: NodeKind, expected: NodeKind) -> Error {
    Error::invariant(format!(
        "node {} is {:?}, expected {:?}",
        id, actual, expected
    ))
}

impl<K: LaneKey, V> InnerNode<K, V> {
    fn with_capacity(fanout: usize) -> Self {
        InnerNode {
            keys: Vec::with_capacity(fanout),
            children: Vec::with_capacity(fanout),
            fanout,
        }
    }

    fn try_with_capacity(fanout: usize) -> std::result::Result<Self, TryReserveError> {
        let mut keys = Vec::new();
        keys.try_reserve_exact(fanout)?;
        let mut children = Vec::new();
        children.try_reserve_exact(fanout)?;
        Ok(InnerNode {
            keys,
            children,
            fanout,
        })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline(always)]
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    #[inline(always)]
    pub fn children(&self) -> &[Child<K, V>] {
        &self.children
    }

    #[inline(always)]
    pub fn child(&self, index: usize) -> &Child<K, V> {
        &self.children[index]
    }

    #[inline]
    pub fn predecessor(&self, key: &K) -> Option<usize> {
        search::predecessor(&self.keys, key)
    }

    pub fn position_of(&self, id: NodeId) -> Option<usize> {
        self.children.iter().position(|child| child.id == id)
    }

    #[inline]
    pub fn set_key(&mut self, index: usize, key: K) {
        self.keys[index] = key;
    }

    /// Append entry which key is greater than any other key in node.
    pub fn push(&mut self, key: K, child: Child<K, V>) {
        debug_assert!(self.keys.last().map_or(true, |last| *last < key));
        self.keys.push(key);
        self.children.push(child);
    }

    /// Place new entry right after its predecessor, shifting greater entries to the right.
    /// Returns `None` if node has no predecessor for key or already contains it.
    pub fn insert_sorted(&mut self, key: K, child: Child<K, V>) -> Option<usize> {
        let idx = self.predecessor(&key)?;
        if self.keys[idx] == key {
            return None;
        }
        debug_assert!(self.keys.len() < self.fanout, "Inner node overflow");
        self.keys.insert(idx + 1, key);
        self.children.insert(idx + 1, child);
        Some(idx + 1)
    }

    /// Remove entry, shifting greater entries to the left.
    pub fn remove_at(&mut self, index: usize) -> (K, Child<K, V>) {
        (self.keys.remove(index), self.children.remove(index))
    }

    /// Detach all children(used when node is retired).
    pub fn take_children(&mut self) -> Vec<Child<K, V>> {
        self.keys.clear();
        std::mem::take(&mut self.children)
    }

    fn split_into(&mut self, right: &mut InnerNode<K, V>) -> K {
        debug_assert!(right.keys.is_empty());
        let mid = self.keys.len() / 2;
        right.keys.extend(self.keys.drain(mid..));
        right.children.extend(self.children.drain(mid..));
        right.keys[0]
    }

    fn append(&mut self, other: &mut InnerNode<K, V>) -> Range<usize> {
        let start = self.children.len();
        self.keys.append(&mut other.keys);
        self.children.append(&mut other.children);
        start..self.children.len()
    }

    /// Move first `count` entries to the end of `dst`(left sibling).
    fn give_front(&mut self, dst: &mut InnerNode<K, V>, count: usize) -> (K, Range<usize>) {
        debug_assert!(count < self.keys.len());
        let start = dst.children.len();
        dst.keys.extend(self.keys.drain(..count));
        dst.children.extend(self.children.drain(..count));
        (self.keys[0], start..dst.children.len())
    }

    /// Move last `count` entries to the front of `dst`(right sibling).
    fn give_back(&mut self, dst: &mut InnerNode<K, V>, count: usize) -> (K, Range<usize>) {
        debug_assert!(count < self.keys.len());
        let at = self.keys.len() - count;
        let keys: Vec<K> = self.keys.drain(at..).collect();
        let children: Vec<Child<K, V>> = self.children.drain(at..).collect();
        dst.keys.splice(0..0, keys);
        dst.children.splice(0..0, children);
        (dst.keys[0], 0..count)
    }
}

impl<K: LaneKey, V> LeafNode<K, V> {
    fn with_capacity(capacity: usize) -> Self {
        LeafNode {
            keys: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            capacity,
        }
    }

    fn try_with_capacity(capacity: usize) -> std::result::Result<Self, TryReserveError> {
        let mut keys = Vec::new();
        keys.try_reserve_exact(capacity)?;
        let mut values = Vec::new();
        values.try_reserve_exact(capacity)?;
        Ok(LeafNode {
            keys,
            values,
            capacity,
        })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.keys.len() >= self.capacity
    }

    #[inline(always)]
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    #[inline(always)]
    pub fn values(&self) -> &[V] {
        &self.values
    }

    #[inline]
    pub fn find(&self, key: &K) -> Option<usize> {
        K::find_exact(&self.keys, *key)
    }

    #[inline]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.find(key).map(|idx| &self.values[idx])
    }

    /// Append KV into free slot. Order of slots is not important because
    /// leaf is always scanned for exact match.
    #[inline]
    pub fn push(&mut self, key: K, value: V) {
        debug_assert!(!self.is_full(), "Leaf overflow");
        self.keys.push(key);
        self.values.push(value);
    }

    #[inline]
    pub fn replace(&mut self, index: usize, value: V) -> V {
        std::mem::replace(&mut self.values[index], value)
    }

    /// Remove KV by moving last slot in place of removed one.
    #[inline]
    pub fn remove(&mut self, index: usize) -> (K, V) {
        (self.keys.swap_remove(index), self.values.swap_remove(index))
    }

    /// Key which would be at position `n` if leaf was sorted.
    fn nth_key(&self, n: usize) -> K {
        let mut keys = self.keys.clone();
        *keys.select_nth_unstable(n).1
    }

    fn move_matching(&mut self, dst: &mut LeafNode<K, V>, pred: impl Fn(&K) -> bool) {
        let mut i = 0;
        while i < self.keys.len() {
            if pred(&self.keys[i]) {
                let (key, value) = self.remove(i);
                dst.push(key, value);
            } else {
                i += 1;
            }
        }
    }

    fn split_into(&mut self, right: &mut LeafNode<K, V>) -> K {
        debug_assert!(right.keys.is_empty() && self.keys.len() > 1);
        let separator = self.nth_key(self.keys.len() / 2);
        self.move_matching(right, |key| *key >= separator);
        separator
    }

    fn append(&mut self, other: &mut LeafNode<K, V>) {
        self.keys.append(&mut other.keys);
        self.values.append(&mut other.values);
    }

    /// Move `count` smallest KVs into `dst`. Returns smallest key left in this leaf.
    fn give_lowest(&mut self, dst: &mut LeafNode<K, V>, count: usize) -> K {
        debug_assert!(count < self.keys.len());
        let pivot = self.nth_key(count);
        self.move_matching(dst, |key| *key < pivot);
        pivot
    }

    /// Move `count` largest KVs into `dst`. Returns smallest moved key.
    fn give_highest(&mut self, dst: &mut LeafNode<K, V>, count: usize) -> K {
        debug_assert!(count > 0 && count < self.keys.len());
        let pivot = self.nth_key(self.keys.len() - count);
        self.move_matching(dst, |key| *key >= pivot);
        pivot
    }
}

impl<K, V> Display for Node<K, V>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.body {
            NodeBody::Inner(inner) => {
                write!(f, "InnerNode[{} @ {}] ", self.id, self.level)?;
                for (key, child) in inner.keys.iter().zip(inner.children.iter()) {
                    write!(f, " {:?}:{}", key, child.id)?;
                }
            }
            NodeBody::Leaf(leaf) => {
                write!(f, "LeafNode[{} @ {}] ", self.id, self.level)?;
                for (key, value) in leaf.keys.iter().zip(leaf.values.iter()) {
                    write!(f, " {:?}:{:?}", key, value)?;
                }
            }
        }
        Ok(())
    }
}
