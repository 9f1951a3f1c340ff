use crate::node::{NodeRef, WriteGuard};
use crate::scanner::LaneKey;
use parking_lot::{RwLock, RwLockWriteGuard};

/// Exclusive locks retained by a writer on its way from root to leaf.
///
/// `nodes` always form a contiguous chain: `nodes[i + 1]` is a child of `nodes[i]` and the
/// last element is the node visited most recently. When anchor guard is present,
/// `nodes[0]` is the current root. Locks are released top-down: anchor first, then nodes in
/// the order they were acquired.
pub(crate) struct TraversePath<'a, K, V> {
    anchor: Option<RwLockWriteGuard<'a, NodeRef<K, V>>>,
    nodes: Vec<WriteGuard<K, V>>,
}

impl<'a, K: LaneKey, V> TraversePath<'a, K, V> {
    /// Lock anchor and root exclusively. Anchor is released immediately if root is safe
    /// for the operation.
    pub fn lock_root(
        anchor: &'a RwLock<NodeRef<K, V>>,
        is_safe: impl Fn(&WriteGuard<K, V>) -> bool,
    ) -> Self {
        let anchor = anchor.write();
        let root = anchor.write_arc();
        let mut path = TraversePath {
            anchor: Some(anchor),
            nodes: Vec::with_capacity(8),
        };
        let root_safe = is_safe(&root);
        path.nodes.push(root);
        if root_safe {
            path.anchor = None;
        }
        path
    }

    /// Add locked child of the last node. Safe child makes all locks above it useless.
    pub fn push(&mut self, node: WriteGuard<K, V>, is_safe: bool) {
        if is_safe {
            self.release_ancestors();
        }
        self.nodes.push(node);
    }

    /// Release anchor and every retained node.
    fn release_ancestors(&mut self) {
        self.anchor = None;
        // Vec drops elements front to back, i.e. top-down
        self.nodes.clear();
    }

    #[inline]
    pub fn holds_root(&self) -> bool {
        self.anchor.is_some()
    }

    #[cfg(test)]
    pub fn nodes(&self) -> &[WriteGuard<K, V>] {
        &self.nodes
    }

    #[inline]
    pub fn last(&self) -> Option<&WriteGuard<K, V>> {
        self.nodes.last()
    }

    #[inline]
    pub fn last_mut(&mut self) -> Option<&mut WriteGuard<K, V>> {
        self.nodes.last_mut()
    }

    /// Split borrow of anchor and retained nodes.
    #[inline]
    pub fn split_mut(&mut self) -> (Option<&mut NodeRef<K, V>>, &mut [WriteGuard<K, V>]) {
        (self.anchor.as_mut().map(|guard| &mut **guard), &mut self.nodes)
    }
}
