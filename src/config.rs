/// Default number of children an inner node can hold.
pub const DEFAULT_INNER_FANOUT: u16 = 64;
/// Default number of key-value pairs a leaf can hold.
pub const DEFAULT_LEAF_CAPACITY: u16 = 256;

/// Node sizing and resource limits of a tree.
///
/// Inner fanout and leaf capacity are independent: leaves are scanned linearly with SIMD and
/// usually profit from being larger than inner nodes, which are binary searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    /// Max count of children in inner node. Inner node which reaches this size is split.
    pub inner_fanout: u16,
    /// Max count of KVs in leaf node.
    pub leaf_capacity: u16,
    /// Upper bound on live nodes(inner and leaf). Inserts which need more nodes fail with
    /// [`crate::Error::ResourceExhausted`].
    pub max_nodes: Option<usize>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            inner_fanout: DEFAULT_INNER_FANOUT,
            leaf_capacity: DEFAULT_LEAF_CAPACITY,
            max_nodes: None,
        }
    }
}

impl TreeConfig {
    pub fn with_inner_fanout(mut self, fanout: u16) -> Self {
        self.inner_fanout = fanout;
        self
    }

    pub fn with_leaf_capacity(mut self, capacity: u16) -> Self {
        self.leaf_capacity = capacity;
        self
    }

    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = Some(max_nodes);
        self
    }

    /// Panics if the config can't describe a working tree.
    pub(crate) fn assert_valid(&self) {
        // a split inner node must leave at least 1 child on each side and
        // the median promotion must not immediately overflow the new root
        assert!(
            self.inner_fanout >= 3,
            "Inner fanout should be >= 3, got {}",
            self.inner_fanout
        );
        assert!(
            self.leaf_capacity >= 2,
            "Leaf capacity should be >= 2, got {}",
            self.leaf_capacity
        );
        if let Some(max_nodes) = self.max_nodes {
            // root and first leaf are created with the tree
            assert!(max_nodes >= 2, "Node limit should be >= 2, got {}", max_nodes);
        }
    }
}
