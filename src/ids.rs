use crate::error::{Error, Result};
use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Identifier of tree node. Unique among all nodes created by the same [`NodeIds`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(u64);

impl NodeId {
    #[inline(always)]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic node id sequence.
///
/// Each tree owns one by default. Clones share the same counter, so several trees can draw
/// ids from one process-wide sequence by passing clones of a single `NodeIds`.
#[derive(Clone, Default)]
pub struct NodeIds {
    next: Arc<AtomicU64>,
}

impl NodeIds {
    pub fn new() -> NodeIds {
        Self::default()
    }

    /// Allocate next id.
    #[inline]
    pub fn next_id(&self) -> NodeId {
        NodeId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Count of ids handed out so far.
    pub fn allocated(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Debug for NodeIds {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeIds")
            .field("allocated", &self.allocated())
            .finish()
    }
}

/// Count of live nodes with optional upper limit.
pub(crate) struct NodeBudget {
    live: AtomicUsize,
    limit: Option<usize>,
}

impl NodeBudget {
    pub fn new(live: usize, limit: Option<usize>) -> NodeBudget {
        NodeBudget {
            live: AtomicUsize::new(live),
            limit,
        }
    }

    /// Reserve `count` nodes or fail without changing the budget.
    pub fn reserve(&self, count: usize) -> Result<()> {
        let limit = match self.limit {
            Some(limit) => limit,
            None => {
                self.live.fetch_add(count, Ordering::AcqRel);
                return Ok(());
            }
        };

        let mut live = self.live.load(Ordering::Acquire);
        loop {
            if live + count > limit {
                return Err(Error::ResourceExhausted {
                    requested: count,
                    live,
                    limit: Some(limit),
                });
            }
            match self.live.compare_exchange_weak(
                live,
                live + count,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => live = actual,
            }
        }
    }

    /// Return nodes to budget(retired by merge or unused reservation).
    pub fn release(&self, count: usize) {
        let prev = self.live.fetch_sub(count, Ordering::AcqRel);
        debug_assert!(prev >= count, "Released more nodes than reserved");
    }

    #[inline]
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}
