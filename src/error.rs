use std::fmt::{Display, Formatter};

/// Errors returned by tree operations.
///
/// A missing key is never an error: lookups and deletes report it as `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// New nodes required by a split could not be allocated.
    /// The tree is left exactly as it was before the failed insert.
    ResourceExhausted {
        /// Nodes the operation needed.
        requested: usize,
        /// Nodes alive when the reservation was attempted.
        live: usize,
        /// Configured node budget, `None` when the allocator itself failed.
        limit: Option<usize>,
    },
    /// Structural corruption was detected (broken key ordering, predecessor search without
    /// candidate, occupancy out of sync with slot arrays...). The operation was aborted
    /// because continuing could spread the damage.
    InvariantViolation(String),
    /// Inserted key is smaller than the minimum key the tree was created with.
    KeyBelowMinimum,
}

impl Error {
    #[inline]
    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        Error::InvariantViolation(msg.into())
    }

    /// Returns `true` for errors which signal a corrupted tree.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::InvariantViolation(_))
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ResourceExhausted {
                requested,
                live,
                limit: Some(limit),
            } => write!(
                f,
                "cannot allocate {} node(s): {} of {} nodes in use",
                requested, live, limit
            ),
            Error::ResourceExhausted {
                requested, live, ..
            } => write!(
                f,
                "cannot allocate {} node(s), allocator failed ({} nodes in use)",
                requested, live
            ),
            Error::InvariantViolation(msg) => write!(f, "tree invariant violated: {}", msg),
            Error::KeyBelowMinimum => write!(f, "key is below the minimum key of the tree"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
