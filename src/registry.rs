//! Identity-deduplicated collaborator sets.

use smallvec::SmallVec;
use std::rc::Rc;

/// Set of shared collaborator handles, deduplicated by identity
///
/// Two handles are the same member when they point at the same allocation,
/// so registering one `Rc` twice keeps a single entry. Iteration follows
/// insertion order, but callers must not rely on it.
pub struct ListenerSet<T: ?Sized> {
    members: SmallVec<[Rc<T>; 4]>,
}

impl<T: ?Sized> ListenerSet<T> {
    /// Create an empty set
    pub fn new() -> Self {
        ListenerSet {
            members: SmallVec::new(),
        }
    }

    /// Add `member`; returns `false` if it was already present
    pub fn insert(&mut self, member: Rc<T>) -> bool {
        if self.contains(&member) {
            return false;
        }
        self.members.push(member);
        true
    }

    /// Whether `member` is present
    pub fn contains(&self, member: &Rc<T>) -> bool {
        let target = Rc::as_ptr(member).cast::<()>();
        self.members
            .iter()
            .any(|m| Rc::as_ptr(m).cast::<()>() == target)
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Clone the member handles for iteration outside any borrow
    pub fn snapshot(&self) -> Vec<Rc<T>> {
        self.members.iter().cloned().collect()
    }
}

impl<T: ?Sized> Default for ListenerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> std::fmt::Debug for ListenerSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.members.len())
            .finish()
    }
}
