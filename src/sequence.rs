use std::sync::{Arc, OnceLock};

/// One link in the persistent chain backing an [`IncrementalSequence`]. `index` is this node's
/// position, used by [`IncrementalSequence::items_since`] to stop walking once it reaches
/// nodes the caller has already folded over.
struct Node<T> {
    item: T,
    index: usize,
    prev: Option<Arc<Node<T>>>,
}

/// An append-only sequence built from singly linked, `Arc`-shared [`Node`]s rather than a
/// copy-on-grow `Vec`.
///
/// Appending allocates exactly one new node pointing at the previous tail - it never touches,
/// clones, or invalidates the nodes already shared by an existing snapshot, so a clone taken
/// before an append keeps observing its own unchanged chain while the new sequence shares every
/// node up to the append point. This is the "persistent vector with shared tail" described in
/// `DESIGN.md`, built from `Arc` alone rather than a dedicated persistent-vector crate, since
/// none appears anywhere in the reference corpus.
///
/// `as_slice` materialises (and caches) a contiguous view for callers that need one; the chain
/// itself is only ever walked as far as `len` or `items_since` actually require, so repeatedly
/// appending and snapshotting - the timed update stream's main use of this type - stays linear
/// in the number of appends rather than quadratic.
pub struct IncrementalSequence<T> {
    head: Option<Arc<Node<T>>>,
    len: usize,
    materialized: OnceLock<Vec<T>>,
}

impl<T> std::fmt::Debug for IncrementalSequence<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalSequence").field("len", &self.len).finish()
    }
}

impl<T> Clone for IncrementalSequence<T> {
    /// Shares the existing node chain (an `Arc` clone) rather than copying elements; the
    /// materialized-slice cache is not carried over since it is cheap to rebuild lazily and
    /// doing so keeps this impl independent of whether `OnceLock<Vec<T>>` is itself `Clone`.
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
            len: self.len,
            materialized: OnceLock::new(),
        }
    }
}

impl<T> Default for IncrementalSequence<T> {
    fn default() -> Self {
        Self {
            head: None,
            len: 0,
            materialized: OnceLock::new(),
        }
    }
}

impl<T: Clone> IncrementalSequence<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(items: Vec<T>) -> Self {
        items.into_iter().fold(Self::new(), |seq, item| seq.appended(item))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Materializes the full sequence as a contiguous slice, caching the result on first call.
    /// Callers that only need the newest item or the items appended since a marker should
    /// prefer [`Self::last`]/[`Self::items_since`], which never walk the whole chain.
    pub fn as_slice(&self) -> &[T] {
        self.materialized.get_or_init(|| {
            let mut items = Vec::with_capacity(self.len);
            let mut current = self.head.as_ref();
            while let Some(node) = current {
                items.push(node.item.clone());
                current = node.prev.as_ref();
            }
            items.reverse();
            items
        })
    }

    /// The most recently appended item, in O(1) - reads the chain's head node directly rather
    /// than materialising the full sequence.
    pub fn last(&self) -> Option<&T> {
        self.head.as_ref().map(|node| &node.item)
    }

    /// Appends `item`, returning a new sequence in O(1): one new node is allocated, pointing at
    /// the previous tail. `self`'s chain is untouched, so any existing clone keeps observing
    /// its own unchanged tail.
    pub fn appended(&self, item: T) -> Self {
        Self {
            head: Some(Arc::new(Node {
                item,
                index: self.len,
                prev: self.head.clone(),
            })),
            len: self.len + 1,
            materialized: OnceLock::new(),
        }
    }

    pub fn extended(&self, new_items: impl IntoIterator<Item = T>) -> Self {
        new_items.into_iter().fold(self.clone(), |seq, item| seq.appended(item))
    }

    /// A cheap identity for the current tail, used by folds (`crate::eval::Fold`) to detect
    /// whether the sequence has grown since it was last observed.
    pub fn tail_marker(&self) -> usize {
        self.len
    }

    /// Items appended since `since` (a previously observed [`Self::tail_marker`]), walking only
    /// the nodes added after that marker rather than the whole chain.
    pub fn items_since(&self, since: usize) -> Vec<T> {
        if since >= self.len {
            return Vec::new();
        }
        let mut collected = Vec::with_capacity(self.len - since);
        let mut current = self.head.as_ref();
        while let Some(node) = current {
            if node.index < since {
                break;
            }
            collected.push(node.item.clone());
            current = node.prev.as_ref();
        }
        collected.reverse();
        collected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_preserves_prior_snapshot() {
        let a = IncrementalSequence::from_vec(vec![1, 2, 3]);
        let snapshot = a.clone();
        let b = a.appended(4);

        assert_eq!(snapshot.as_slice(), &[1, 2, 3]);
        assert_eq!(b.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn items_since_resumes_fold() {
        let a = IncrementalSequence::from_vec(vec![1, 2, 3]);
        let marker = a.tail_marker();
        let b = a.extended([4, 5]);

        assert_eq!(b.items_since(marker), vec![4, 5]);
    }

    #[test]
    fn items_since_walks_only_the_new_tail() {
        let a = IncrementalSequence::from_vec(vec![1, 2, 3]);
        assert_eq!(a.items_since(1), vec![2, 3]);
        assert_eq!(a.items_since(3), Vec::<i32>::new());
        assert_eq!(a.items_since(10), Vec::<i32>::new());
    }

    #[test]
    fn last_reflects_the_most_recent_append() {
        let a = IncrementalSequence::from_vec(vec![1, 2, 3]);
        assert_eq!(a.last(), Some(&3));
        assert_eq!(a.appended(4).last(), Some(&4));
    }
}
