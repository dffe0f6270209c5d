use alloc::boxed::Box;
use core::{borrow::Borrow, fmt, iter::FusedIterator, marker::PhantomPinned, ptr::NonNull};

use cordyceps::Linked;

use crate::{AvlTree, Entry, Links, TreeNode};

/// An ordered map based on an [AVL tree].
///
/// Keys are unique: inserting a key that is already present leaves the map unchanged. Cloning a
/// map copies the tree node for node, preserving its shape.
///
/// [AVL tree]: https://en.wikipedia.org/wiki/AVL_tree
pub struct AvlMap<K: Ord, V> {
    tree: AvlTree<MapNode<K, V>>,
}

struct MapNode<K, V> {
    links: Links<MapNode<K, V>>,
    key: K,
    value: V,
    _unpin: PhantomPinned,
}

impl<K, V> MapNode<K, V> {
    fn boxed(key: K, value: V) -> Box<Self> {
        Box::new(MapNode {
            links: Links::new(),
            key,
            value,
            _unpin: PhantomPinned,
        })
    }
}

unsafe impl<K, V> Linked<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Handle = Box<Self>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        Box::leak(r).into()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<MapNode<K, V>>> {
        let ptr = ptr.as_ptr();
        // SAFETY: `ptr` is non-null, so a pointer to one of its fields is too.
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*ptr).links)) }
    }
}

impl<K: Ord, V> TreeNode<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Key = K;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

impl<K: Ord, V> AvlMap<K, V> {
    /// Creates a new, empty `AvlMap`.
    pub const fn new() -> Self {
        Self {
            tree: AvlTree::new(),
        }
    }

    /// Returns `true` if the map contains no elements.
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the number of elements in the map.
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns the height of the underlying tree. An empty map has height 0.
    pub fn height(&self) -> usize {
        self.tree.height()
    }

    /// Returns `true` if the map contains a value associated with `key`.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.contains_key(key)
    }

    /// Returns a reference to the value associated with `key`.
    #[inline]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.get(key).map(|node| &node.get_ref().value)
    }

    /// Returns the stored key and the value associated with `key`.
    #[inline]
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.get(key).map(|node| {
            let node = node.get_ref();
            (&node.key, &node.value)
        })
    }

    /// Returns a mutable reference to the value associated with `key`.
    #[inline]
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree
            .get_mut(key)
            // SAFETY: Pinning is not structural for `node.value`.
            .map(|node| unsafe { &mut node.get_unchecked_mut().value })
    }

    /// Inserts `value` under `key`.
    ///
    /// Returns `false` if `key` is already present, in which case the map is left unchanged and
    /// the existing value is retained.
    #[inline]
    pub fn insert(&mut self, key: K, value: V) -> bool {
        self.emplace_with(key, || value)
    }

    /// Inserts the value produced by `make` under `key`.
    ///
    /// `make` is only called if `key` is vacant. Returns `false` if `key` is already present, in
    /// which case the map is left unchanged.
    pub fn emplace_with<F>(&mut self, key: K, make: F) -> bool
    where
        F: FnOnce() -> V,
    {
        match self.tree.entry(&key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                // SAFETY: the node carries the key the entry was located with.
                unsafe { entry.insert(MapNode::boxed(key, make())) };
                true
            }
        }
    }

    /// Inserts `value` under `key`, returning the value it replaced, if any.
    pub fn replace(&mut self, key: K, value: V) -> Option<V> {
        match self.tree.entry(&key) {
            Entry::Occupied(mut entry) => {
                // SAFETY: the node carries the key the entry was located with.
                let old = unsafe { entry.insert(MapNode::boxed(key, value)) };
                Some(old.value)
            }
            Entry::Vacant(entry) => {
                // SAFETY: as above.
                unsafe { entry.insert(MapNode::boxed(key, value)) };
                None
            }
        }
    }

    /// Returns a mutable reference to the value under `key`, inserting the value produced by
    /// `make` first if `key` is vacant.
    pub fn get_or_insert_with<F>(&mut self, key: K, make: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        let node = match self.tree.entry(&key) {
            // SAFETY: only the value is handed out, which is not used for ordering.
            Entry::Occupied(entry) => unsafe { entry.into_mut() },
            // SAFETY: the node carries the key the entry was located with.
            Entry::Vacant(entry) => unsafe { entry.insert(MapNode::boxed(key, make())) },
        };

        // SAFETY: Pinning is not structural for `node.value`.
        unsafe { &mut node.get_unchecked_mut().value }
    }

    /// Returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.tree.first().map(|node| {
            let node = node.get_ref();
            (&node.key, &node.value)
        })
    }

    /// Removes and returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn pop_first(&mut self) -> Option<(K, V)> {
        self.tree.pop_first().map(|node| {
            let MapNode { key, value, .. } = *node;
            (key, value)
        })
    }

    /// Returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        self.tree.last().map(|node| {
            let node = node.get_ref();
            (&node.key, &node.value)
        })
    }

    /// Removes and returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn pop_last(&mut self) -> Option<(K, V)> {
        self.tree.pop_last().map(|node| {
            let MapNode { key, value, .. } = *node;
            (key, value)
        })
    }

    /// Removes the value associated with `key` from the map.
    ///
    /// Returns `None` if `key` was not present.
    #[inline]
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.remove(key).map(|node| node.value)
    }

    /// Clears the map, removing all elements.
    #[inline]
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Returns an iterator over the entries of the map, sorted by key.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.tree.iter(),
        }
    }

    /// Returns an iterator over the keys of the map, in sorted order.
    pub fn keys(&self) -> impl DoubleEndedIterator<Item = &K> + ExactSizeIterator + '_ {
        self.iter().map(|(key, _)| key)
    }

    /// Returns an iterator over the values of the map, sorted by key.
    pub fn values(&self) -> impl DoubleEndedIterator<Item = &V> + ExactSizeIterator + '_ {
        self.iter().map(|(_, value)| value)
    }

    /// Returns a cursor pointing at the entry with the minimum key.
    ///
    /// If the map is empty, the cursor points at the "ghost" non-element.
    pub fn cursor_front(&self) -> Cursor<'_, K, V> {
        Cursor {
            inner: self.tree.cursor_first(),
        }
    }

    /// Returns a cursor pointing at the entry with the maximum key.
    ///
    /// If the map is empty, the cursor points at the "ghost" non-element.
    pub fn cursor_back(&self) -> Cursor<'_, K, V> {
        Cursor {
            inner: self.tree.cursor_last(),
        }
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) -> usize {
        self.tree.assert_invariants()
    }
}

impl<K: Ord + Clone, V: Clone> Clone for AvlMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            tree: self
                .tree
                .clone_with(|node| MapNode::boxed(node.key.clone(), node.value.clone())),
        }
    }
}

impl<K: Ord, V> Default for AvlMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + fmt::Debug, V: fmt::Debug> fmt::Debug for AvlMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Ord, V: PartialEq> PartialEq for AvlMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K: Ord, V: Eq> Eq for AvlMap<K, V> {}

/// Collects key-value pairs into a map. Of several pairs sharing a key, the first one is kept.
impl<K: Ord, V> FromIterator<(K, V)> for AvlMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = AvlMap::new();
        map.extend(iter);
        map
    }
}

/// Inserts key-value pairs whose keys are not yet present; existing entries are kept.
impl<K: Ord, V> Extend<(K, V)> for AvlMap<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<'a, K: Ord, V> IntoIterator for &'a AvlMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over the entries of an [`AvlMap`], sorted by key.
pub struct Iter<'a, K: Ord, V> {
    inner: crate::Iter<'a, MapNode<K, V>>,
}

impl<'a, K: Ord, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|node| (&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K: Ord, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|node| (&node.key, &node.value))
    }
}

impl<K: Ord, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K: Ord, V> FusedIterator for Iter<'_, K, V> {}

/// A cursor over the entries of an [`AvlMap`].
///
/// A cursor points either to an entry or to a "ghost" non-element that connects the last entry to
/// the first. Two cursors compare equal when they point at the same entry, or both at the ghost.
pub struct Cursor<'a, K: Ord, V> {
    inner: crate::Cursor<'a, MapNode<K, V>>,
}

impl<'a, K: Ord, V> Cursor<'a, K, V> {
    /// Moves the cursor to the next entry, or from the ghost to the first entry.
    pub fn move_next(&mut self) {
        self.inner.move_next();
    }

    /// Moves the cursor to the previous entry, or from the ghost to the last entry.
    pub fn move_prev(&mut self) {
        self.inner.move_prev();
    }

    /// Returns the entry the cursor points at, or `None` at the ghost.
    pub fn key_value(&self) -> Option<(&'a K, &'a V)> {
        self.inner.get().map(|node| (&node.key, &node.value))
    }

    /// Returns the entry after the cursor without moving it.
    pub fn peek_next(&self) -> Option<(&'a K, &'a V)> {
        self.inner.peek_next().map(|node| (&node.key, &node.value))
    }

    /// Returns the entry before the cursor without moving it.
    pub fn peek_prev(&self) -> Option<(&'a K, &'a V)> {
        self.inner.peek_prev().map(|node| (&node.key, &node.value))
    }
}

impl<K: Ord, V> Clone for Cursor<'_, K, V> {
    fn clone(&self) -> Self {
        Cursor {
            inner: self.inner.clone(),
        }
    }
}

impl<K: Ord, V> PartialEq for Cursor<'_, K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<K: Ord, V> Eq for Cursor<'_, K, V> {}
