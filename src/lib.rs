//! An intrusive AVL tree, plus an owned ordered map built on top of it.
#![no_std]

// Conventions used in comments:
// - The height of a missing subtree is 0, the height of a leaf is 1.
// - The balance factor of a node `x` is `b(x) = h(right(x)) - h(left(x))`.
// - A node is `d`-heavy if its taller subtree is on side `d`.
//
// The fundamental invariants of an AVL tree are:
// 1. Keys strictly increase from left to right.
// 2. Every balance factor is -1, 0 or 1.
//
// Attaching or detaching a single node changes the height of exactly one subtree by exactly one.
// The change is retraced upward one ancestor at a time:
//
// - After a subtree grew, an ancestor whose new balance factor is 0 absorbed the growth and
//   retracing stops. A factor of ±1 means the ancestor grew too. A factor of ±2 is repaired by a
//   rotation, which always restores the ancestor's previous height.
//
// - After a subtree shrank, an ancestor whose new balance factor is ±1 kept its height and
//   retracing stops. A factor of 0 means the ancestor shrank too. A factor of ±2 is repaired by a
//   rotation, which only shrinks the ancestor's subtree if the heavy child was not balanced; if
//   the rotation leaves the height unchanged, retracing stops.

#[cfg(feature = "alloc")]
extern crate alloc;
#[cfg(any(test, feature = "model"))]
extern crate std;

use core::{
    borrow::Borrow, cell::UnsafeCell, cmp::Ordering, fmt, marker::PhantomPinned, mem, ops::Not,
    pin::Pin, ptr::NonNull,
};

use cordyceps::Linked;

mod cursor;
#[cfg(feature = "alloc")]
mod debug;
mod entry;
mod iter;
#[cfg(feature = "alloc")]
pub mod map;
#[cfg(all(feature = "alloc", any(test, feature = "model")))]
pub mod model;

pub use cursor::{Cursor, CursorMut};
pub use entry::{Entry, OccupiedEntry, VacantEntry};
pub use iter::Iter;
#[cfg(feature = "alloc")]
pub use map::AvlMap;

use entry::InsertAs;

pub trait TreeNode<L>: Linked<L> {
    type Key: Ord;

    fn key(&self) -> &Self::Key;
}

/// An intrusive AVL tree.
///
/// Nodes are owned by the tree through their [`Linked::Handle`] from insertion until they are
/// removed. Each node stores its parent link, its two child links and its balance factor inline in
/// a [`Links`] field.
pub struct AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    root: Link<T>,
    len: usize,
}

pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Dir {
    Left = 0,
    Right = 1,
}

impl Dir {
    // The balance factor contribution of a taller subtree on this side.
    #[inline]
    const fn sign(self) -> i8 {
        match self {
            Dir::Left => -1,
            Dir::Right => 1,
        }
    }
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

// The kind of height change being retraced toward the root.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Change {
    Grew,
    Shrank,
}

impl Change {
    // The adjustment to a parent's balance factor when its `dir` subtree changed.
    #[inline]
    fn delta(self, dir: Dir) -> i8 {
        match self {
            Change::Grew => dir.sign(),
            Change::Shrank => -dir.sign(),
        }
    }

    // Whether a parent with the adjusted `balance` kept its height, ending the retrace.
    #[inline]
    fn absorbed(self, balance: i8) -> bool {
        match self {
            Change::Grew => balance == 0,
            Change::Shrank => balance != 0,
        }
    }
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    parent: Link<T>,
    children: [Link<T>; 2],
    balance: i8,
    _unpin: PhantomPinned,
}

type Link<T> = Option<NonNull<T>>;

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a new empty tree.
    pub const fn new() -> AvlTree<T> {
        AvlTree { root: None, len: 0 }
    }

    /// Returns `true` if the tree contains no elements.
    pub const fn is_empty(&self) -> bool {
        let empty = self.len() == 0;

        if cfg!(debug_assertions) {
            // Can't use assert_eq!() in const fn.
            assert!(empty == self.root.is_none());
        }

        empty
    }

    /// Returns the number of elements in the tree.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns the height of the tree, counted in nodes along the longest root-to-leaf path.
    ///
    /// An empty tree has height 0. This follows the balance factors down the taller side of each
    /// node and completes in _O(log(n))_ time.
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            height += 1;

            let links = unsafe { self.links(cur) };
            opt_cur = if links.balance() > 0 {
                links.right()
            } else {
                links.left()
            };
        }

        height
    }

    /// Checks every structural invariant of the tree, panicking on the first violation.
    ///
    /// Returns the height of the tree as computed by a full traversal.
    #[doc(hidden)]
    pub fn assert_invariants(&self) -> usize {
        let Some(root) = self.root else {
            assert_eq!(self.len, 0, "empty tree must have length 0");
            return 0;
        };

        unsafe {
            assert_eq!(self.links(root).parent(), None, "root must not have a parent");

            let (height, count) = self.assert_invariants_at(root, None, None);
            assert_eq!(count, self.len, "node count must match `len()`");
            assert_eq!(height, self.height(), "`height()` must match the computed height");

            height
        }
    }

    // Returns the height and node count of the subtree at `node`.
    unsafe fn assert_invariants_at(
        &self,
        node: NonNull<T>,
        lower: Option<&T::Key>,
        upper: Option<&T::Key>,
    ) -> (usize, usize) {
        unsafe {
            let key = node.as_ref().key();

            if let Some(lower) = lower {
                assert!(lower < key, "keys must increase from left to right");
            }

            if let Some(upper) = upper {
                assert!(key < upper, "keys must increase from left to right");
            }

            let mut heights = [0_usize; 2];
            let mut count = 1;

            for dir in [Dir::Left, Dir::Right] {
                let Some(child) = self.links(node).child(dir) else {
                    continue;
                };

                // Ensure child's parent link points to this node.
                let parent = self
                    .links(child)
                    .parent()
                    .expect("child parent pointer not set");
                assert_eq!(node, parent);

                let (lower, upper) = match dir {
                    Dir::Left => (lower, Some(key)),
                    Dir::Right => (Some(key), upper),
                };

                let (height, sub_count) = self.assert_invariants_at(child, lower, upper);
                heights[dir as usize] = height;
                count += sub_count;
            }

            let balance = heights[Dir::Right as usize] as isize - heights[Dir::Left as usize] as isize;
            assert_eq!(
                isize::from(self.links(node).balance()),
                balance,
                "balance factor must equal h(right) - h(left)"
            );
            assert!(balance.abs() <= 1, "balance factor out of range");

            (1 + heights[0].max(heights[1]), count)
        }
    }

    /// Returns a reference to the node corresponding to `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<Pin<&T>>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let ptr = self.get_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_ref())) }
    }

    /// Returns a pinned mutable reference to the node corresponding to `key`.
    ///
    /// The caller must not change the result of comparisons between the node's key and the keys
    /// of other nodes, or the tree will misbehave.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<Pin<&mut T>>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut ptr = self.get_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_mut())) }
    }

    /// Returns `true` if the tree contains a node corresponding to `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get_raw(key).is_some()
    }

    fn get_raw<Q>(&self, key: &Q) -> Link<T>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.search(key).ok()
    }

    // Descends from the root looking for `key`.
    //
    // Returns the matching node, or the position where a node with `key` would be attached.
    fn search<Q>(&self, key: &Q) -> Result<NonNull<T>, InsertAs<T>>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut insert_as = InsertAs::Root;
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            unsafe {
                let dir = match key.cmp(cur.as_ref().key().borrow()) {
                    Ordering::Less => Dir::Left,
                    Ordering::Equal => return Ok(cur),
                    Ordering::Greater => Dir::Right,
                };

                insert_as = InsertAs::Child { parent: cur, dir };
                opt_cur = self.links(cur).child(dir);
            }
        }

        Err(insert_as)
    }

    /// Returns an entry for `key`, which may be used to inspect or fill the corresponding slot.
    pub fn entry<Q>(&mut self, key: &Q) -> Entry<'_, T>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match self.search(key) {
            Ok(node) => unsafe { Entry::occupied(self, node) },
            Err(insert_as) => unsafe { Entry::vacant(self, insert_as) },
        }
    }

    /// Returns the minimum element of the tree.
    pub fn first(&self) -> Option<Pin<&T>> {
        self.first_raw()
            .map(|first| unsafe { Pin::new_unchecked(first.as_ref()) })
    }

    /// Returns the maximum element of the tree.
    pub fn last(&self) -> Option<Pin<&T>> {
        self.last_raw()
            .map(|last| unsafe { Pin::new_unchecked(last.as_ref()) })
    }

    pub(crate) fn first_raw(&self) -> Link<T> {
        self.root.map(|root| unsafe { self.extreme(root, Dir::Left) })
    }

    pub(crate) fn last_raw(&self) -> Link<T> {
        self.root.map(|root| unsafe { self.extreme(root, Dir::Right) })
    }

    /// Returns an iterator over the elements of the tree, in ascending key order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self)
    }

    /// Returns a cursor pointing at the minimum element of the tree.
    ///
    /// If the tree is empty, the cursor points at the "ghost" non-element.
    pub fn cursor_first(&self) -> Cursor<'_, T> {
        Cursor::first(self)
    }

    /// Returns a cursor pointing at the maximum element of the tree.
    ///
    /// If the tree is empty, the cursor points at the "ghost" non-element.
    pub fn cursor_last(&self) -> Cursor<'_, T> {
        Cursor::last(self)
    }

    /// Returns an editing cursor pointing at the minimum element of the tree.
    pub fn cursor_first_mut(&mut self) -> CursorMut<'_, T> {
        CursorMut::first(self)
    }

    /// Returns an editing cursor pointing at the maximum element of the tree.
    pub fn cursor_last_mut(&mut self) -> CursorMut<'_, T> {
        CursorMut::last(self)
    }

    // Returns the in-order neighbor of `node` on side `dir`.
    unsafe fn neighbor_raw(&self, node: NonNull<T>, dir: Dir) -> Link<T> {
        unsafe {
            if let Some(child) = self.links(node).child(dir) {
                return Some(self.extreme(child, !dir));
            }

            // Climb while `cur` is a `dir` child. The first ancestor entered from its `!dir` side
            // is the neighbor.
            let mut cur = node;
            while let Some(parent) = self.links(cur).parent() {
                if self.which_child(parent, cur) == !dir {
                    return Some(parent);
                }

                cur = parent;
            }

            None
        }
    }

    pub(crate) unsafe fn successor_raw(&self, node: NonNull<T>) -> Link<T> {
        unsafe { self.neighbor_raw(node, Dir::Right) }
    }

    pub(crate) unsafe fn predecessor_raw(&self, node: NonNull<T>) -> Link<T> {
        unsafe { self.neighbor_raw(node, Dir::Left) }
    }

    // Returns the node reached by following `dir` links from `root` as far as possible.
    #[inline]
    unsafe fn extreme(&self, root: NonNull<T>, dir: Dir) -> NonNull<T> {
        let mut cur = root;

        while let Some(child) = unsafe { self.links(cur).child(dir) } {
            cur = child;
        }

        cur
    }

    unsafe fn maybe_set_parent(&mut self, opt_node: Link<T>, parent: Link<T>) {
        let Some(node) = opt_node else {
            return;
        };

        unsafe { self.links_mut(node).set_parent(parent) };
    }

    #[inline]
    unsafe fn replace_child_or_set_root(
        &mut self,
        parent: Link<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        match parent {
            Some(parent) => unsafe { self.replace_child(parent, old_child, new_child) },
            None => self.root = new_child,
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with `new_child`.
    //
    // `new_child`'s parent pointer is not updated.
    //
    // # Safety
    //
    // The caller must ensure that the following conditions hold:
    // - `old_child` is a child node of `parent`.
    // - `new_child` is not a child node of `parent`.
    #[cfg(not(debug_assertions))]
    #[inline]
    unsafe fn replace_child(
        &mut self,
        parent: NonNull<T>,
        old_child: NonNull<T>,
        new_child: Option<NonNull<T>>,
    ) {
        unsafe {
            let dir = self.which_child(parent, old_child);
            self.links_mut(parent).set_child(dir, new_child);
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with `new_child`.
    //
    // Debug builds check the safety conditions and also point `new_child` back at `parent`.
    //
    // # Safety
    //
    // The caller must ensure that the following conditions hold:
    // - `old_child` is a child node of `parent`.
    // - `new_child` is not a child node of `parent`.
    #[cfg(debug_assertions)]
    unsafe fn replace_child(
        &mut self,
        parent: NonNull<T>,
        old_child: NonNull<T>,
        new_child: Option<NonNull<T>>,
    ) {
        unsafe {
            let dir = if self.links(parent).left() == Some(old_child) {
                Dir::Left
            } else if self.links(parent).right() == Some(old_child) {
                Dir::Right
            } else {
                unreachable!("`old_child` must be a child of `parent`");
            };

            if let Some(new_child) = new_child {
                assert_ne!(
                    self.links(parent).child(!dir),
                    Some(new_child),
                    "`new_child` must not be a child of `parent`"
                );
            }

            self.links_mut(parent).set_child(dir, new_child);
            self.maybe_set_parent(new_child, Some(parent));
        }
    }

    // Performs a rotation, moving `up` up and its parent `down` down.
    //
    // The balance factors of affected nodes are not updated.
    unsafe fn rotate_at(&mut self, down: NonNull<T>, up: NonNull<T>) {
        unsafe {
            // - `down` becomes the `dir` child of `up`.
            // - `across` goes from the `dir` child of `up` to the `!dir` child of `down`.
            let dir = !self.which_child(down, up);

            let across = self.links(up).child(dir);
            self.links_mut(down).set_child(!dir, across);
            self.maybe_set_parent(across, Some(down));

            self.links_mut(up).set_child(dir, Some(down));
            let parent = self.links_mut(down).set_parent(Some(up));
            self.links_mut(up).set_parent(parent);

            self.replace_child_or_set_root(parent, down, Some(up));
        }
    }

    // Performs a double rotation, moving the grandchild `up` above both its parent `down_first`
    // and its grandparent `down_second`.
    //
    // The balance factors of affected nodes are not updated.
    unsafe fn rotate_twice_at(
        &mut self,
        down_second: NonNull<T>,
        down_first: NonNull<T>,
        up: NonNull<T>,
    ) {
        unsafe {
            let dir = self.which_child(down_first, up);

            // `up`'s subtrees are split between the two nodes moving down.
            let across_first = self.links(up).child(!dir);
            let across_second = self.links(up).child(dir);

            self.links_mut(down_first).set_child(dir, across_first);
            self.maybe_set_parent(across_first, Some(down_first));
            self.links_mut(down_first).set_parent(Some(up));

            self.links_mut(down_second).set_child(!dir, across_second);
            self.maybe_set_parent(across_second, Some(down_second));
            let parent = self.links_mut(down_second).set_parent(Some(up));

            self.links_mut(up).set_parent(parent);
            self.links_mut(up).set_child(!dir, Some(down_first));
            self.links_mut(up).set_child(dir, Some(down_second));

            self.replace_child_or_set_root(parent, down_second, Some(up));
        }
    }

    // Rebalances the ±2 node `node` by rotating its `heavy` child up.
    //
    // This is a left rotation for a right-heavy node and a right rotation for a left-heavy one.
    // The heavy child must not lean away from `heavy`. Returns whether the subtree's height
    // decreased, which is the case unless the heavy child was balanced.
    unsafe fn rotate_single(&mut self, node: NonNull<T>, heavy: Dir) -> bool {
        unsafe {
            let pivot = self
                .links(node)
                .child(heavy)
                .expect("heavy side must not be empty");
            let pivot_balance = self.links(pivot).balance();

            self.rotate_at(node, pivot);

            if pivot_balance == 0 {
                // Only reachable on removal. Both sides of the pivot were equally tall, so the
                // rotated subtree leans the other way but keeps its height.
                self.links_mut(node).set_balance(heavy.sign());
                self.links_mut(pivot).set_balance(-heavy.sign());
                false
            } else {
                self.links_mut(node).set_balance(0);
                self.links_mut(pivot).set_balance(0);
                true
            }
        }
    }

    // Rebalances the ±2 node `node`, whose `heavy` child leans away from `heavy`, by rotating its
    // inner grandchild up twice.
    //
    // This is a right-left rotation for a right-heavy node and a left-right rotation for a
    // left-heavy one. The subtree's height always decreases.
    unsafe fn rotate_double(&mut self, node: NonNull<T>, heavy: Dir) -> bool {
        unsafe {
            let pivot = self
                .links(node)
                .child(heavy)
                .expect("heavy side must not be empty");
            let secondary = self
                .links(pivot)
                .child(!heavy)
                .expect("pivot leaning inward must have an inner child");
            let secondary_balance = self.links(secondary).balance();

            self.rotate_twice_at(node, pivot, secondary);

            // `node` receives the secondary's `!heavy` subtree and `pivot` its `heavy` subtree.
            let (node_balance, pivot_balance) = if secondary_balance == heavy.sign() {
                (-heavy.sign(), 0)
            } else if secondary_balance == -heavy.sign() {
                (0, heavy.sign())
            } else {
                (0, 0)
            };

            self.links_mut(node).set_balance(node_balance);
            self.links_mut(pivot).set_balance(pivot_balance);
            self.links_mut(secondary).set_balance(0);

            true
        }
    }

    // Picks and performs the rotation that rebalances the ±2 node `node`.
    //
    // Returns the new root of the rotated subtree and whether the subtree's height decreased.
    unsafe fn decide_and_rotate(&mut self, node: NonNull<T>) -> (NonNull<T>, bool) {
        unsafe {
            let heavy = if self.links(node).balance() > 0 {
                Dir::Right
            } else {
                Dir::Left
            };

            let pivot = self
                .links(node)
                .child(heavy)
                .expect("heavy side must not be empty");

            if self.links(pivot).balance() == -heavy.sign() {
                let secondary = self
                    .links(pivot)
                    .child(!heavy)
                    .expect("pivot leaning inward must have an inner child");
                (secondary, self.rotate_double(node, heavy))
            } else {
                (pivot, self.rotate_single(node, heavy))
            }
        }
    }

    // Walks from `parent` toward the root, absorbing a height change of `parent`'s `dir` subtree.
    //
    // Stops at the first ancestor whose height is unaffected, rotating wherever an ancestor
    // becomes ±2.
    unsafe fn retrace(&mut self, mut parent: NonNull<T>, mut dir: Dir, change: Change) {
        unsafe {
            loop {
                let balance = self.links(parent).balance() + change.delta(dir);
                self.links_mut(parent).set_balance(balance);

                let subtree = if balance.abs() == 2 {
                    let (top, shrank) = self.decide_and_rotate(parent);

                    // After insertion, a rotation always restores the subtree's prior height.
                    if change == Change::Grew || !shrank {
                        return;
                    }

                    top
                } else if change.absorbed(balance) {
                    return;
                } else {
                    parent
                };

                let Some(next) = self.links(subtree).parent() else {
                    return;
                };

                dir = self.which_child(next, subtree);
                parent = next;
            }
        }
    }

    /// Inserts an item into the tree.
    ///
    /// If the tree already contains an item with an equal key, the tree is left unchanged and
    /// `item` is handed back in `Err`.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn insert(&mut self, item: T::Handle) -> Result<Pin<&mut T>, T::Handle> {
        let mut ptr = T::into_ptr(item);

        // SAFETY: `ptr` was just produced from a live handle and is not yet linked.
        let key = unsafe { ptr.as_ref().key() };

        unsafe {
            match self.search(key) {
                Ok(_) => return Err(T::from_ptr(ptr)),
                Err(InsertAs::Root) => self.insert_as_root(ptr),
                Err(InsertAs::Child { parent, dir }) => self.insert_as_child(parent, dir, ptr),
            }

            Ok(Pin::new_unchecked(ptr.as_mut()))
        }
    }

    // Links `node` as the root of the empty tree.
    pub(crate) unsafe fn insert_as_root(&mut self, node: NonNull<T>) {
        debug_assert!(self.root.is_none());

        unsafe { self.links_mut(node).clear() };

        self.root = Some(node);
        self.len += 1;
    }

    // Links `node` as the `dir` child of `parent` and rebalances.
    pub(crate) unsafe fn insert_as_child(&mut self, parent: NonNull<T>, dir: Dir, node: NonNull<T>) {
        unsafe {
            debug_assert!(self.links(parent).child(dir).is_none());

            let links = self.links_mut(node);
            links.clear();
            links.set_parent(Some(parent));
            self.links_mut(parent).set_child(dir, Some(node));

            self.len += 1;

            self.retrace(parent, dir, Change::Grew);
        }
    }

    /// Removes the node corresponding to `key` from the tree and returns it.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<T::Handle>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = self.get_raw(key)?;
        Some(unsafe { self.remove_at(node) })
    }

    /// Removes and returns the minimum element of the tree.
    pub fn pop_first(&mut self) -> Option<T::Handle> {
        let first = self.first_raw()?;
        Some(unsafe { self.remove_at(first) })
    }

    /// Removes and returns the maximum element of the tree.
    pub fn pop_last(&mut self) -> Option<T::Handle> {
        let last = self.last_raw()?;
        Some(unsafe { self.remove_at(last) })
    }

    /// Removes an arbitrary node from the tree.
    ///
    /// # Safety
    ///
    /// It is the caller's responsibility to ensure that `node` is an element of `self`, and not any
    /// other tree.
    pub unsafe fn remove_at(&mut self, node: NonNull<T>) -> T::Handle {
        // There are three possible cases:
        //
        // 1. `node` has two children.
        //
        //    `node`'s in-order predecessor, the maximum of its left subtree, is unlinked and takes
        //    over `node`'s position, children and balance factor. The predecessor has no right
        //    child, so unlinking it is a case 2 or case 3 removal one level further down.
        //
        // 2. `node` has one child.
        //
        //    The child is elevated into `node`'s position.
        //
        // 3. `node` is a leaf.
        //
        //    `node` is simply unlinked.
        //
        // In every case exactly one subtree lost one level of height. It is identified by its
        // parent and side rather than by key, as keys no longer describe the old shape.

        unsafe {
            let parent = self.links(node).parent();
            let left = self.links(node).left();
            let right = self.links(node).right();

            let side = parent.map(|p| self.which_child(p, node));

            let shrunk = match (left, right) {
                (Some(left), Some(right)) => {
                    let predecessor = self.extreme(left, Dir::Right);

                    let shrunk = if predecessor == left {
                        // The predecessor keeps its own left subtree, which replaces `node`'s
                        // one level taller left subtree.
                        (predecessor, Dir::Left)
                    } else {
                        let predecessor_parent = self
                            .links(predecessor)
                            .parent()
                            .expect("predecessor below `left` must have a parent");
                        let predecessor_left = self.links(predecessor).left();

                        // Elevate the predecessor's left child to replace it.
                        self.links_mut(predecessor_parent)
                            .set_right(predecessor_left);
                        self.maybe_set_parent(predecessor_left, Some(predecessor_parent));

                        self.links_mut(predecessor).set_left(Some(left));
                        self.links_mut(left).set_parent(Some(predecessor));

                        (predecessor_parent, Dir::Right)
                    };

                    self.links_mut(predecessor).set_right(Some(right));
                    self.links_mut(right).set_parent(Some(predecessor));

                    // Transfer the balance factor of `node` to the predecessor.
                    let balance = self.links(node).balance();
                    self.links_mut(predecessor).set_balance(balance);
                    self.links_mut(predecessor).set_parent(parent);

                    self.replace_child_or_set_root(parent, node, Some(predecessor));

                    Some(shrunk)
                }

                (Some(child), None) | (None, Some(child)) => {
                    self.replace_child_or_set_root(parent, node, Some(child));
                    self.links_mut(child).set_parent(parent);

                    parent.zip(side)
                }

                (None, None) => {
                    self.replace_child_or_set_root(parent, node, None);

                    parent.zip(side)
                }
            };

            self.links_mut(node).clear();
            self.len -= 1;

            if let Some((parent, dir)) = shrunk {
                self.retrace(parent, dir, Change::Shrank);
            }

            T::from_ptr(node)
        }
    }

    /// Clears the tree, removing all elements.
    ///
    /// Each node is released exactly once, without recursion.
    pub fn clear(&mut self) {
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            unsafe {
                // Descend to the minimum node.
                let cur = self.extreme(cur, Dir::Left);
                let parent = self.links(cur).parent();
                let right = self.links(cur).right();

                // Elevate the node's right child (which may be None).
                self.replace_child_or_set_root(parent, cur, right);
                self.maybe_set_parent(right, parent);

                // Drop the node.
                self.links_mut(cur).clear();
                drop(T::from_ptr(cur));
                self.len -= 1;

                // If the node had no right child, climb to the parent. If the node had no parent,
                // the tree is empty.
                opt_cur = right.or(parent);
            }
        }

        debug_assert!(self.root.is_none());
        debug_assert_eq!(self.len(), 0);
    }

    /// Returns a structurally identical copy of the tree.
    ///
    /// `clone_node` is called once per element, in pre-order, and must return a new item with an
    /// equal key. The copy has the same shape and balance factors as `self`, so no rebalancing is
    /// performed. The traversal follows parent links and uses no recursion.
    pub fn clone_with<F>(&self, mut clone_node: F) -> AvlTree<T>
    where
        F: FnMut(&T) -> T::Handle,
    {
        let mut tree = AvlTree::new();

        let Some(root) = self.root else {
            return tree;
        };

        unsafe {
            let mut src = root;
            let mut dst = tree.attach_clone(clone_node(root.as_ref()), self.links(root), None);

            loop {
                // Descend into the first child of `src` that has no counterpart yet.
                let mut next = None;
                for dir in [Dir::Left, Dir::Right] {
                    if let Some(child) = self.links(src).child(dir) {
                        if tree.links(dst).child(dir).is_none() {
                            next = Some((dir, child));
                            break;
                        }
                    }
                }

                match next {
                    Some((dir, child)) => {
                        dst = tree.attach_clone(
                            clone_node(child.as_ref()),
                            self.links(child),
                            Some((dst, dir)),
                        );
                        src = child;
                    }

                    // Both subtrees are done, climb back up.
                    None => match self.links(src).parent() {
                        Some(parent) => {
                            src = parent;
                            dst = tree
                                .links(dst)
                                .parent()
                                .expect("copy must mirror the source's shape");
                        }
                        None => break,
                    },
                }
            }
        }

        debug_assert_eq!(tree.len, self.len);

        tree
    }

    // Links a copy of a node as the `dir` child of `parent`, or as the root.
    unsafe fn attach_clone(
        &mut self,
        item: T::Handle,
        source: &Links<T>,
        position: Option<(NonNull<T>, Dir)>,
    ) -> NonNull<T> {
        let ptr = T::into_ptr(item);

        unsafe {
            let links = self.links_mut(ptr);
            links.clear();
            links.set_balance(source.balance());

            match position {
                Some((parent, dir)) => {
                    links.set_parent(Some(parent));
                    self.links_mut(parent).set_child(dir, Some(ptr));
                }
                None => self.root = Some(ptr),
            }
        }

        self.len += 1;

        ptr
    }

    // Support methods ========================================================

    #[inline]
    unsafe fn links<'a>(&self, node: NonNull<T>) -> &'a Links<T> {
        unsafe { T::links(node).as_ref() }
    }

    #[inline]
    unsafe fn links_mut<'a>(&mut self, node: NonNull<T>) -> &'a mut Links<T> {
        unsafe { T::links(node).as_mut() }
    }

    #[inline]
    unsafe fn which_child(&self, parent: NonNull<T>, child: NonNull<T>) -> Dir {
        if unsafe { self.links(parent).left() } == Some(child) {
            Dir::Left
        } else {
            Dir::Right
        }
    }
}

impl<T> Default for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T> fmt::Debug for AvlTree<T>
where
    T: TreeNode<Links<T>> + fmt::Debug + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<'tree, T> IntoIterator for &'tree AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    type Item = &'tree T;
    type IntoIter = Iter<'tree, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: ?Sized> Links<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                parent: None,
                children: [None; 2],
                balance: 0,
                _unpin: PhantomPinned,
            }),
        }
    }

    #[inline]
    fn balance(&self) -> i8 {
        unsafe { (*self.inner.get()).balance }
    }

    #[inline]
    fn parent(&self) -> Link<T> {
        unsafe { (*self.inner.get()).parent }
    }

    #[inline]
    fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    #[inline]
    fn set_parent(&mut self, parent: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().parent, parent)
    }

    #[inline]
    fn set_child(&mut self, dir: Dir, child: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().children[dir as usize], child)
    }

    #[inline]
    fn set_left(&mut self, left: Link<T>) -> Link<T> {
        self.set_child(Dir::Left, left)
    }

    #[inline]
    fn set_right(&mut self, right: Link<T>) -> Link<T> {
        self.set_child(Dir::Right, right)
    }

    #[inline]
    fn set_balance(&mut self, balance: i8) {
        debug_assert!((-2..=2).contains(&balance));
        self.inner.get_mut().balance = balance;
    }

    // Unlinks the node and resets its balance factor.
    #[inline]
    fn clear(&mut self) {
        let inner = self.inner.get_mut();
        inner.parent = None;
        inner.children = [None; 2];
        inner.balance = 0;
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("parent", &self.parent())
            .field("left", &self.left())
            .field("right", &self.right())
            .field("balance", &self.balance())
            .finish()
    }
}
