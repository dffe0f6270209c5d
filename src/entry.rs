use core::{pin::Pin, ptr::NonNull};

use crate::{AvlTree, Dir, Links, TreeNode};

/// A view into a single entry in an [`AvlTree`], which may be either vacant or occupied.
///
/// The key used to locate the entry is not retained; see [`VacantEntry::insert`].
pub enum Entry<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    Vacant(VacantEntry<'tree, T>),
    Occupied(OccupiedEntry<'tree, T>),
}

impl<'tree, T> Entry<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    pub(crate) unsafe fn vacant(tree: &'tree mut AvlTree<T>, insert_as: InsertAs<T>) -> Self {
        Entry::Vacant(VacantEntry { tree, insert_as })
    }

    pub(crate) unsafe fn occupied(tree: &'tree mut AvlTree<T>, node: NonNull<T>) -> Self {
        Entry::Occupied(OccupiedEntry { tree, node })
    }

    /// Returns `true` if the entry holds an item.
    pub fn is_occupied(&self) -> bool {
        matches!(self, Entry::Occupied(_))
    }
}

// Where a new node is linked into the tree.
pub(crate) enum InsertAs<T: ?Sized> {
    Root,
    Child { parent: NonNull<T>, dir: Dir },
}

pub struct VacantEntry<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    tree: &'tree mut AvlTree<T>,
    insert_as: InsertAs<T>,
}

impl<'tree, T> VacantEntry<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Inserts `item` at the position of this entry and rebalances the tree.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the key returned by `item.key()` is equal to the key used to
    /// retrieve this entry.
    pub unsafe fn insert(self, item: T::Handle) -> Pin<&'tree mut T> {
        let mut ptr = T::into_ptr(item);

        unsafe {
            match self.insert_as {
                InsertAs::Root => self.tree.insert_as_root(ptr),
                InsertAs::Child { parent, dir } => self.tree.insert_as_child(parent, dir, ptr),
            }

            Pin::new_unchecked(ptr.as_mut())
        }
    }
}

pub struct OccupiedEntry<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    tree: &'tree mut AvlTree<T>,
    node: NonNull<T>,
}

impl<'tree, T> OccupiedEntry<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a reference to the item in the entry.
    pub fn get(&self) -> Pin<&T> {
        // SAFETY: `self.tree` is mutably borrowed for `'tree`
        unsafe { Pin::new_unchecked(self.node.as_ref()) }
    }

    /// Returns a pinned mutable reference to the item in the entry.
    ///
    /// # Safety
    ///
    /// The caller must ensure that neither the links nor the key of the mutably borrowed item are
    /// modified, as doing so may result in undefined behavior.
    pub unsafe fn get_mut(&mut self) -> Pin<&mut T> {
        // SAFETY: `self.tree` is mutably borrowed for `'tree`, and `self.node` is guaranteed pinned
        // by contract with `Linked`.
        unsafe { Pin::new_unchecked(self.node.as_mut()) }
    }

    /// Converts the entry into a pinned mutable reference to its item.
    ///
    /// # Safety
    ///
    /// Same as [`OccupiedEntry::get_mut`].
    pub unsafe fn into_mut(mut self) -> Pin<&'tree mut T> {
        unsafe { Pin::new_unchecked(self.node.as_mut()) }
    }

    /// Links `item` into the tree in place of the current item, returning the previous item.
    ///
    /// The new item takes over the old item's position and balance factor, so the tree is not
    /// rebalanced.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `item`'s key is equivalent to the key of the existing item.
    pub unsafe fn insert(&mut self, item: T::Handle) -> T::Handle {
        let new_ptr = T::into_ptr(item);
        let old_ptr = self.node;

        // Point this entry at the new item.
        self.node = new_ptr;

        unsafe {
            // Read the old item's links.
            let old_links = self.tree.links(old_ptr);
            let balance = old_links.balance();
            let parent = old_links.parent();
            let left = old_links.left();
            let right = old_links.right();

            // Link the new item into the tree.
            match parent {
                Some(parent) => {
                    let which = self.tree.which_child(parent, old_ptr);
                    self.tree.links_mut(parent).set_child(which, Some(new_ptr));
                }
                None => self.tree.root = Some(new_ptr),
            }

            self.tree.maybe_set_parent(left, Some(new_ptr));
            self.tree.maybe_set_parent(right, Some(new_ptr));

            let new_links = self.tree.links_mut(new_ptr);
            new_links.set_parent(parent);
            new_links.set_left(left);
            new_links.set_right(right);
            new_links.set_balance(balance);

            // Deinit the old item's links.
            self.tree.links_mut(old_ptr).clear();

            T::from_ptr(old_ptr)
        }
    }

    /// Removes and returns the item pointed to by this entry.
    pub fn remove(self) -> T::Handle {
        unsafe { self.tree.remove_at(self.node) }
    }
}
