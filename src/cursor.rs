use core::{marker::PhantomData, pin::Pin, ptr::NonNull};

use crate::{AvlTree, Dir, Link, Links, TreeNode};

/// A read-only cursor over an [`AvlTree`].
///
/// The cursor rests either on an element or on the "ghost" position, which sits after the last
/// element and before the first. Stepping past either end lands on the ghost; stepping from the
/// ghost wraps around. Two cursors are equal when they rest on the same element, or both on the
/// ghost.
pub struct Cursor<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    curs: CursorRaw<T>,
    phantom: PhantomData<&'tree AvlTree<T>>,
}

impl<'tree, T> Cursor<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    pub(crate) fn first(tree: &'tree AvlTree<T>) -> Cursor<'tree, T> {
        Cursor {
            curs: CursorRaw::at_end(tree.into(), Dir::Left),
            phantom: PhantomData,
        }
    }

    pub(crate) fn last(tree: &'tree AvlTree<T>) -> Cursor<'tree, T> {
        Cursor {
            curs: CursorRaw::at_end(tree.into(), Dir::Right),
            phantom: PhantomData,
        }
    }

    /// Steps to the in-order successor, or from the ghost to the minimum.
    pub fn move_next(&mut self) {
        unsafe { self.curs.step(Dir::Right) }
    }

    /// Steps to the in-order predecessor, or from the ghost to the maximum.
    pub fn move_prev(&mut self) {
        unsafe { self.curs.step(Dir::Left) }
    }

    /// The element under the cursor, or `None` on the ghost.
    pub fn get(&self) -> Option<&'tree T> {
        unsafe { self.curs.get() }
    }

    /// The element [`move_next`](Self::move_next) would land on.
    pub fn peek_next(&self) -> Option<&'tree T> {
        unsafe { self.curs.peek(Dir::Right) }
    }

    /// The element [`move_prev`](Self::move_prev) would land on.
    pub fn peek_prev(&self) -> Option<&'tree T> {
        unsafe { self.curs.peek(Dir::Left) }
    }
}

impl<T> Clone for Cursor<'_, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn clone(&self) -> Self {
        Cursor {
            curs: self.curs.duplicate(),
            phantom: PhantomData,
        }
    }
}

impl<T> PartialEq for Cursor<'_, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn eq(&self, other: &Self) -> bool {
        self.curs.ptr == other.curs.ptr
    }
}

impl<T> Eq for Cursor<'_, T> where T: TreeNode<Links<T>> + ?Sized {}

/// A cursor that holds the tree mutably and can unlink the element under it.
///
/// Positions and movement are the same as for [`Cursor`].
pub struct CursorMut<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    curs: CursorRaw<T>,
    phantom: PhantomData<&'tree mut AvlTree<T>>,
}

impl<'tree, T> CursorMut<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    pub(crate) fn first(tree: &'tree mut AvlTree<T>) -> CursorMut<'tree, T> {
        CursorMut {
            curs: CursorRaw::at_end(tree.into(), Dir::Left),
            phantom: PhantomData,
        }
    }

    pub(crate) fn last(tree: &'tree mut AvlTree<T>) -> CursorMut<'tree, T> {
        CursorMut {
            curs: CursorRaw::at_end(tree.into(), Dir::Right),
            phantom: PhantomData,
        }
    }

    /// Borrows this cursor as a read-only [`Cursor`] at the same position.
    pub fn as_cursor(&self) -> Cursor<'_, T> {
        Cursor {
            curs: self.curs.duplicate(),
            phantom: PhantomData,
        }
    }

    /// Steps to the in-order successor, or from the ghost to the minimum.
    pub fn move_next(&mut self) {
        unsafe { self.curs.step(Dir::Right) }
    }

    /// Steps to the in-order predecessor, or from the ghost to the maximum.
    pub fn move_prev(&mut self) {
        unsafe { self.curs.step(Dir::Left) }
    }

    /// The element under the cursor, or `None` on the ghost.
    pub fn get(&self) -> Option<&T> {
        unsafe { self.curs.get() }
    }

    /// Pinned mutable access to the element under the cursor.
    ///
    /// # Safety
    ///
    /// The element's key must keep comparing the same way against every other key in the tree.
    pub unsafe fn get_mut(&mut self) -> Option<Pin<&mut T>> {
        unsafe { self.curs.get_mut() }
    }

    /// The element [`move_next`](Self::move_next) would land on.
    pub fn peek_next(&self) -> Option<&T> {
        unsafe { self.curs.peek(Dir::Right) }
    }

    /// The element [`move_prev`](Self::move_prev) would land on.
    pub fn peek_prev(&self) -> Option<&T> {
        unsafe { self.curs.peek(Dir::Left) }
    }

    /// Unlinks the element under the cursor and leaves the cursor on its successor.
    ///
    /// On the ghost this is a no-op returning `None`.
    pub fn remove_current(&mut self) -> Option<T::Handle> {
        unsafe { self.curs.unlink_and_step(Dir::Right) }
    }

    /// Unlinks the element under the cursor and leaves the cursor on its predecessor.
    ///
    /// On the ghost this is a no-op returning `None`.
    pub fn remove_current_and_move_prev(&mut self) -> Option<T::Handle> {
        unsafe { self.curs.unlink_and_step(Dir::Left) }
    }
}

// Position shared by both cursor kinds. `ptr == None` is the ghost.
struct CursorRaw<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    tree: NonNull<AvlTree<T>>,
    ptr: Link<T>,
}

impl<T> CursorRaw<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    // The cursor resting on the `end` extreme of the tree (`Left` is the minimum).
    fn at_end(tree: NonNull<AvlTree<T>>, end: Dir) -> CursorRaw<T> {
        let mut curs = CursorRaw { tree, ptr: None };
        curs.ptr = unsafe { curs.beside(!end) };
        curs
    }

    fn duplicate(&self) -> CursorRaw<T> {
        CursorRaw {
            tree: self.tree,
            ptr: self.ptr,
        }
    }

    // The position one step toward `dir`. From the ghost, stepping right wraps to the minimum and
    // stepping left to the maximum.
    unsafe fn beside(&self, dir: Dir) -> Link<T> {
        let tree = unsafe { self.tree.as_ref() };

        match (self.ptr, dir) {
            (Some(p), Dir::Right) => unsafe { tree.successor_raw(p) },
            (Some(p), Dir::Left) => unsafe { tree.predecessor_raw(p) },
            (None, Dir::Right) => tree.first_raw(),
            (None, Dir::Left) => tree.last_raw(),
        }
    }

    unsafe fn step(&mut self, dir: Dir) {
        self.ptr = unsafe { self.beside(dir) };
    }

    unsafe fn get<'a>(&self) -> Option<&'a T> {
        self.ptr.map(|p| unsafe { p.as_ref() })
    }

    unsafe fn get_mut<'a>(&mut self) -> Option<Pin<&'a mut T>> {
        self.ptr
            .map(|mut p| unsafe { Pin::new_unchecked(p.as_mut()) })
    }

    unsafe fn peek<'a>(&self, dir: Dir) -> Option<&'a T> {
        unsafe { self.beside(dir) }.map(|p| unsafe { p.as_ref() })
    }

    // The neighbour is found before unlinking; removal relinks nodes but never moves them, so it
    // stays valid.
    unsafe fn unlink_and_step(&mut self, dir: Dir) -> Option<T::Handle> {
        let current = self.ptr?;

        unsafe {
            self.step(dir);
            Some(self.tree.as_mut().remove_at(current))
        }
    }
}
