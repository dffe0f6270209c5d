//! Model-based testing harness: drives an [`AvlTree`] or [`AvlMap`] and a std collection with
//! the same operations and checks that they agree, validating the tree after every step.
extern crate std;

use std::{
    collections::{BTreeMap, BTreeSet},
    prelude::v1::*,
    ptr::NonNull,
};

use arbitrary::Arbitrary;
use cordyceps::Linked;
use proptest::strategy::{Just, Strategy};

use crate::{AvlMap, AvlTree, Links, TreeNode};

#[derive(Debug)]
#[repr(C)]
pub struct TestNode {
    pub links: Links<TestNode>,
    pub key: u32,
}

impl TestNode {
    pub fn new(key: u32) -> Box<TestNode> {
        Box::new(TestNode {
            links: Links::new(),
            key,
        })
    }
}

unsafe impl Linked<Links<TestNode>> for TestNode {
    type Handle = Box<TestNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::new(Box::into_raw(r)).unwrap()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<TestNode>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<TestNode>> for TestNode {
    type Key = u32;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum ItemValue {
    Index(usize),
    Random(u32),
}

proptest::prop_compose! {
    fn index_strategy()(
        index in 0usize..1000,
    ) -> ItemValue {
        ItemValue::Index(index)
    }
}

proptest::prop_compose! {
    fn random_strategy()(
        random in 0u32..1000,
    ) -> ItemValue {
        ItemValue::Random(random)
    }
}

fn value_strategy() -> impl Strategy<Value = ItemValue> {
    proptest::prop_oneof![index_strategy(), random_strategy()]
}

// Resolves an item to a key, preferring keys already present so that hits are common.
fn resolve(sorted: &[u32], item: ItemValue) -> u32 {
    match item {
        ItemValue::Index(idx) => {
            if sorted.is_empty() {
                idx as u32
            } else {
                sorted[idx % sorted.len()]
            }
        }
        ItemValue::Random(v) => v,
    }
}

fn insert_sorted(v: &mut Vec<u32>, value: u32) {
    if let Err(idx) = v.binary_search(&value) {
        v.insert(idx, value);
    }
}

fn remove_sorted(v: &mut Vec<u32>, value: u32) {
    if let Ok(idx) = v.binary_search(&value) {
        v.remove(idx);
    }
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum Op {
    Insert(ItemValue),
    Get(ItemValue),
    Remove(ItemValue),
    First,
    PopFirst,
    Last,
    PopLast,
}

impl Op {
    fn finalize(self, sorted: &[u32]) -> FinalOp {
        match self {
            Op::Insert(item) => FinalOp::Insert(resolve(sorted, item)),
            Op::Get(item) => FinalOp::Get(resolve(sorted, item)),
            Op::Remove(item) => FinalOp::Remove(resolve(sorted, item)),
            Op::First => FinalOp::First,
            Op::PopFirst => FinalOp::PopFirst,
            Op::Last => FinalOp::Last,
            Op::PopLast => FinalOp::PopLast,
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum FinalOp {
    Insert(u32),
    Get(u32),
    Remove(u32),
    First,
    PopFirst,
    Last,
    PopLast,
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    proptest::prop_oneof![
        value_strategy().prop_map(Op::Insert),
        value_strategy().prop_map(Op::Get),
        value_strategy().prop_map(Op::Remove),
        Just(Op::First),
        Just(Op::PopFirst),
        Just(Op::Last),
        Just(Op::PopLast),
    ]
}

pub fn run_btree_equivalence(ops: Vec<Op>) {
    let mut sorted_values = Vec::with_capacity(ops.len());
    let mut btree = BTreeSet::new();
    let mut avl: AvlTree<TestNode> = AvlTree::new();

    #[inline]
    #[allow(clippy::boxed_local)]
    fn node_key(node: Box<TestNode>) -> u32 {
        node.key
    }

    #[inline]
    fn ref_key(node: &TestNode) -> &u32 {
        &node.key
    }

    for (op_id, op) in ops.into_iter().enumerate() {
        let final_op = op.finalize(&sorted_values);

        match final_op {
            FinalOp::Insert(value) => {
                insert_sorted(&mut sorted_values, value);

                let from_btree = if btree.insert(value) {
                    None
                } else {
                    Some(value)
                };
                let from_avl = avl.insert(TestNode::new(value)).err().map(node_key);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Get(value) => {
                let from_btree = btree.get(&value);
                let from_avl = avl.get(&value).map(|node| ref_key(node.get_ref()));

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Remove(value) => {
                remove_sorted(&mut sorted_values, value);

                let from_btree = btree.remove(&value).then_some(value);
                let from_avl = avl.remove(&value).map(node_key);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::First => {
                let from_btree = btree.first();
                let from_avl = avl.first().map(|node| ref_key(node.get_ref()));

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopFirst => {
                let from_btree = btree.pop_first();
                let from_avl = avl.pop_first().map(node_key);

                if let Some(value) = from_btree {
                    remove_sorted(&mut sorted_values, value);
                }

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Last => {
                let from_btree = btree.last();
                let from_avl = avl.last().map(|node| ref_key(node.get_ref()));

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopLast => {
                let from_btree = btree.pop_last();
                let from_avl = avl.pop_last().map(node_key);

                if let Some(value) = from_btree {
                    remove_sorted(&mut sorted_values, value);
                }

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }
        }

        avl.assert_invariants();
        assert_eq!(btree.len(), avl.len());
        assert!(btree.iter().eq(avl.iter().map(ref_key)));
        assert!(btree.iter().rev().eq(avl.iter().rev().map(ref_key)));
    }
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum MapOp {
    Insert(ItemValue, u32),
    Emplace(ItemValue, u32),
    Replace(ItemValue, u32),
    Get(ItemValue),
    Remove(ItemValue),
    First,
    Last,
    PopFirst,
    PopLast,
    // Replaces the map with a copy of itself, dropping the original.
    CloneSwap,
}

pub fn map_op_strategy() -> impl Strategy<Value = MapOp> {
    proptest::prop_oneof![
        (value_strategy(), 0u32..1000).prop_map(|(k, v)| MapOp::Insert(k, v)),
        (value_strategy(), 0u32..1000).prop_map(|(k, v)| MapOp::Emplace(k, v)),
        (value_strategy(), 0u32..1000).prop_map(|(k, v)| MapOp::Replace(k, v)),
        value_strategy().prop_map(MapOp::Get),
        value_strategy().prop_map(MapOp::Remove),
        Just(MapOp::First),
        Just(MapOp::Last),
        Just(MapOp::PopFirst),
        Just(MapOp::PopLast),
        Just(MapOp::CloneSwap),
    ]
}

pub fn run_map_equivalence(ops: Vec<MapOp>) {
    let mut sorted_keys = Vec::with_capacity(ops.len());
    let mut btree: BTreeMap<u32, u32> = BTreeMap::new();
    let mut avl: AvlMap<u32, u32> = AvlMap::new();

    for (op_id, op) in ops.into_iter().enumerate() {
        match op {
            MapOp::Insert(item, value) | MapOp::Emplace(item, value) => {
                let key = resolve(&sorted_keys, item);
                insert_sorted(&mut sorted_keys, key);

                let from_btree = match btree.entry(key) {
                    std::collections::btree_map::Entry::Vacant(e) => {
                        e.insert(value);
                        true
                    }
                    std::collections::btree_map::Entry::Occupied(_) => false,
                };
                let from_avl = match op {
                    MapOp::Insert(..) => avl.insert(key, value),
                    _ => avl.emplace_with(key, || value),
                };

                assert_eq!(from_btree, from_avl, "MapOp #{op_id}: {op:?}");
            }

            MapOp::Replace(item, value) => {
                let key = resolve(&sorted_keys, item);
                insert_sorted(&mut sorted_keys, key);

                let from_btree = btree.insert(key, value);
                let from_avl = avl.replace(key, value);

                assert_eq!(from_btree, from_avl, "MapOp #{op_id}: {op:?}");
            }

            MapOp::Get(item) => {
                let key = resolve(&sorted_keys, item);

                assert_eq!(
                    btree.get_key_value(&key),
                    avl.get_key_value(&key),
                    "MapOp #{op_id}: {op:?}"
                );
            }

            MapOp::Remove(item) => {
                let key = resolve(&sorted_keys, item);
                remove_sorted(&mut sorted_keys, key);

                assert_eq!(btree.remove(&key), avl.remove(&key), "MapOp #{op_id}: {op:?}");
            }

            MapOp::First => {
                assert_eq!(
                    btree.first_key_value(),
                    avl.first_key_value(),
                    "MapOp #{op_id}: {op:?}"
                );
            }

            MapOp::Last => {
                assert_eq!(
                    btree.last_key_value(),
                    avl.last_key_value(),
                    "MapOp #{op_id}: {op:?}"
                );
            }

            MapOp::PopFirst => {
                let from_btree = btree.pop_first();
                if let Some((key, _)) = from_btree {
                    remove_sorted(&mut sorted_keys, key);
                }

                assert_eq!(from_btree, avl.pop_first(), "MapOp #{op_id}: {op:?}");
            }

            MapOp::PopLast => {
                let from_btree = btree.pop_last();
                if let Some((key, _)) = from_btree {
                    remove_sorted(&mut sorted_keys, key);
                }

                assert_eq!(from_btree, avl.pop_last(), "MapOp #{op_id}: {op:?}");
            }

            MapOp::CloneSwap => {
                let copy = avl.clone();
                assert_eq!(copy.height(), avl.height(), "MapOp #{op_id}: {op:?}");
                avl = copy;
            }
        }

        avl.assert_invariants();
        assert_eq!(btree.len(), avl.len());
        assert!(btree.iter().eq(avl.iter()));
    }
}

#[derive(Clone, Debug, Arbitrary)]
pub enum CursorOp {
    // Get is not an operation as it's executed on every loop iteration to check equivalence.
    MovePrev,
    MoveNext,
    PeekNext,
    PeekPrev,
    RemoveCurrent,
    RemoveCurrentMovePrev,
}

pub fn cursor_op_strategy() -> impl Strategy<Value = CursorOp> {
    proptest::prop_oneof![
        Just(CursorOp::MovePrev),
        Just(CursorOp::MoveNext),
        Just(CursorOp::PeekNext),
        Just(CursorOp::PeekPrev),
        Just(CursorOp::RemoveCurrent),
        Just(CursorOp::RemoveCurrentMovePrev),
    ]
}

#[derive(Clone, Debug)]
pub struct CursorEquivalenceInput {
    pub values: Vec<u32>,
    pub ops: Vec<CursorOp>,
}

impl<'a> arbitrary::Arbitrary<'a> for CursorEquivalenceInput {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        fn value(u: &mut arbitrary::Unstructured<'_>) -> u32 {
            u32::arbitrary(u).unwrap_or(0)
        }

        fn op(u: &mut arbitrary::Unstructured<'_>) -> CursorOp {
            CursorOp::arbitrary(u).unwrap_or(CursorOp::MoveNext)
        }

        let num_values = u8::arbitrary(u)? % 100;
        let num_ops = u16::arbitrary(u)? % 1000;

        let values = core::iter::repeat_with(|| value(u))
            .take(num_values.into())
            .collect();

        let ops = core::iter::repeat_with(|| op(u))
            .take(num_ops.into())
            .collect();

        Ok(CursorEquivalenceInput { values, ops })
    }
}

pub fn run_cursor_equivalence(mut values: Vec<u32>, ops: Vec<CursorOp>) {
    values.sort_unstable();
    values.dedup();

    let mut vec = Vec::new();
    let mut avl: AvlTree<TestNode> = AvlTree::new();

    for val in values {
        vec.push(val);
        assert!(avl.insert(TestNode::new(val)).is_ok());
    }

    fn vec_curs_prev(v: &[u32], curs: Option<usize>) -> Option<usize> {
        match curs {
            Some(i) => i.checked_sub(1),
            None => v.len().checked_sub(1),
        }
    }

    fn vec_curs_next(v: &[u32], curs: Option<usize>) -> Option<usize> {
        match curs {
            Some(i) => i.checked_add(1).filter(|&i| i < v.len()),
            None => (!v.is_empty()).then_some(0),
        }
    }

    let mut vec_curs = vec_curs_next(&vec, None);
    let mut avl_curs = avl.cursor_first_mut();

    // Check that the initial states are equivalent.
    {
        let v = vec_curs.map(|i| &vec[i]);
        let w = avl_curs.get().map(TestNode::key);

        assert_eq!(v, w);
    }

    for op in ops {
        match op {
            CursorOp::MoveNext => {
                vec_curs = vec_curs_next(&vec, vec_curs);
                avl_curs.move_next();
            }

            CursorOp::MovePrev => {
                vec_curs = vec_curs_prev(&vec, vec_curs);
                avl_curs.move_prev();
            }

            CursorOp::PeekNext => {
                let v = vec_curs_next(&vec, vec_curs).map(|i| &vec[i]);
                let w = avl_curs.peek_next().map(TestNode::key);

                assert_eq!(v, w);
            }

            CursorOp::PeekPrev => {
                let v = vec_curs_prev(&vec, vec_curs).map(|i| &vec[i]);
                let w = avl_curs.peek_prev().map(TestNode::key);

                assert_eq!(v, w);
            }

            CursorOp::RemoveCurrent => {
                let v = vec_curs.map(|i| vec.remove(i));

                if vec_curs == Some(vec.len()) {
                    vec_curs = None;
                }

                let w = avl_curs.remove_current().map(|node| node.key);

                assert_eq!(v, w);
            }

            CursorOp::RemoveCurrentMovePrev => {
                let new_v_curs = vec_curs.map(|i| i.checked_sub(1));
                let v = vec_curs.map(|i| vec.remove(i));

                if let Some(vc) = new_v_curs {
                    vec_curs = vc;
                }

                let w = avl_curs
                    .remove_current_and_move_prev()
                    .map(|node| node.key);

                assert_eq!(v, w);
            }
        }

        let v = vec_curs.map(|i| &vec[i]);
        let w = avl_curs.get().map(TestNode::key);

        assert_eq!(v, w);
    }

    drop(avl_curs);
    avl.assert_invariants();
    assert!(vec.iter().eq(avl.iter().map(TestNode::key)));
}
