use std::ptr::NonNull;

use cordyceps::Linked;
use cordyceps_avl::{AvlMap, AvlTree, Links, TreeNode};

#[derive(Debug)]
#[repr(C)]
struct DemoNode {
    links: Links<DemoNode>,
    key: u32,
}

impl DemoNode {
    fn new(key: u32) -> Box<DemoNode> {
        Box::new(DemoNode {
            links: Links::new(),
            key,
        })
    }
}

unsafe impl Linked<Links<DemoNode>> for DemoNode {
    type Handle = Box<DemoNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::from(Box::leak(r))
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<DemoNode>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<DemoNode>> for DemoNode {
    type Key = u32;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

fn print_keys(tree: &AvlTree<DemoNode>) {
    println!("{:?}", tree.iter().map(|node| node.key).collect::<Vec<_>>());
}

fn main() -> std::fmt::Result {
    let mut tree: AvlTree<DemoNode> = AvlTree::new();

    for key in [5, 3, 8, 1, 4, 7, 9] {
        if let Err(node) = tree.insert(DemoNode::new(key)) {
            println!("{} already present", node.key);
        }
        tree.assert_invariants();
        print_keys(&tree);
    }

    if let Err(node) = tree.insert(DemoNode::new(4)) {
        println!("{} already present", node.key);
    }

    if let Some(node) = tree.remove(&5) {
        println!("removed {}", node.key);
    }
    tree.assert_invariants();
    print_keys(&tree);

    let mut graph = String::new();
    tree.dotgraph("demo", &mut graph)?;
    println!("{graph}");

    let mut map: AvlMap<u32, &str> = AvlMap::new();
    map.insert(2, "two");
    map.insert(1, "one");
    map.insert(3, "three");
    map.emplace_with(1, || "uno");

    println!("{map:?}");
    println!("reversed: {:?}", map.iter().rev().collect::<Vec<_>>());

    Ok(())
}
