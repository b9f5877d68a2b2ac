//! Pooled AVL tree used as an ordered index.
//!
//! Trees do not own their nodes. Every node lives in a [`Pool`] that is owned by
//! whoever owns the trees (the solver keeps one pool for all of its literal
//! columns), so freeing a tree hands its nodes back for reuse instead of to the
//! allocator. All tree operations therefore take the pool as an argument.

use std::cmp::Ordering;
use std::marker::PhantomData;
use thiserror::Error;

/// Ordering used by a tree to compare its keys.
pub trait Comparator<K> {
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// Compares keys with their [`Ord`] implementation.
#[derive(Clone, Copy, Debug, Default)]
pub struct Natural;

impl<K: Ord> Comparator<K> for Natural {
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

impl<K, F> Comparator<K> for F
where
    F: Fn(&K, &K) -> Ordering,
{
    fn compare(&self, a: &K, b: &K) -> Ordering {
        self(a, b)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct NodeId(usize);

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    left: Option<NodeId>,
    right: Option<NodeId>,
    height: u32,
}

/// Node arena shared by any number of trees.
#[derive(Debug)]
pub struct Pool<K, V> {
    nodes: Vec<Option<Node<K, V>>>,
    free: Vec<NodeId>,
    buffers: Vec<Vec<(K, V)>>,
    live: usize,
}

impl<K, V> Default for Pool<K, V> {
    fn default() -> Self {
        Self {
            nodes: vec![],
            free: vec![],
            buffers: vec![],
            live: 0,
        }
    }
}

impl<K, V> Pool<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes currently in use by some tree.
    pub fn live_nodes(&self) -> usize {
        self.live
    }

    /// Number of node slots waiting on the free list.
    pub fn cached_nodes(&self) -> usize {
        self.free.len()
    }

    /// Releases cached memory. Node slots are only dropped when no tree holds a node.
    pub fn cleanup(&mut self) {
        self.buffers.clear();
        if self.live == 0 {
            self.nodes.clear();
            self.free.clear();
        }
    }

    fn alloc(&mut self, key: K, value: V) -> NodeId {
        let node = Node {
            key,
            value,
            left: None,
            right: None,
            height: 1,
        };
        self.live += 1;
        match self.free.pop() {
            Some(id) => {
                self.nodes[id.0] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    fn release(&mut self, id: NodeId) -> Node<K, V> {
        let node = self.nodes[id.0].take().expect("released a free node");
        self.free.push(id);
        self.live -= 1;
        node
    }

    fn node(&self, id: NodeId) -> &Node<K, V> {
        self.nodes[id.0].as_ref().expect("dangling node id")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<K, V> {
        self.nodes[id.0].as_mut().expect("dangling node id")
    }

    fn height(&self, id: Option<NodeId>) -> u32 {
        id.map_or(0, |id| self.node(id).height)
    }

    fn balance(&self, id: NodeId) -> i64 {
        let node = self.node(id);
        self.height(node.left) as i64 - self.height(node.right) as i64
    }

    fn fix_height(&mut self, id: NodeId) {
        let (left, right) = {
            let node = self.node(id);
            (node.left, node.right)
        };
        let height = 1 + self.height(left).max(self.height(right));
        self.node_mut(id).height = height;
    }

    fn rotate_right(&mut self, id: NodeId) -> NodeId {
        let pivot = self.node(id).left.expect("rotate_right without left child");
        let inner = self.node(pivot).right;
        self.node_mut(id).left = inner;
        self.node_mut(pivot).right = Some(id);
        self.fix_height(id);
        self.fix_height(pivot);
        pivot
    }

    fn rotate_left(&mut self, id: NodeId) -> NodeId {
        let pivot = self.node(id).right.expect("rotate_left without right child");
        let inner = self.node(pivot).left;
        self.node_mut(id).right = inner;
        self.node_mut(pivot).left = Some(id);
        self.fix_height(id);
        self.fix_height(pivot);
        pivot
    }

    /// Restores the AVL condition at `id`, returning the root of the subtree.
    fn rebalance(&mut self, id: NodeId) -> NodeId {
        self.fix_height(id);
        let balance = self.balance(id);
        if balance > 1 {
            let left = self.node(id).left.expect("left-heavy node without left child");
            if self.balance(left) < 0 {
                let new_left = self.rotate_left(left);
                self.node_mut(id).left = Some(new_left);
            }
            self.rotate_right(id)
        } else if balance < -1 {
            let right = self.node(id).right.expect("right-heavy node without right child");
            if self.balance(right) > 0 {
                let new_right = self.rotate_right(right);
                self.node_mut(id).right = Some(new_right);
            }
            self.rotate_left(id)
        } else {
            id
        }
    }

    fn take_buffer(&mut self) -> Vec<(K, V)> {
        self.buffers.pop().unwrap_or_default()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AvlError {
    #[error("node at depth {depth} has balance factor {balance}")]
    Unbalanced { depth: usize, balance: i64 },
    #[error("node at depth {depth} records height {recorded}, actual {actual}")]
    BadHeight { depth: usize, recorded: u32, actual: u32 },
    #[error("keys out of order at depth {depth}")]
    OutOfOrder { depth: usize },
    #[error("tree records {recorded} entries but holds {actual}")]
    BadCount { recorded: usize, actual: usize },
}

/// An AVL tree whose nodes live in a [`Pool`].
#[derive(Debug)]
pub struct AvlTree<K, V, C = Natural> {
    root: Option<NodeId>,
    count: usize,
    modified: bool,
    compare: C,
    _entries: PhantomData<fn() -> (K, V)>,
}

impl<K, V, C: Default> Default for AvlTree<K, V, C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}

impl<K, V, C> AvlTree<K, V, C> {
    pub fn new(compare: C) -> Self {
        Self {
            root: None,
            count: 0,
            modified: false,
            compare,
            _entries: PhantomData,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether the tree has been inserted into since the last call to [`AvlTree::iter`].
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Returns every node to the pool, handing each entry to `f` in post-order.
    pub fn free_with(&mut self, pool: &mut Pool<K, V>, mut f: impl FnMut(K, V)) {
        let mut stack = vec![];
        let mut order = vec![];
        stack.extend(self.root.take());
        while let Some(id) = stack.pop() {
            order.push(id);
            let node = pool.node(id);
            stack.extend(node.left);
            stack.extend(node.right);
        }
        // `order` is root, right, left reversed into left, right, root.
        for id in order.into_iter().rev() {
            let node = pool.release(id);
            f(node.key, node.value);
        }
        self.count = 0;
        self.modified = true;
    }

    pub fn free(&mut self, pool: &mut Pool<K, V>) {
        self.free_with(pool, |_, _| {})
    }
}

impl<K, V, C: Comparator<K>> AvlTree<K, V, C> {
    /// Inserts `key`, returning `true` if it was already present (in which case
    /// neither the tree nor `value` is stored).
    pub fn insert(&mut self, pool: &mut Pool<K, V>, key: K, value: V) -> bool {
        let mut path: Vec<(NodeId, Ordering)> = vec![];
        let mut link = self.root;
        while let Some(id) = link {
            let node = pool.node(id);
            match self.compare.compare(&key, &node.key) {
                Ordering::Equal => return true,
                Ordering::Less => {
                    path.push((id, Ordering::Less));
                    link = node.left;
                }
                Ordering::Greater => {
                    path.push((id, Ordering::Greater));
                    link = node.right;
                }
            }
        }

        let leaf = pool.alloc(key, value);
        self.attach(pool, &path, path.len(), leaf);
        self.count += 1;
        self.modified = true;

        for depth in (0..path.len()).rev() {
            let (id, _) = path[depth];
            let subtree = pool.rebalance(id);
            if subtree != id {
                self.attach(pool, &path, depth, subtree);
            }
        }
        false
    }

    /// Links `child` below the node at `path[depth - 1]`, or makes it the root.
    fn attach(&mut self, pool: &mut Pool<K, V>, path: &[(NodeId, Ordering)], depth: usize, child: NodeId) {
        if depth == 0 {
            self.root = Some(child);
            return;
        }
        let (parent, dir) = path[depth - 1];
        let parent = pool.node_mut(parent);
        match dir {
            Ordering::Less => parent.left = Some(child),
            _ => parent.right = Some(child),
        }
    }

    pub fn lookup<'p>(&self, pool: &'p Pool<K, V>, key: &K) -> Option<&'p V> {
        let mut link = self.root;
        while let Some(id) = link {
            let node = pool.node(id);
            match self.compare.compare(key, &node.key) {
                Ordering::Equal => return Some(&node.value),
                Ordering::Less => link = node.left,
                Ordering::Greater => link = node.right,
            }
        }
        None
    }

    pub fn is_member(&self, pool: &Pool<K, V>, key: &K) -> bool {
        self.lookup(pool, key).is_some()
    }

    /// Validates heights, balance, ordering, and the entry count.
    pub fn check(&self, pool: &Pool<K, V>) -> Result<(), AvlError> {
        // (node, depth, children visited)
        let mut stack = vec![];
        let mut heights: Vec<u32> = vec![];
        let mut seen = 0;
        stack.extend(self.root.map(|id| (id, 0, false)));
        while let Some((id, depth, expanded)) = stack.pop() {
            let node = pool.node(id);
            if !expanded {
                stack.push((id, depth, true));
                stack.extend(node.right.map(|r| (r, depth + 1, false)));
                stack.extend(node.left.map(|l| (l, depth + 1, false)));
                continue;
            }
            let right = if node.right.is_some() { heights.pop().unwrap_or(0) } else { 0 };
            let left = if node.left.is_some() { heights.pop().unwrap_or(0) } else { 0 };
            if let Some(l) = node.left {
                if self.compare.compare(&pool.node(l).key, &node.key) != Ordering::Less {
                    return Err(AvlError::OutOfOrder { depth });
                }
            }
            if let Some(r) = node.right {
                if self.compare.compare(&pool.node(r).key, &node.key) != Ordering::Greater {
                    return Err(AvlError::OutOfOrder { depth });
                }
            }
            let actual = 1 + left.max(right);
            if node.height != actual {
                return Err(AvlError::BadHeight {
                    depth,
                    recorded: node.height,
                    actual,
                });
            }
            let balance = left as i64 - right as i64;
            if balance.abs() > 1 {
                return Err(AvlError::Unbalanced { depth, balance });
            }
            heights.push(actual);
            seen += 1;
        }
        if seen != self.count {
            return Err(AvlError::BadCount {
                recorded: self.count,
                actual: seen,
            });
        }
        // Local child ordering is not enough; the full walk must also be sorted.
        let mut previous: Option<&K> = None;
        for key in self.keys_in_order(pool) {
            if let Some(prev) = previous {
                if self.compare.compare(prev, key) != Ordering::Less {
                    return Err(AvlError::OutOfOrder { depth: 0 });
                }
            }
            previous = Some(key);
        }
        Ok(())
    }

    fn keys_in_order<'p>(&self, pool: &'p Pool<K, V>) -> Vec<&'p K> {
        let mut keys = Vec::with_capacity(self.count);
        walk(pool, self.root, Direction::Forward, |node| keys.push(&node.key));
        keys
    }
}

impl<K: Clone, V: Clone, C> AvlTree<K, V, C> {
    /// Snapshots the tree into an iterator. The snapshot's buffer comes from the
    /// pool and should be given back with [`Iter::close`].
    pub fn iter(&mut self, pool: &mut Pool<K, V>, direction: Direction) -> Iter<K, V> {
        let mut entries = pool.take_buffer();
        entries.clear();
        walk(pool, self.root, direction, |node| {
            entries.push((node.key.clone(), node.value.clone()))
        });
        self.modified = false;
        Iter { entries, next: 0 }
    }
}

/// In-order (or reverse in-order) walk with an explicit stack.
fn walk<'p, K, V>(pool: &'p Pool<K, V>, root: Option<NodeId>, direction: Direction, mut visit: impl FnMut(&'p Node<K, V>)) {
    let children = |node: &Node<K, V>| match direction {
        Direction::Forward => (node.left, node.right),
        Direction::Backward => (node.right, node.left),
    };
    let mut stack = vec![];
    let mut link = root;
    loop {
        while let Some(id) = link {
            stack.push(id);
            link = children(pool.node(id)).0;
        }
        match stack.pop() {
            Some(id) => {
                let node = pool.node(id);
                visit(node);
                link = children(node).1;
            }
            None => break,
        }
    }
}

/// A finite snapshot of a tree's entries.
#[derive(Debug)]
pub struct Iter<K, V> {
    entries: Vec<(K, V)>,
    next: usize,
}

impl<K: Clone, V: Clone> Iterator for Iter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.get(self.next).cloned();
        if entry.is_some() {
            self.next += 1;
        }
        entry
    }
}

impl<K, V> Iter<K, V> {
    pub fn len(&self) -> usize {
        self.entries.len() - self.next
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn close(mut self, pool: &mut Pool<K, V>) {
        self.entries.clear();
        pool.buffers.push(self.entries);
    }
}
