// Copyright 2025 The Weft Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A persistent B-tree suitable for ropes over arbitrary leaf types.

use std::cmp::{min, Ordering};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::interval::{Interval, IntervalBounds};

const MIN_CHILDREN: usize = 4;
const MAX_CHILDREN: usize = 8;

/// Aggregate information computed over a subtree.
///
/// The `accumulate` operation together with the identity derived from the
/// default leaf forms a monoid, and `compute_info` is a monoid homomorphism
/// from leaf concatenation: combining the info of two leaves must equal the
/// info of their concatenation. Everything the tree can answer in O(log n)
/// flows from this property.
pub trait NodeInfo<L: Leaf>: Clone {
    /// Fold `other` (the info of a right sibling) into `self`.
    fn accumulate(&mut self, other: &Self);

    /// Derive the info of a single leaf.
    fn compute_info(leaf: &L) -> Self;

    /// The monoid identity, derived from the default (empty) leaf.
    fn identity() -> Self {
        Self::compute_info(&L::default())
    }
}

/// A leaf of a [`Node`] tree.
///
/// Leaves are sized in "base units", the smallest unit by which the concrete
/// type can be indexed — segments for a segment rope, bytes for a string
/// rope. Two leaves can be combined with `push_maybe_split`, which is also
/// where a leaf type gets to normalize adjacency (e.g. coalescing mergeable
/// runs) because every structural edit funnels through it.
pub trait Leaf: Sized + Clone + Default {
    /// Length in base units.
    fn len(&self) -> usize;

    /// Whether this leaf meets the minimum-size requirement to be a child
    /// of a well-formed internal node.
    fn is_ok_child(&self) -> bool;

    /// Append the part of `other` selected by `iv` (in `other`'s base
    /// units), splitting off and returning a new rightmost leaf if the
    /// result would exceed the maximum size.
    ///
    /// Invariants: no split when either input is empty; if either input
    /// satisfies `is_ok_child`, both the receiver and any split-off leaf
    /// satisfy it on return.
    fn push_maybe_split(&mut self, other: &Self, iv: Interval) -> Option<Self>;

    /// The sub-leaf selected by `iv`.
    fn subseq(&self, iv: Interval) -> Self {
        let mut result = Self::default();
        if result.push_maybe_split(self, iv).is_some() {
            panic!("unexpected split");
        }
        result
    }
}

/// A node of a persistent B-tree, storing leaves at the bottom and cached
/// [`NodeInfo`] at every level.
///
/// Nodes are reference counted with copy-on-write semantics: cloning is
/// O(1), old roots stay valid across edits (which is what makes an undo
/// snapshot a single pointer), and in-place mutation happens only behind a
/// unique reference.
#[derive(Clone)]
pub struct Node<N: NodeInfo<L>, L: Leaf>(Arc<NodeBody<N, L>>);

#[derive(Clone)]
struct NodeBody<N: NodeInfo<L>, L: Leaf> {
    height: usize,
    len: usize,
    info: N,
    val: NodeVal<N, L>,
}

#[derive(Clone)]
enum NodeVal<N: NodeInfo<L>, L: Leaf> {
    Leaf(L),
    Internal(Vec<Node<N, L>>),
}

/// Translation between base units and a derived unit of measurement.
///
/// A metric maps the info monoid to a scalar (`measure`) and locates the
/// boundaries of that scalar inside a leaf. The cursor and the conversion
/// routines are parametrized over this trait, so one tree can be addressed
/// by any number of measures (width, line starts, markers) at once.
pub trait Metric<N: NodeInfo<L>, L: Leaf> {
    /// The size of a subtree with the given info, in measured units.
    /// `len` is the subtree size in base units.
    fn measure(info: &N, len: usize) -> usize;

    /// The smallest base-unit offset in `l` corresponding to a measured
    /// offset.
    fn to_base_units(l: &L, in_measured_units: usize) -> usize;

    /// The measured offset at a base-unit offset in `l`.
    fn from_base_units(l: &L, in_base_units: usize) -> usize;

    /// Whether the base-unit offset is a boundary of this metric. A
    /// boundary at the end of a leaf must be reported; one at the beginning
    /// may be deferred to the previous leaf.
    fn is_boundary(l: &L, offset: usize) -> bool;

    /// The nearest boundary strictly before `offset`, in base units.
    fn prev(l: &L, offset: usize) -> Option<usize>;

    /// The nearest boundary strictly after `offset`, in base units.
    fn next(l: &L, offset: usize) -> Option<usize>;

    /// Whether a measured unit can span leaf boundaries.
    fn can_fragment() -> bool;
}

impl<N: NodeInfo<L>, L: Leaf> Node<N, L> {
    pub fn from_leaf(l: L) -> Node<N, L> {
        let len = l.len();
        let info = N::compute_info(&l);
        Node(Arc::new(NodeBody { height: 0, len, info, val: NodeVal::Leaf(l) }))
    }

    /// Build an internal node from children that already satisfy the
    /// balancing requirements: between 2 and `MAX_CHILDREN` nodes, all the
    /// same height, all `is_ok_child`.
    fn from_nodes(nodes: Vec<Node<N, L>>) -> Node<N, L> {
        debug_assert!(nodes.len() > 1);
        debug_assert!(nodes.len() <= MAX_CHILDREN);
        let height = nodes[0].height() + 1;
        debug_assert!(nodes[0].is_ok_child());
        let mut len = nodes[0].len();
        let mut info = nodes[0].0.info.clone();
        for child in &nodes[1..] {
            debug_assert_eq!(child.height() + 1, height);
            debug_assert!(child.is_ok_child());
            len += child.len();
            info.accumulate(&child.0.info);
        }
        Node(Arc::new(NodeBody { height, len, info, val: NodeVal::Internal(nodes) }))
    }

    /// Length in base units.
    pub fn len(&self) -> usize {
        self.0.len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether both nodes share the same underlying allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The aggregate info of the whole subtree.
    pub fn info(&self) -> &N {
        &self.0.info
    }

    pub(crate) fn height(&self) -> usize {
        self.0.height
    }

    fn is_leaf(&self) -> bool {
        self.height() == 0
    }

    fn interval(&self) -> Interval {
        Interval::new(0, self.len())
    }

    fn get_children(&self) -> &[Node<N, L>] {
        match self.0.val {
            NodeVal::Internal(ref v) => v,
            NodeVal::Leaf(_) => panic!("get_children called on leaf node"),
        }
    }

    pub(crate) fn get_leaf(&self) -> &L {
        match self.0.val {
            NodeVal::Leaf(ref l) => l,
            NodeVal::Internal(_) => panic!("get_leaf called on internal node"),
        }
    }

    /// Mutate the leaf behind a unique reference, recomputing cached len
    /// and info afterwards.
    fn with_leaf_mut<T>(&mut self, f: impl FnOnce(&mut L) -> T) -> T {
        let body = Arc::make_mut(&mut self.0);
        match body.val {
            NodeVal::Leaf(ref mut l) => {
                let result = f(l);
                body.len = l.len();
                body.info = N::compute_info(l);
                result
            }
            NodeVal::Internal(_) => panic!("with_leaf_mut called on internal node"),
        }
    }

    fn is_ok_child(&self) -> bool {
        match self.0.val {
            NodeVal::Leaf(ref l) => l.is_ok_child(),
            NodeVal::Internal(ref nodes) => nodes.len() >= MIN_CHILDREN,
        }
    }

    /// Combine two runs of equal-height nodes into a single node one level
    /// up, splitting into two internal nodes when the combined run is too
    /// wide. The split leans left; both halves satisfy `is_ok_child`.
    fn merge_nodes(children1: &[Node<N, L>], children2: &[Node<N, L>]) -> Node<N, L> {
        let n_children = children1.len() + children2.len();
        if n_children <= MAX_CHILDREN {
            Node::from_nodes([children1, children2].concat())
        } else {
            let splitpoint = min(MAX_CHILDREN, n_children - MIN_CHILDREN);
            let mut iter = children1.iter().chain(children2.iter()).cloned();
            let left = iter.by_ref().take(splitpoint).collect();
            let right = iter.collect();
            Node::from_nodes(vec![Node::from_nodes(left), Node::from_nodes(right)])
        }
    }

    /// Merge two leaf nodes, letting the leaf type coalesce across the seam
    /// when one side is undersized.
    fn merge_leaves(mut rope1: Node<N, L>, rope2: Node<N, L>) -> Node<N, L> {
        debug_assert!(rope1.is_leaf() && rope2.is_leaf());
        if rope1.get_leaf().is_ok_child() && rope2.get_leaf().is_ok_child() {
            return Node::from_nodes(vec![rope1, rope2]);
        }
        let leaf2_iv = Interval::new(0, rope2.len());
        let split = {
            let leaf2 = rope2.get_leaf();
            rope1.with_leaf_mut(|leaf1| leaf1.push_maybe_split(leaf2, leaf2_iv))
        };
        match split {
            Some(new) => Node::from_nodes(vec![rope1, Node::from_leaf(new)]),
            None => rope1,
        }
    }

    /// Concatenate two trees of arbitrary heights into one balanced tree.
    ///
    /// The shorter tree is folded into the facing spine of the taller one;
    /// untouched subtrees are shared, not copied.
    pub fn concat(rope1: Node<N, L>, rope2: Node<N, L>) -> Node<N, L> {
        let h1 = rope1.height();
        let h2 = rope2.height();

        match h1.cmp(&h2) {
            Ordering::Less => {
                let children2 = rope2.get_children();
                if h1 == h2 - 1 && rope1.is_ok_child() {
                    return Node::merge_nodes(&[rope1], children2);
                }
                let newrope = Node::concat(rope1, children2[0].clone());
                if newrope.height() == h2 - 1 {
                    Node::merge_nodes(&[newrope], &children2[1..])
                } else {
                    Node::merge_nodes(newrope.get_children(), &children2[1..])
                }
            }
            Ordering::Equal => {
                if rope1.is_ok_child() && rope2.is_ok_child() {
                    return Node::from_nodes(vec![rope1, rope2]);
                }
                if h1 == 0 {
                    return Node::merge_leaves(rope1, rope2);
                }
                Node::merge_nodes(rope1.get_children(), rope2.get_children())
            }
            Ordering::Greater => {
                let children1 = rope1.get_children();
                if h2 == h1 - 1 && rope2.is_ok_child() {
                    return Node::merge_nodes(children1, &[rope2]);
                }
                let lastix = children1.len() - 1;
                let newrope = Node::concat(children1[lastix].clone(), rope2);
                if newrope.height() == h1 - 1 {
                    Node::merge_nodes(&children1[..lastix], &[newrope])
                } else {
                    Node::merge_nodes(&children1[..lastix], newrope.get_children())
                }
            }
        }
    }

    /// The size of the tree in the given metric.
    pub fn measure<M: Metric<N, L>>(&self) -> usize {
        M::measure(&self.0.info, self.0.len)
    }

    /// A new tree holding the subsequence selected by `iv`; untouched
    /// subtrees are shared with `self`.
    pub fn subseq<T: IntervalBounds>(&self, iv: T) -> Node<N, L> {
        let iv = iv.into_interval(self.len());
        let mut b = TreeBuilder::new();
        b.push_slice(self, iv);
        b.build()
    }

    /// Replace the subsequence selected by `iv` with `new`. This is the
    /// universal structural edit: insert (empty `iv`), delete (empty
    /// `new`), and splice all reduce to it.
    pub fn edit<T, IV>(&mut self, iv: IV, new: T)
    where
        T: Into<Node<N, L>>,
        IV: IntervalBounds,
    {
        let mut b = TreeBuilder::new();
        let iv = iv.into_interval(self.len());
        let self_iv = self.interval();
        b.push_slice(self, self_iv.prefix(iv));
        b.push(new.into());
        b.push_slice(self, self_iv.suffix(iv));
        *self = b.build();
        self.debug_assert_consistent();
    }

    #[inline]
    fn debug_assert_consistent(&self) {
        #[cfg(debug_assertions)]
        {
            if self.height() > 0 {
                let total: usize = self.get_children().iter().map(Node::len).sum();
                debug_assert_eq!(total, self.len(), "child lengths must sum to parent length");
            }
        }
    }

    /// Convert a prefix measured in `M1` into its measure in `M2`,
    /// descending once. Does not handle the endpoint of a fragmenting
    /// metric specially; callers that need the endpoint handle it
    /// themselves.
    pub fn convert_metrics<M1: Metric<N, L>, M2: Metric<N, L>>(&self, mut m1: usize) -> usize {
        if m1 == 0 {
            return 0;
        }
        // A fragmenting metric must land on the leaf containing the
        // boundary; otherwise landing at the start of the following leaf
        // is cheaper.
        let m1_fudge = if M1::can_fragment() { 1 } else { 0 };
        let mut m2 = 0;
        let mut node = self;
        while node.height() > 0 {
            for child in node.get_children() {
                let child_m1 = child.measure::<M1>();
                if m1 < child_m1 + m1_fudge {
                    node = child;
                    break;
                }
                m2 += child.measure::<M2>();
                m1 -= child_m1;
            }
        }
        let l = node.get_leaf();
        let base = M1::to_base_units(l, m1);
        m2 + M2::from_base_units(l, base)
    }

    /// The number of `M` boundaries in the first `offset` base units.
    pub fn count<M: Metric<N, L>>(&self, offset: usize) -> usize {
        self.convert_metrics::<BaseMetric<N, L>, M>(offset)
    }

    /// The base-unit offset of the `offset`-th `M` boundary.
    pub fn count_base_units<M: Metric<N, L>>(&self, offset: usize) -> usize {
        self.convert_metrics::<M, BaseMetric<N, L>>(offset)
    }
}

impl<N: NodeInfo<L>, L: Leaf> Default for Node<N, L> {
    fn default() -> Node<N, L> {
        Node::from_leaf(L::default())
    }
}

impl<N: NodeInfo<L>, L: Leaf> From<L> for Node<N, L> {
    fn from(leaf: L) -> Node<N, L> {
        Node::from_leaf(leaf)
    }
}

/// The identity metric: base units measure themselves, and every base-unit
/// offset is a boundary.
pub struct BaseMetric<N, L>(PhantomData<(N, L)>);

impl<N: NodeInfo<L>, L: Leaf> Metric<N, L> for BaseMetric<N, L> {
    fn measure(_: &N, len: usize) -> usize {
        len
    }

    fn to_base_units(_: &L, in_measured_units: usize) -> usize {
        in_measured_units
    }

    fn from_base_units(_: &L, in_base_units: usize) -> usize {
        in_base_units
    }

    fn is_boundary(_: &L, _: usize) -> bool {
        true
    }

    fn prev(_: &L, offset: usize) -> Option<usize> {
        if offset == 0 {
            None
        } else {
            Some(offset - 1)
        }
    }

    fn next(l: &L, offset: usize) -> Option<usize> {
        if offset == l.len() {
            None
        } else {
            Some(offset + 1)
        }
    }

    fn can_fragment() -> bool {
        false
    }
}

/// An append-only builder producing balanced trees.
///
/// The stack holds partially built runs in strictly descending height;
/// every vector is non-empty, shorter than `MAX_CHILDREN`, and (when longer
/// than one) contains only `is_ok_child` nodes.
pub struct TreeBuilder<N: NodeInfo<L>, L: Leaf> {
    stack: Vec<Vec<Node<N, L>>>,
}

impl<N: NodeInfo<L>, L: Leaf> TreeBuilder<N, L> {
    pub fn new() -> TreeBuilder<N, L> {
        TreeBuilder { stack: Vec::new() }
    }

    /// Append a whole tree.
    pub fn push(&mut self, mut n: Node<N, L>) {
        loop {
            let ord = match self.stack.last() {
                Some(last) => last[0].height().cmp(&n.height()),
                None => Ordering::Greater,
            };
            match ord {
                Ordering::Less => {
                    n = Node::concat(self.pop(), n);
                }
                Ordering::Equal => {
                    let tos = self.stack.last_mut().unwrap();
                    if tos.last().unwrap().is_ok_child() && n.is_ok_child() {
                        tos.push(n);
                    } else if n.height() == 0 {
                        let iv = Interval::new(0, n.len());
                        let new_leaf = tos
                            .last_mut()
                            .unwrap()
                            .with_leaf_mut(|l| l.push_maybe_split(n.get_leaf(), iv));
                        if let Some(new_leaf) = new_leaf {
                            tos.push(Node::from_leaf(new_leaf));
                        }
                    } else {
                        let last = tos.pop().unwrap();
                        let mut children = last.get_children().to_vec();
                        children.extend(n.get_children().iter().cloned());
                        if children.len() <= MAX_CHILDREN {
                            tos.push(Node::from_nodes(children));
                        } else {
                            let splitpoint = min(MAX_CHILDREN, children.len() - MIN_CHILDREN);
                            let right = children.split_off(splitpoint);
                            tos.push(Node::from_nodes(children));
                            tos.push(Node::from_nodes(right));
                        }
                    }
                    if self.stack.last().map(Vec::len).unwrap_or(0) < MAX_CHILDREN {
                        break;
                    }
                    n = self.pop()
                }
                Ordering::Greater => {
                    self.stack.push(vec![n]);
                    break;
                }
            }
        }
    }

    /// Append the subsequence of `n` selected by `iv`, sharing whole
    /// subtrees wherever the interval covers them.
    pub fn push_slice(&mut self, n: &Node<N, L>, iv: Interval) {
        if iv.is_empty() {
            return;
        }
        if iv == n.interval() {
            self.push(n.clone());
            return;
        }
        match n.0.val {
            NodeVal::Leaf(ref l) => self.push_leaf_slice(l, iv),
            NodeVal::Internal(ref v) => {
                let mut offset = 0;
                for child in v {
                    if iv.is_before(offset) {
                        break;
                    }
                    let child_iv = child.interval();
                    let rec_iv = iv.intersect(child_iv.translate(offset)).translate_neg(offset);
                    self.push_slice(child, rec_iv);
                    offset += child.len();
                }
            }
        }
    }

    pub fn push_leaves(&mut self, leaves: impl IntoIterator<Item = L>) {
        for leaf in leaves {
            self.push(Node::from_leaf(leaf));
        }
    }

    pub fn push_leaf(&mut self, l: L) {
        self.push(Node::from_leaf(l))
    }

    pub fn push_leaf_slice(&mut self, l: &L, iv: Interval) {
        self.push(Node::from_leaf(l.subseq(iv)))
    }

    /// Finish, concatenating everything pushed in order.
    pub fn build(mut self) -> Node<N, L> {
        if self.stack.is_empty() {
            Node::from_leaf(L::default())
        } else {
            let mut n = self.pop();
            while !self.stack.is_empty() {
                n = Node::concat(self.pop(), n);
            }
            n
        }
    }

    fn pop(&mut self) -> Node<N, L> {
        let nodes = self.stack.pop().unwrap();
        if nodes.len() == 1 {
            nodes.into_iter().next().unwrap()
        } else {
            Node::from_nodes(nodes)
        }
    }
}

impl<N: NodeInfo<L>, L: Leaf> Default for TreeBuilder<N, L> {
    fn default() -> Self {
        TreeBuilder::new()
    }
}

const CURSOR_CACHE_SIZE: usize = 4;

/// A position in a tree, addressable by any [`Metric`].
///
/// The cursor caches the tail of the root-to-leaf path so sequential
/// boundary iteration is amortized O(1) without allocating. It is valid
/// when created or `set`; `prev`/`next` invalidate it when they run off
/// the ends.
pub struct Cursor<'a, N: NodeInfo<L> + 'a, L: Leaf> {
    /// The tree being traversed.
    root: &'a Node<N, L>,
    /// Current position in base units, always `<= root.len()`.
    position: usize,
    /// Bottom-up path tail: `cache[0]` is the leaf's parent and the leaf's
    /// index within it.
    cache: [Option<(&'a Node<N, L>, usize)>; CURSOR_CACHE_SIZE],
    /// The leaf containing the position, when valid. The position is at
    /// the leaf end only at the end of the tree.
    leaf: Option<&'a L>,
    /// Offset of `leaf` within the tree.
    offset_of_leaf: usize,
}

impl<'a, N: NodeInfo<L>, L: Leaf> Cursor<'a, N, L> {
    pub fn new(n: &'a Node<N, L>, position: usize) -> Cursor<'a, N, L> {
        let mut result = Cursor {
            root: n,
            position,
            cache: [None; CURSOR_CACHE_SIZE],
            leaf: None,
            offset_of_leaf: 0,
        };
        result.descend();
        result
    }

    pub fn total_len(&self) -> usize {
        self.root.len()
    }

    pub fn root(&self) -> &'a Node<N, L> {
        self.root
    }

    /// The current leaf and the position's offset within it, when valid.
    pub fn get_leaf(&self) -> Option<(&'a L, usize)> {
        self.leaf.map(|l| (l, self.position - self.offset_of_leaf))
    }

    /// Reposition the cursor; it is valid afterwards.
    ///
    /// Precondition: `position <= root.len()`.
    pub fn set(&mut self, position: usize) {
        self.position = position;
        if let Some(l) = self.leaf {
            if self.position >= self.offset_of_leaf
                && self.position < self.offset_of_leaf + l.len()
            {
                return;
            }
        }
        self.descend();
    }

    pub fn pos(&self) -> usize {
        self.position
    }

    /// Whether the current position is a boundary of `M`.
    pub fn is_boundary<M: Metric<N, L>>(&mut self) -> bool {
        if self.leaf.is_none() {
            return false;
        }
        if self.position == self.offset_of_leaf && !M::can_fragment() {
            return true;
        }
        if self.position == 0 || self.position > self.offset_of_leaf {
            return M::is_boundary(self.leaf.unwrap(), self.position - self.offset_of_leaf);
        }
        // At the start of a leaf the boundary belongs to the end of the
        // previous one.
        let l = self.prev_leaf().unwrap().0;
        let result = M::is_boundary(l, l.len());
        let _ = self.next_leaf();
        result
    }

    /// Move to the previous `M` boundary, or invalidate if there is none.
    pub fn prev<M: Metric<N, L>>(&mut self) -> Option<usize> {
        if self.position == 0 || self.leaf.is_none() {
            self.leaf = None;
            return None;
        }
        let orig_pos = self.position;
        let offset_in_leaf = orig_pos - self.offset_of_leaf;
        if offset_in_leaf > 0 {
            let l = self.leaf.unwrap();
            if let Some(offset_in_leaf) = M::prev(l, offset_in_leaf) {
                self.position = self.offset_of_leaf + offset_in_leaf;
                return Some(self.position);
            }
        }

        // Not in this leaf; scan backwards.
        self.prev_leaf()?;
        if let Some(offset) = self.last_inside_leaf::<M>(orig_pos) {
            return Some(offset);
        }

        // The previous leaf had no boundary either; jump by measure.
        let measure = self.measure_leaf::<M>(self.position);
        if measure == 0 {
            self.leaf = None;
            self.position = 0;
            return None;
        }
        self.descend_metric::<M>(measure);
        self.last_inside_leaf::<M>(orig_pos)
    }

    /// Move to the next `M` boundary, or invalidate if there is none.
    pub fn next<M: Metric<N, L>>(&mut self) -> Option<usize> {
        if self.position >= self.root.len() || self.leaf.is_none() {
            self.leaf = None;
            self.position = self.position.min(self.root.len());
            return None;
        }

        if let Some(offset) = self.next_inside_leaf::<M>() {
            return Some(offset);
        }

        self.next_leaf()?;
        if let Some(offset) = self.next_inside_leaf::<M>() {
            return Some(offset);
        }

        // The next leaf is zero-measure, otherwise it would have had a
        // boundary; jump by measure.
        let measure = self.measure_leaf::<M>(self.position);
        self.descend_metric::<M>(measure + 1);
        if let Some(offset) = self.next_inside_leaf::<M>() {
            return Some(offset);
        }

        self.position = self.root.len();
        self.leaf = None;
        None
    }

    /// The current position if it is a boundary, otherwise `next`.
    pub fn at_or_next<M: Metric<N, L>>(&mut self) -> Option<usize> {
        if self.is_boundary::<M>() {
            Some(self.pos())
        } else {
            self.next::<M>()
        }
    }

    /// The current position if it is a boundary, otherwise `prev`.
    pub fn at_or_prev<M: Metric<N, L>>(&mut self) -> Option<usize> {
        if self.is_boundary::<M>() {
            Some(self.pos())
        } else {
            self.prev::<M>()
        }
    }

    /// Iterate boundaries of `M` from the current position.
    pub fn iter<'c, M: Metric<N, L>>(&'c mut self) -> CursorIter<'c, 'a, N, L, M> {
        CursorIter { cursor: self, _metric: PhantomData }
    }

    /// The last boundary in the current leaf, counting the leaf end only
    /// when it precedes `orig_pos`.
    #[inline]
    fn last_inside_leaf<M: Metric<N, L>>(&mut self, orig_pos: usize) -> Option<usize> {
        let l = self.leaf.expect("cursor invariant violated");
        let len = l.len();
        if self.offset_of_leaf + len < orig_pos && M::is_boundary(l, len) {
            let _ = self.next_leaf();
            return Some(self.position);
        }
        let offset_in_leaf = M::prev(l, len)?;
        self.position = self.offset_of_leaf + offset_in_leaf;
        Some(self.position)
    }

    #[inline]
    fn next_inside_leaf<M: Metric<N, L>>(&mut self) -> Option<usize> {
        let l = self.leaf.expect("cursor invariant violated");
        let offset_in_leaf = self.position - self.offset_of_leaf;
        let offset_in_leaf = M::next(l, offset_in_leaf)?;
        if offset_in_leaf == l.len() && self.offset_of_leaf + offset_in_leaf != self.root.len() {
            let _ = self.next_leaf();
        } else {
            self.position = self.offset_of_leaf + offset_in_leaf;
        }
        Some(self.position)
    }

    /// Move to the start of the next leaf; same return as `get_leaf`.
    pub fn next_leaf(&mut self) -> Option<(&'a L, usize)> {
        let leaf = self.leaf?;
        self.position = self.offset_of_leaf + leaf.len();
        for i in 0..CURSOR_CACHE_SIZE {
            if self.cache[i].is_none() {
                // Cache drained; only possible above a shallow root.
                self.leaf = None;
                return None;
            }
            let (node, j) = self.cache[i].unwrap();
            if j + 1 < node.get_children().len() {
                self.cache[i] = Some((node, j + 1));
                let mut node_down = &node.get_children()[j + 1];
                for k in (0..i).rev() {
                    self.cache[k] = Some((node_down, 0));
                    node_down = &node_down.get_children()[0];
                }
                self.leaf = Some(node_down.get_leaf());
                self.offset_of_leaf = self.position;
                return self.get_leaf();
            }
        }
        if self.offset_of_leaf + leaf.len() == self.root.len() {
            self.leaf = None;
            return None;
        }
        // The path above the cache changed; descend from the root.
        self.descend();
        self.get_leaf()
    }

    /// Move to the start of the previous leaf; same return as `get_leaf`.
    pub fn prev_leaf(&mut self) -> Option<(&'a L, usize)> {
        if self.offset_of_leaf == 0 {
            self.leaf = None;
            self.position = 0;
            return None;
        }
        for i in 0..CURSOR_CACHE_SIZE {
            if self.cache[i].is_none() {
                self.leaf = None;
                return None;
            }
            let (node, j) = self.cache[i].unwrap();
            if j > 0 {
                self.cache[i] = Some((node, j - 1));
                let mut node_down = &node.get_children()[j - 1];
                for k in (0..i).rev() {
                    let last_ix = node_down.get_children().len() - 1;
                    self.cache[k] = Some((node_down, last_ix));
                    node_down = &node_down.get_children()[last_ix];
                }
                self.offset_of_leaf -= node_down.len();
                self.position = self.offset_of_leaf;
                self.leaf = Some(node_down.get_leaf());
                return self.get_leaf();
            }
        }
        self.position = self.offset_of_leaf - 1;
        self.descend();
        self.position = self.offset_of_leaf;
        self.get_leaf()
    }

    /// Fill `leaf`, `cache`, and `offset_of_leaf` for the current position.
    fn descend(&mut self) {
        let mut node = self.root;
        let mut offset = 0;
        while node.height() > 0 {
            let children = node.get_children();
            let mut i = 0;
            loop {
                if i + 1 == children.len() {
                    break;
                }
                let nextoff = offset + children[i].len();
                if nextoff > self.position {
                    break;
                }
                offset = nextoff;
                i += 1;
            }
            let cache_ix = node.height() - 1;
            if cache_ix < CURSOR_CACHE_SIZE {
                self.cache[cache_ix] = Some((node, i));
            }
            node = &children[i];
        }
        self.leaf = Some(node.get_leaf());
        self.offset_of_leaf = offset;
    }

    /// The measure of `M` at the start of the leaf containing `pos`;
    /// O(log n) regardless of cursor state.
    fn measure_leaf<M: Metric<N, L>>(&self, mut pos: usize) -> usize {
        let mut node = self.root;
        let mut metric = 0;
        while node.height() > 0 {
            for child in node.get_children() {
                let len = child.len();
                if pos < len {
                    node = child;
                    break;
                }
                pos -= len;
                metric += child.measure::<M>();
            }
        }
        metric
    }

    /// Descend to the leaf containing the smallest offset with the given
    /// measure, positioning at the start of that leaf.
    fn descend_metric<M: Metric<N, L>>(&mut self, mut measure: usize) {
        let mut node = self.root;
        let mut offset = 0;
        while node.height() > 0 {
            let children = node.get_children();
            let mut i = 0;
            loop {
                if i + 1 == children.len() {
                    break;
                }
                let child = &children[i];
                let child_m = child.measure::<M>();
                if child_m >= measure {
                    break;
                }
                offset += child.len();
                measure -= child_m;
                i += 1;
            }
            let cache_ix = node.height() - 1;
            if cache_ix < CURSOR_CACHE_SIZE {
                self.cache[cache_ix] = Some((node, i));
            }
            node = &children[i];
        }
        self.position = offset;
        self.leaf = Some(node.get_leaf());
        self.offset_of_leaf = offset;
    }
}

/// Boundary iterator produced by [`Cursor::iter`].
pub struct CursorIter<'c, 'a: 'c, N: NodeInfo<L> + 'a, L: Leaf, M: Metric<N, L> + 'a> {
    cursor: &'c mut Cursor<'a, N, L>,
    _metric: PhantomData<&'a M>,
}

impl<'c, 'a, N, L, M> Iterator for CursorIter<'c, 'a, N, L, M>
where
    N: NodeInfo<L> + 'a,
    L: Leaf,
    M: Metric<N, L> + 'a,
{
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        self.cursor.next::<M>()
    }
}

impl<'c, 'a, N, L, M> CursorIter<'c, 'a, N, L, M>
where
    N: NodeInfo<L> + 'a,
    L: Leaf,
    M: Metric<N, L> + 'a,
{
    pub fn pos(&self) -> usize {
        self.cursor.pos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{
        LineStartMetric, Segment, SegmentBuilder, SegmentInfo, SegmentLeaf, WidthMetric,
    };

    type SegRope = Node<SegmentInfo, SegmentLeaf>;

    fn chunk(width: u32) -> Segment {
        Segment::text(0, 0, width as usize, width)
    }

    fn build(segments: Vec<Segment>) -> SegRope {
        let mut b = SegmentBuilder::new();
        b.extend(segments);
        b.build()
    }

    fn collect_segments(rope: &SegRope) -> Vec<Segment> {
        let mut out = Vec::new();
        let mut c = Cursor::new(rope, 0);
        while let Some((leaf, _)) = c.get_leaf() {
            out.extend(leaf.segments().iter().cloned());
            if c.next_leaf().is_none() {
                break;
            }
        }
        out
    }

    #[test]
    fn empty_tree() {
        let rope = SegRope::default();
        assert!(rope.is_empty());
        assert_eq!(rope.len(), 0);
        assert_eq!(rope.measure::<WidthMetric>(), 0);
    }

    #[test]
    fn builder_many_leaves_balances() {
        let mut b = TreeBuilder::<SegmentInfo, SegmentLeaf>::new();
        for _ in 0..1000 {
            b.push_leaf(SegmentLeaf::from_segments(vec![Segment::LineStart, chunk(3)]));
        }
        let tree = b.build();
        assert_eq!(tree.len(), 2000);
        assert_eq!(tree.measure::<LineStartMetric>(), 1000);
        // 2000 segments over >= 8-segment leaves in an 8-ary tree.
        assert!(tree.height() <= 4, "height {} too tall", tree.height());
    }

    #[test]
    fn concat_preserves_totals() {
        let a = build(vec![Segment::LineStart, chunk(4)]);
        let b = build(vec![Segment::Break, Segment::LineStart, chunk(6)]);
        let joined = Node::concat(a.clone(), b.clone());
        assert_eq!(joined.len(), a.len() + b.len());
        assert_eq!(
            joined.measure::<WidthMetric>(),
            a.measure::<WidthMetric>() + b.measure::<WidthMetric>()
        );
    }

    #[test]
    fn split_join_identity() {
        let mut segments = Vec::new();
        for i in 0..40u32 {
            segments.push(Segment::LineStart);
            // Distinct byte ranges so adjacent chunks cannot coalesce.
            segments.push(Segment::text(1, (i as usize) * 100, (i as usize) * 100 + 5, 5));
            segments.push(Segment::Break);
        }
        let rope = build(segments.clone());
        for i in 0..=rope.len() {
            let left = rope.subseq(0..i);
            let right = rope.subseq(i..rope.len());
            let rejoined = Node::concat(left, right);
            assert_eq!(rejoined.len(), rope.len(), "split at {}", i);
            assert_eq!(collect_segments(&rejoined), segments, "leaf sequence after split at {}", i);
        }
    }

    #[test]
    fn edit_replaces_range() {
        let mut rope = build(vec![Segment::LineStart, chunk(2), chunk(3), chunk(4)]);
        rope.edit(2..3, build(vec![chunk(9)]));
        assert_eq!(rope.len(), 4);
        assert_eq!(rope.measure::<WidthMetric>(), 2 + 9 + 4);
    }

    #[test]
    fn base_metric_roundtrip() {
        let rope = build(vec![Segment::LineStart, chunk(2), chunk(3)]);
        for i in 0..=rope.len() {
            assert_eq!(rope.count::<BaseMetric<_, _>>(i), i);
            assert_eq!(rope.count_base_units::<BaseMetric<_, _>>(i), i);
        }
    }

    #[test]
    fn cursor_line_starts() {
        let mut segments = Vec::new();
        for i in 0..10u32 {
            if i > 0 {
                segments.push(Segment::Break);
            }
            segments.push(Segment::LineStart);
            segments.push(Segment::text(2, (i as usize) * 10, (i as usize) * 10 + 4, 4));
        }
        let rope = build(segments);
        let mut c = Cursor::new(&rope, 0);
        let boundaries: Vec<usize> = c.iter::<LineStartMetric>().collect();
        // A boundary lands just after each LineStart; the first is at
        // index 1, then every three segments.
        assert_eq!(boundaries.len(), 10);
        assert_eq!(boundaries[0], 1);
        assert_eq!(boundaries[1], 4);
    }
}
