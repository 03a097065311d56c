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

//! Undo/redo over persistent tree roots.
//!
//! Because the tree is persistent, a snapshot is a single root pointer;
//! history is a stack of such pointers plus a short meta tag per record.
//! Redo chains displaced by a new edit are not destroyed: they become
//! branches of the undo record created for that edit, so history is a tree
//! whose abandoned futures remain reachable.

use crate::tree::{Leaf, Node, NodeInfo};

/// Default cap on retained undo records.
pub const DEFAULT_MAX_UNDO_DEPTH: usize = 100;

/// A captured pre-edit state.
#[derive(Clone)]
pub struct UndoRecord<N: NodeInfo<L>, L: Leaf> {
    root: Node<N, L>,
    meta: String,
    /// Redo chains that were current when a later edit displaced them.
    branches: Vec<Vec<RedoEntry<N, L>>>,
}

impl<N: NodeInfo<L>, L: Leaf> UndoRecord<N, L> {
    pub fn meta(&self) -> &str {
        &self.meta
    }

    pub fn branches(&self) -> &[Vec<RedoEntry<N, L>>] {
        &self.branches
    }
}

/// A redoable state: the root to restore, and the root that must be
/// current for the redo to be coherent.
#[derive(Clone)]
pub struct RedoEntry<N: NodeInfo<L>, L: Leaf> {
    root: Node<N, L>,
    anchor: Node<N, L>,
    meta: String,
}

impl<N: NodeInfo<L>, L: Leaf> RedoEntry<N, L> {
    pub fn meta(&self) -> &str {
        &self.meta
    }
}

pub struct History<N: NodeInfo<L>, L: Leaf> {
    undo: Vec<UndoRecord<N, L>>,
    redo: Vec<RedoEntry<N, L>>,
    max_depth: usize,
}

impl<N: NodeInfo<L>, L: Leaf> History<N, L> {
    pub fn new(max_depth: usize) -> History<N, L> {
        History { undo: Vec::new(), redo: Vec::new(), max_depth }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Capture the pre-edit root. Call immediately before each mutation.
    ///
    /// Any live redo chain is attached to the new record as a branch: it
    /// stays reachable but is no longer the linear future.
    pub fn store_undo(&mut self, root: &Node<N, L>, meta: impl Into<String>) {
        let mut record =
            UndoRecord { root: root.clone(), meta: meta.into(), branches: Vec::new() };
        if !self.redo.is_empty() {
            record.branches.push(std::mem::take(&mut self.redo));
        }
        self.undo.push(record);
        if self.undo.len() > self.max_depth {
            self.undo.remove(0);
        }
    }

    /// Pop the latest record, pushing `current` onto the redo chain.
    /// Returns the restored root and the record's meta tag.
    pub fn undo(&mut self, current: &Node<N, L>) -> Option<(Node<N, L>, String)> {
        let record = self.undo.pop()?;
        self.redo.push(RedoEntry {
            root: current.clone(),
            anchor: record.root.clone(),
            meta: record.meta.clone(),
        });
        Some((record.root, record.meta))
    }

    /// Re-apply the most recently undone state. Fails (returns `None`)
    /// unless `current` is the root that undo restored; any mutation in
    /// between breaks the anchor and invalidates the chain.
    pub fn redo(&mut self, current: &Node<N, L>) -> Option<(Node<N, L>, String)> {
        match self.redo.last() {
            Some(entry) if entry.anchor.ptr_eq(current) => {}
            _ => return None,
        }
        let entry = self.redo.pop()?;
        self.undo.push(UndoRecord {
            root: current.clone(),
            meta: entry.meta.clone(),
            branches: Vec::new(),
        });
        Some((entry.root, entry.meta))
    }

    /// The branches attached to the latest undo record, if any.
    pub fn latest_branches(&self) -> &[Vec<RedoEntry<N, L>>] {
        self.undo.last().map(|r| r.branches.as_slice()).unwrap_or(&[])
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
