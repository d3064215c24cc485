//! Hash-ordered binary search tree stored inside a single [`DynArray`].
//!
//! Nodes link to each other by array index rather than by pointer, so the
//! tree survives reallocation of its storage and can be persisted as-is in a
//! memory-mapped array. Entries are ordered by the xxHash of their key, with
//! the key comparator breaking ties. Deletion keeps the array dense by moving
//! the last entry into the freed slot.

use std::cmp::Ordering;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use bytemuck::{Pod, Zeroable};

use crate::dyn_array::{ArrayParams, DynArray, DEFAULT_CAPACITY, DEFAULT_GROWTH};
use crate::hash::{hash, TREE_SEED};
use crate::key::HashKey;
use crate::storage::{StoreError, StoreResult};

/// Raw link value meaning "no node".
const NIL: u64 = u64::MAX;

/// Bytes of header metadata holding the root index.
const ROOT_FIELD: usize = 8;

/// Key comparator used to break hash ties.
pub type KeyComparator<K> = fn(&K, &K) -> Ordering;

fn encode(index: Option<usize>) -> u64 {
    index.map_or(NIL, |i| i as u64)
}

fn decode(raw: u64) -> Option<usize> {
    (raw != NIL).then_some(raw as usize)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl Side {
    fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Creation parameters for a [`HashTree`].
#[derive(Debug, Clone, PartialEq)]
pub struct TreeParams {
    pub growth: f32,
    pub capacity: usize,
    /// Backing file for a persistent tree.
    pub path: Option<PathBuf>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            growth: DEFAULT_GROWTH,
            capacity: DEFAULT_CAPACITY,
            path: None,
        }
    }
}

impl TreeParams {
    pub fn with_growth(mut self, growth: f32) -> Self {
        self.growth = growth;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl From<TreeParams> for ArrayParams {
    fn from(params: TreeParams) -> Self {
        ArrayParams {
            size: 0,
            growth: params.growth,
            capacity: params.capacity,
            path: params.path,
        }
    }
}

/// A tree node: key, value, hash and the indices of its neighbours.
///
/// The layout is packed: for any `K` and `V` the record has no padding and is
/// stored byte-for-byte in the backing array. Read fields through the
/// accessors; references to packed fields are not allowed.
/// Links, hash and key bytes are in host byte order, so a tree file only
/// reloads on a host of the same endianness.
#[repr(C, packed)]
pub struct HashEntry<K, V> {
    hash: u32,
    parent: u64,
    left: u64,
    right: u64,
    key: K,
    value: V,
}

// SAFETY: packed, so there is no padding, and every field is `Pod`.
unsafe impl<K: Pod, V: Pod> Zeroable for HashEntry<K, V> {}
unsafe impl<K: Pod, V: Pod> Pod for HashEntry<K, V> {}

impl<K: Copy, V: Copy> Clone for HashEntry<K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: Copy, V: Copy> Copy for HashEntry<K, V> {}

impl<K: Copy, V: Copy> HashEntry<K, V> {
    fn new(hash: u32, key: K, value: V, parent: Option<usize>) -> Self {
        Self {
            hash,
            parent: encode(parent),
            left: NIL,
            right: NIL,
            key,
            value,
        }
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn key(&self) -> K {
        self.key
    }

    pub fn value(&self) -> V {
        self.value
    }

    /// Index of the parent node; `None` for the root.
    pub fn parent(&self) -> Option<usize> {
        decode(self.parent)
    }

    pub fn left(&self) -> Option<usize> {
        decode(self.left)
    }

    pub fn right(&self) -> Option<usize> {
        decode(self.right)
    }

    pub fn is_root(&self) -> bool {
        self.parent == NIL
    }

    fn child(&self, side: Side) -> Option<usize> {
        match side {
            Side::Left => self.left(),
            Side::Right => self.right(),
        }
    }

    fn set_child(&mut self, side: Side, index: Option<usize>) {
        match side {
            Side::Left => self.left = encode(index),
            Side::Right => self.right = encode(index),
        }
    }

    fn set_parent(&mut self, index: Option<usize>) {
        self.parent = encode(index);
    }
}

impl<K: Copy + fmt::Debug, V: Copy + fmt::Debug> fmt::Debug for HashEntry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashEntry")
            .field("hash", &self.hash())
            .field("key", &self.key())
            .field("value", &self.value())
            .field("parent", &self.parent())
            .field("left", &self.left())
            .field("right", &self.right())
            .finish()
    }
}

/// Binary search tree ordered by `(hash(key), compare(key))`.
///
/// Insertion never rebalances; call [`balance`](HashTree::balance) to run a
/// rebalancing pass.
pub struct HashTree<K: HashKey, V: Pod> {
    nodes: DynArray<HashEntry<K, V>>,
    root: Option<usize>,
    compare: KeyComparator<K>,
}

impl<K: HashKey, V: Pod> HashTree<K, V> {
    /// Creates an empty in-memory tree.
    pub fn new(compare: KeyComparator<K>) -> Self {
        Self {
            nodes: DynArray::new(),
            root: None,
            compare,
        }
    }

    /// Creates an empty tree, persistent when `params` names a file.
    pub fn with_params(compare: KeyComparator<K>, params: TreeParams) -> StoreResult<Self> {
        let mut tree = Self {
            nodes: DynArray::with_params(params.into())?,
            root: None,
            compare,
        };
        tree.store_root();
        Ok(tree)
    }

    /// Reopens a tree persisted at `path`, restoring its root from the header.
    pub fn load(path: impl AsRef<Path>, compare: KeyComparator<K>) -> StoreResult<Self> {
        let path = path.as_ref();
        let nodes = DynArray::<HashEntry<K, V>>::load(path)?;
        let root = decode(LittleEndian::read_u64(&nodes.metadata()[..ROOT_FIELD]));

        let consistent = match root {
            Some(index) => index < nodes.len(),
            None => nodes.is_empty(),
        };
        if !consistent {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("root {:?} invalid for {} entries", root, nodes.len()),
            });
        }

        Ok(Self {
            nodes,
            root,
            compare,
        })
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the index of the root entry.
    pub fn root(&self) -> Option<usize> {
        self.root
    }

    /// Borrows the entry stored at array `index`.
    pub fn entry(&self, index: usize) -> Option<&HashEntry<K, V>> {
        self.nodes.get(index)
    }

    /// Returns every entry in storage order.
    pub fn entries(&self) -> &[HashEntry<K, V>] {
        self.nodes.as_slice()
    }

    pub fn is_mapped(&self) -> bool {
        self.nodes.is_mapped()
    }

    pub fn path(&self) -> Option<&Path> {
        self.nodes.path()
    }

    /// Flushes a persistent tree to its file.
    pub fn sync(&mut self) -> StoreResult<()> {
        self.nodes.sync()
    }

    fn key_hash(key: &K) -> u32 {
        hash(key.hash_bytes(), TREE_SEED)
    }

    fn order(&self, hash: u32, key: &K, node: &HashEntry<K, V>) -> Ordering {
        hash.cmp(&node.hash())
            .then_with(|| (self.compare)(key, &node.key()))
    }

    fn store_root(&mut self) {
        let mut field = [0u8; ROOT_FIELD];
        LittleEndian::write_u64(&mut field, encode(self.root));
        self.nodes.set_metadata(&field);
    }

    fn find(&self, key: &K) -> Option<usize> {
        let hash = Self::key_hash(key);
        let mut cursor = self.root;
        while let Some(index) = cursor {
            let node = &self.nodes[index];
            cursor = match self.order(hash, key, node) {
                Ordering::Equal => return Some(index),
                Ordering::Less => node.left(),
                Ordering::Greater => node.right(),
            };
        }
        None
    }

    /// Inserts `key`, or overwrites its value if already present.
    pub fn set(&mut self, key: K, value: V) {
        let hash = Self::key_hash(&key);
        let Some(mut index) = self.root else {
            let slot = self.nodes.append(HashEntry::new(hash, key, value, None));
            self.root = Some(slot);
            self.store_root();
            return;
        };

        loop {
            let node = self.nodes[index];
            let side = match self.order(hash, &key, &node) {
                Ordering::Equal => {
                    self.nodes[index].value = value;
                    return;
                }
                Ordering::Less => Side::Left,
                Ordering::Greater => Side::Right,
            };
            match node.child(side) {
                Some(child) => index = child,
                None => {
                    let slot = self.nodes.append(HashEntry::new(hash, key, value, Some(index)));
                    // the append may have moved the storage; link through the index
                    self.nodes[index].set_child(side, Some(slot));
                    return;
                }
            }
        }
    }

    /// Looks up the entry for `key`.
    pub fn get(&self, key: &K) -> Option<&HashEntry<K, V>> {
        self.find(key).map(|index| &self.nodes[index])
    }

    /// Returns a copy of the value stored for `key`.
    pub fn get_value(&self, key: &K) -> Option<V> {
        self.get(key).map(HashEntry::value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Returns `true` when every key of `other` is present in this tree.
    pub fn has_all(&self, other: &HashTree<K, V>) -> bool {
        other.nodes.iter().all(|entry| self.contains_key(&entry.key()))
    }

    /// Removes `key`, returning its key and value.
    pub fn delete(&mut self, key: &K) -> Option<(K, V)> {
        self.remove(key, |_, _| {})
    }

    /// Removes `key`, passing the removed key and value to `callback` before
    /// the freed slot is reused. Returns `false` if the key was absent.
    pub fn delete_with<F>(&mut self, key: &K, callback: F) -> bool
    where
        F: FnOnce(&K, &V),
    {
        self.remove(key, callback).is_some()
    }

    fn remove<F>(&mut self, key: &K, callback: F) -> Option<(K, V)>
    where
        F: FnOnce(&K, &V),
    {
        let Some(slot) = self.find(key) else {
            tracing::debug!("delete skipped: key not present");
            return None;
        };
        let removed = self.nodes[slot];

        let mut orphans = Vec::new();
        match removed.parent() {
            Some(parent) => {
                self.replace_child(Some(parent), slot, None);
                self.collect_preorder(removed.left(), &mut orphans);
                self.collect_preorder(removed.right(), &mut orphans);
            }
            None => {
                self.root = removed.left().or(removed.right());
                if let Some(root) = self.root {
                    self.nodes[root].set_parent(None);
                }
                if removed.left().is_some() {
                    self.collect_preorder(removed.right(), &mut orphans);
                }
            }
        }
        for orphan in orphans {
            self.reattach(orphan);
        }

        let (key, value) = (removed.key(), removed.value());
        callback(&key, &value);

        self.compact(slot);
        self.store_root();
        tracing::trace!(slot, len = self.nodes.len(), "deleted tree entry");
        Some((key, value))
    }

    fn collect_preorder(&self, start: Option<usize>, out: &mut Vec<usize>) {
        let mut stack: Vec<usize> = start.into_iter().collect();
        while let Some(index) = stack.pop() {
            out.push(index);
            let node = &self.nodes[index];
            stack.extend(node.right());
            stack.extend(node.left());
        }
    }

    /// Unlinks `index` from its children and descends from the root to hang
    /// it back as a leaf.
    fn reattach(&mut self, index: usize) {
        let (hash, key) = {
            let node = &mut self.nodes[index];
            node.set_child(Side::Left, None);
            node.set_child(Side::Right, None);
            (node.hash(), node.key())
        };

        let Some(mut cursor) = self.root else {
            self.nodes[index].set_parent(None);
            self.root = Some(index);
            return;
        };
        loop {
            let node = self.nodes[cursor];
            let side = match self.order(hash, &key, &node) {
                Ordering::Less => Side::Left,
                _ => Side::Right,
            };
            match node.child(side) {
                Some(child) => cursor = child,
                None => {
                    self.nodes[cursor].set_child(side, Some(index));
                    self.nodes[index].set_parent(Some(cursor));
                    return;
                }
            }
        }
    }

    /// Moves the last entry into the unlinked `slot` and shrinks the array.
    fn compact(&mut self, slot: usize) {
        let last = self.nodes.len() - 1;
        if slot != last {
            let moved = self.nodes[last];
            self.nodes[slot] = moved;
            match moved.parent() {
                Some(parent) => self.replace_child(Some(parent), last, Some(slot)),
                None => self.root = Some(slot),
            }
            for child in [moved.left(), moved.right()].into_iter().flatten() {
                self.nodes[child].set_parent(Some(slot));
            }
        }
        self.nodes.truncate(last);
    }

    /// Points whichever child link of `parent` holds `old` at `new`; with no
    /// parent, `new` becomes the root.
    fn replace_child(&mut self, parent: Option<usize>, old: usize, new: Option<usize>) {
        match parent {
            None => {
                self.root = new;
                self.store_root();
            }
            Some(parent) => {
                let node = &mut self.nodes[parent];
                if node.left() == Some(old) {
                    node.set_child(Side::Left, new);
                } else if node.right() == Some(old) {
                    node.set_child(Side::Right, new);
                }
            }
        }
    }

    /// Length of the longest downward path starting at `index`; 0 for `None`.
    pub fn max_depth(&self, index: Option<usize>) -> usize {
        match index.and_then(|i| self.nodes.get(i)) {
            Some(node) => 1 + self.max_depth(node.left()).max(self.max_depth(node.right())),
            None => 0,
        }
    }

    /// Rebalances the whole tree with rotations.
    ///
    /// Children are balanced before their parent. A node whose subtrees differ
    /// in depth by more than one is rotated toward its shallower side; when the
    /// heavy child leans the other way it is rotated first, so that afterwards
    /// every node's subtree depths differ by at most one.
    pub fn balance(&mut self) {
        if let Some(root) = self.root {
            self.balance_subtree(root);
        }
        self.store_root();
    }

    fn balance_subtree(&mut self, index: usize) -> usize {
        let node = self.nodes[index];
        if let Some(left) = node.left() {
            self.balance_subtree(left);
        }
        if let Some(right) = node.right() {
            self.balance_subtree(right);
        }
        self.settle(index)
    }

    /// Rotates at `index` until its subtrees are within one level of each
    /// other. Returns the index now occupying that position.
    fn settle(&mut self, mut index: usize) -> usize {
        loop {
            let node = self.nodes[index];
            let left = self.max_depth(node.left());
            let right = self.max_depth(node.right());
            let heavy = if left > right + 1 {
                Side::Left
            } else if right > left + 1 {
                Side::Right
            } else {
                return index;
            };
            let Some(child) = node.child(heavy) else {
                return index;
            };

            let child_node = self.nodes[child];
            if self.max_depth(child_node.child(heavy.opposite()))
                > self.max_depth(child_node.child(heavy))
            {
                self.lift(child, heavy.opposite());
                self.settle(child);
            }

            let top = self.lift(index, heavy);
            self.settle(index);
            index = top;
        }
    }

    /// Rotates the `side` child of `index` into its place and returns it.
    fn lift(&mut self, index: usize, side: Side) -> usize {
        let node = self.nodes[index];
        let Some(child) = node.child(side) else {
            return index;
        };
        let inner = self.nodes[child].child(side.opposite());
        let parent = node.parent();

        self.nodes[index].set_child(side, inner);
        if let Some(inner) = inner {
            self.nodes[inner].set_parent(Some(index));
        }
        self.nodes[child].set_child(side.opposite(), Some(index));
        self.nodes[index].set_parent(Some(child));
        self.nodes[child].set_parent(parent);
        self.replace_child(parent, index, Some(child));

        tracing::trace!(from = index, to = child, ?side, "rotated");
        child
    }

    /// Visits every entry depth-first: left subtree, right subtree, node.
    ///
    /// Stops as soon as `visitor` returns `false`; returns whether the
    /// traversal ran to completion.
    pub fn visit_nodes<F>(&self, visitor: F) -> bool
    where
        F: FnMut(&HashEntry<K, V>, usize) -> bool,
    {
        match self.root {
            Some(root) => self.visit_subtree(root, visitor),
            None => true,
        }
    }

    /// Like [`visit_nodes`](HashTree::visit_nodes), starting at `start`.
    pub fn visit_subtree<F>(&self, start: usize, mut visitor: F) -> bool
    where
        F: FnMut(&HashEntry<K, V>, usize) -> bool,
    {
        if start >= self.nodes.len() {
            tracing::debug!(start, len = self.nodes.len(), "visit start out of range");
            return false;
        }
        self.walk(start, &mut visitor)
    }

    fn walk<F>(&self, index: usize, visitor: &mut F) -> bool
    where
        F: FnMut(&HashEntry<K, V>, usize) -> bool,
    {
        let node = &self.nodes[index];
        if let Some(left) = node.left() {
            if !self.walk(left, visitor) {
                return false;
            }
        }
        if let Some(right) = node.right() {
            if !self.walk(right, visitor) {
                return false;
            }
        }
        visitor(node, index)
    }

    /// Inserts every entry of `other`, overwriting values of shared keys.
    pub fn set_all(&mut self, other: &HashTree<K, V>) {
        for entry in other.nodes.iter() {
            self.set(entry.key(), entry.value());
        }
    }

    /// Deletes every entry whose key is absent from `other`.
    pub fn retain_all(&mut self, other: &HashTree<K, V>) {
        let doomed: Vec<K> = self
            .nodes
            .iter()
            .map(HashEntry::key)
            .filter(|key| !other.contains_key(key))
            .collect();
        for key in &doomed {
            self.delete(key);
        }
    }

    /// Returns an independent in-memory copy of the tree.
    pub fn copy(&self) -> Self {
        Self {
            nodes: self.nodes.copy(),
            root: self.root,
            compare: self.compare,
        }
    }

    /// Removes every entry, keeping the allocation.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
        self.store_root();
    }
}

impl<K: HashKey + fmt::Debug, V: Pod + fmt::Debug> HashTree<K, V> {
    /// Renders the tree sideways: right subtree above, left subtree below,
    /// indented by depth.
    pub fn draw_tree(&self) -> String {
        match self.root {
            Some(root) => self.draw_node(root),
            None => String::new(),
        }
    }

    /// Renders the subtree rooted at `index`.
    pub fn draw_node(&self, index: usize) -> String {
        let mut out = String::new();
        if index < self.nodes.len() {
            self.draw_into(index, 0, &mut out);
        }
        out
    }

    fn draw_into(&self, index: usize, depth: usize, out: &mut String) {
        let node = self.nodes[index];
        if let Some(right) = node.right() {
            self.draw_into(right, depth + 1, out);
        }
        let _ = writeln!(
            out,
            "{:indent$}[{}] {:?} = {:?} ({:08x})",
            "",
            index,
            node.key(),
            node.value(),
            node.hash(),
            indent = depth * 4
        );
        if let Some(left) = node.left() {
            self.draw_into(left, depth + 1, out);
        }
    }
}

impl<K: HashKey, V: Pod> fmt::Debug for HashTree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashTree")
            .field("len", &self.len())
            .field("root", &self.root)
            .field("depth", &self.max_depth(self.root))
            .field("path", &self.path())
            .finish()
    }
}
