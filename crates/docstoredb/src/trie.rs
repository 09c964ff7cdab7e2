//! Prefix trie mapping words to sets of values
//!
//! Keys are walked byte by byte, so every node has at most 256 children.
//! Lookups are case-sensitive. A node with no values and no children is
//! unlinked from its parent as soon as a delete empties it; the root is
//! never removed.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;

use ahash::RandomState;

/// Set of values stored at one trie node
pub type ValueSet<V> = HashSet<V, RandomState>;

struct Node<V> {
    values: ValueSet<V>,
    children: BTreeMap<u8, Node<V>>,
}

impl<V> Node<V> {
    fn new() -> Self {
        Node {
            values: HashSet::with_hasher(RandomState::new()),
            children: BTreeMap::new(),
        }
    }

    fn is_dead(&self) -> bool {
        self.values.is_empty() && self.children.is_empty()
    }
}

/// Multi-valued string index supporting exact and prefix lookups
pub struct Trie<V> {
    root: Node<V>,
}

impl<V> Trie<V>
where
    V: Eq + Hash + Clone,
{
    /// Create an empty trie
    pub fn new() -> Self {
        Trie { root: Node::new() }
    }

    /// Add `value` to the set at `key`; adding it twice has no effect
    pub fn put(&mut self, key: &str, value: V) {
        let mut node = &mut self.root;
        for byte in key.bytes() {
            node = node.children.entry(byte).or_insert_with(Node::new);
        }
        node.values.insert(value);
    }

    /// Values stored exactly at `key`
    pub fn get(&self, key: &str) -> ValueSet<V> {
        match self.node(key) {
            Some(node) => node.values.clone(),
            None => HashSet::with_hasher(RandomState::new()),
        }
    }

    /// Values stored exactly at `key`, ordered by `compare`
    pub fn get_sorted<F>(&self, key: &str, compare: F) -> Vec<V>
    where
        F: FnMut(&V, &V) -> Ordering,
    {
        let mut values: Vec<V> = self.get(key).into_iter().collect();
        values.sort_by(compare);
        values
    }

    /// Values stored at `prefix` or at any key extending it, without
    /// duplicates, ordered by `compare`
    pub fn get_all_with_prefix_sorted<F>(&self, prefix: &str, compare: F) -> Vec<V>
    where
        F: FnMut(&V, &V) -> Ordering,
    {
        let mut collected = HashSet::with_hasher(RandomState::new());
        if let Some(node) = self.node(prefix) {
            collect(node, &mut collected);
        }
        let mut values: Vec<V> = collected.into_iter().collect();
        values.sort_by(compare);
        values
    }

    /// Remove one value from `key`; returns it if it was present
    pub fn delete(&mut self, key: &str, value: &V) -> Option<V> {
        let mut removed = None;
        prune_path(&mut self.root, key.as_bytes(), &mut |node: &mut Node<V>| {
            removed = node.values.take(value);
        });
        removed
    }

    /// Remove every value stored exactly at `key`
    pub fn delete_all(&mut self, key: &str) -> ValueSet<V> {
        let mut removed = HashSet::with_hasher(RandomState::new());
        prune_path(&mut self.root, key.as_bytes(), &mut |node: &mut Node<V>| {
            removed = std::mem::replace(&mut node.values, HashSet::with_hasher(RandomState::new()));
        });
        removed
    }

    /// Remove every value stored at `prefix` or below it
    pub fn delete_all_with_prefix(&mut self, prefix: &str) -> ValueSet<V> {
        let mut removed = HashSet::with_hasher(RandomState::new());
        prune_path(&mut self.root, prefix.as_bytes(), &mut |node: &mut Node<V>| {
            drain(node, &mut removed);
        });
        removed
    }

    /// Whether no values are stored anywhere
    pub fn is_empty(&self) -> bool {
        self.root.is_dead()
    }

    fn node(&self, key: &str) -> Option<&Node<V>> {
        let mut node = &self.root;
        for byte in key.bytes() {
            node = node.children.get(&byte)?;
        }
        Some(node)
    }

    #[cfg(test)]
    fn node_count(&self) -> usize {
        fn count<V>(node: &Node<V>) -> usize {
            1 + node.children.values().map(count).sum::<usize>()
        }
        count(&self.root)
    }
}

impl<V> Default for Trie<V>
where
    V: Eq + Hash + Clone,
{
    fn default() -> Self {
        Trie::new()
    }
}

fn collect<V: Eq + Hash + Clone>(node: &Node<V>, out: &mut ValueSet<V>) {
    out.extend(node.values.iter().cloned());
    for child in node.children.values() {
        collect(child, out);
    }
}

fn drain<V: Eq + Hash>(node: &mut Node<V>, out: &mut ValueSet<V>) {
    out.extend(node.values.drain());
    for (_, mut child) in std::mem::take(&mut node.children) {
        drain(&mut child, out);
    }
}

/// Walk to the node at `path`, apply `edit` to it, then unlink every node on
/// the way back up that ended dead. Missing paths are left untouched.
fn prune_path<V, F>(node: &mut Node<V>, path: &[u8], edit: &mut F)
where
    F: FnMut(&mut Node<V>),
{
    let Some((&byte, rest)) = path.split_first() else {
        edit(node);
        return;
    };

    if let Some(child) = node.children.get_mut(&byte) {
        prune_path(child, rest, edit);
        if child.is_dead() {
            node.children.remove(&byte);
        }
    }
}
