use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::data::log_record::RecordPos;
use crate::errors::Result;
use crate::option::IteratorOptions;

use super::{IndexIterator, Indexer, SnapshotIterator};

// Children start in a sorted sparse array that grows through the classic
// Node4 / Node16 / Node48 capacities, then switch to a direct-indexed
// Node256 layout once the sparse form fills up.
const NODE4: usize = 4;
const NODE48: usize = 48;

/// Adaptive radix tree index with path compression. Keys are raw bytes,
/// traversal order is lexicographic.
pub struct AdaptiveRadixTree {
  tree: Arc<RwLock<ArtTree>>,
}

struct ArtTree {
  root: ArtNode,
  len: usize,
}

struct ArtNode {
  /// Compressed path below the edge byte that leads here.
  prefix: Vec<u8>,
  /// Position stored when a key terminates at this node.
  value: Option<RecordPos>,
  children: Children,
}

enum Children {
  Sparse { keys: Vec<u8>, nodes: Vec<ArtNode> },
  Dense(Vec<Option<ArtNode>>),
}

impl ArtNode {
  fn new(prefix: Vec<u8>, value: Option<RecordPos>) -> Self {
    ArtNode {
      prefix,
      value,
      children: Children::Sparse {
        keys: Vec::with_capacity(NODE4),
        nodes: Vec::with_capacity(NODE4),
      },
    }
  }

  fn child(&self, edge: u8) -> Option<&ArtNode> {
    match &self.children {
      Children::Sparse { keys, nodes } => keys.binary_search(&edge).ok().map(|i| &nodes[i]),
      Children::Dense(slots) => slots[edge as usize].as_ref(),
    }
  }

  fn child_mut(&mut self, edge: u8) -> Option<&mut ArtNode> {
    match &mut self.children {
      Children::Sparse { keys, nodes } => keys.binary_search(&edge).ok().map(|i| &mut nodes[i]),
      Children::Dense(slots) => slots[edge as usize].as_mut(),
    }
  }

  fn add_child(&mut self, edge: u8, child: ArtNode) {
    if let Children::Sparse { keys, nodes } = &mut self.children {
      if keys.len() >= NODE48 {
        let mut slots: Vec<Option<ArtNode>> = Vec::with_capacity(256);
        slots.resize_with(256, || None);
        for (k, node) in keys.drain(..).zip(nodes.drain(..)) {
          slots[k as usize] = Some(node);
        }
        self.children = Children::Dense(slots);
      }
    }
    match &mut self.children {
      Children::Sparse { keys, nodes } => match keys.binary_search(&edge) {
        Ok(i) => nodes[i] = child,
        Err(i) => {
          keys.insert(i, edge);
          nodes.insert(i, child);
        }
      },
      Children::Dense(slots) => slots[edge as usize] = Some(child),
    }
  }
}

fn longest_common_prefix(a: &[u8], b: &[u8]) -> usize {
  a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

fn insert(node: &mut ArtNode, key: &[u8], pos: RecordPos) -> Option<RecordPos> {
  let common = longest_common_prefix(&node.prefix, key);
  if common < node.prefix.len() {
    // the key diverges inside this node's compressed path, split it
    let parent_prefix = node.prefix[..common].to_vec();
    let old_edge = node.prefix[common];
    let old_suffix = node.prefix[common + 1..].to_vec();

    let mut old_node = std::mem::replace(node, ArtNode::new(parent_prefix, None));
    old_node.prefix = old_suffix;
    node.add_child(old_edge, old_node);

    if common == key.len() {
      node.value = Some(pos);
    } else {
      node.add_child(key[common], ArtNode::new(key[common + 1..].to_vec(), Some(pos)));
    }
    return None;
  }

  let rest = &key[common..];
  if rest.is_empty() {
    return node.value.replace(pos);
  }
  let edge = rest[0];
  match node.child_mut(edge) {
    Some(child) => insert(child, &rest[1..], pos),
    None => {
      node.add_child(edge, ArtNode::new(rest[1..].to_vec(), Some(pos)));
      None
    }
  }
}

fn lookup<'a>(node: &'a ArtNode, key: &[u8]) -> Option<&'a ArtNode> {
  if !key.starts_with(&node.prefix) {
    return None;
  }
  let rest = &key[node.prefix.len()..];
  if rest.is_empty() {
    return Some(node);
  }
  lookup(node.child(rest[0])?, &rest[1..])
}

fn remove(node: &mut ArtNode, key: &[u8]) -> Option<RecordPos> {
  if !key.starts_with(&node.prefix) {
    return None;
  }
  let rest = &key[node.prefix.len()..];
  if rest.is_empty() {
    return node.value.take();
  }
  remove(node.child_mut(rest[0])?, &rest[1..])
}

/// Depth-first walk emitting `(key, position)` pairs in ascending key order.
/// A node's own value is emitted before its children: a key is always a
/// strict prefix of the keys below it, so shorter sorts first.
fn collect(node: &ArtNode, buf: &mut Vec<u8>, items: &mut Vec<(Vec<u8>, RecordPos)>) {
  buf.extend_from_slice(&node.prefix);
  if let Some(pos) = node.value {
    items.push((buf.clone(), pos));
  }
  match &node.children {
    Children::Sparse { keys, nodes } => {
      for (edge, child) in keys.iter().zip(nodes.iter()) {
        buf.push(*edge);
        collect(child, buf, items);
        buf.pop();
      }
    }
    Children::Dense(slots) => {
      for (edge, slot) in slots.iter().enumerate() {
        if let Some(child) = slot {
          buf.push(edge as u8);
          collect(child, buf, items);
          buf.pop();
        }
      }
    }
  }
  buf.truncate(buf.len() - node.prefix.len());
}

impl AdaptiveRadixTree {
  pub fn new() -> Self {
    Self {
      tree: Arc::new(RwLock::new(ArtTree {
        root: ArtNode::new(Vec::new(), None),
        len: 0,
      })),
    }
  }

  fn materialize(&self) -> Vec<(Vec<u8>, RecordPos)> {
    let tree = self.tree.read();
    let mut items = Vec::with_capacity(tree.len);
    collect(&tree.root, &mut Vec::new(), &mut items);
    items
  }
}

impl Default for AdaptiveRadixTree {
  fn default() -> Self {
    Self::new()
  }
}

impl Indexer for AdaptiveRadixTree {
  fn put(&self, key: Vec<u8>, pos: RecordPos) -> Option<RecordPos> {
    let mut tree = self.tree.write();
    let old = insert(&mut tree.root, &key, pos);
    if old.is_none() {
      tree.len += 1;
    }
    old
  }

  fn get(&self, key: Vec<u8>) -> Option<RecordPos> {
    let tree = self.tree.read();
    lookup(&tree.root, &key).and_then(|node| node.value)
  }

  fn delete(&self, key: Vec<u8>) -> Option<RecordPos> {
    let mut tree = self.tree.write();
    let old = remove(&mut tree.root, &key);
    if old.is_some() {
      tree.len -= 1;
    }
    old
  }

  fn size(&self) -> usize {
    self.tree.read().len
  }

  fn list_keys(&self) -> Result<Vec<Bytes>> {
    Ok(
      self
        .materialize()
        .into_iter()
        .map(|(key, _)| Bytes::from(key))
        .collect(),
    )
  }

  fn iterator(&self, options: IteratorOptions) -> Box<dyn IndexIterator> {
    Box::new(SnapshotIterator::new(self.materialize(), options))
  }

  fn close(&self) -> Result<()> {
    Ok(())
  }
}
