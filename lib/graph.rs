//! The file graph: interned canonical paths with adjacency both ways.

use crate::canonical::canonicalize_path_in_place;
use indexmap::map::Entry;
use indexmap::IndexMap;
use raw_string::{RawStr, RawString};

/// A dependency graph over canonical paths.
///
/// Node indices are dense, stable, and assigned in insertion order. Every
/// path is canonicalized before interning, so two spellings of the same
/// file share one node.
#[derive(Debug, Default)]
pub struct Graph {
	lookup: IndexMap<RawString, ()>,
	ins: Vec<Vec<usize>>,
	outs: Vec<Vec<usize>>,
	default_index: Option<usize>,
}

impl Graph {
	pub fn new() -> Self {
		Graph::default()
	}

	/// The number of nodes.
	pub fn size(&self) -> usize {
		self.ins.len()
	}

	/// Canonicalize `path` and return its node, interning it if new.
	pub fn add_path(&mut self, mut path: RawString) -> usize {
		canonicalize_path_in_place(&mut path);
		self.intern(path)
	}

	/// Return the node for an already-canonical path, interning it if new.
	///
	/// Paths in the dep log were canonicalized when ninja wrote them, so
	/// no further work is needed beyond the lookup.
	pub fn add_normalized_path(&mut self, path: &RawStr) -> usize {
		debug_assert!({
			let mut copy = RawString::from(path);
			canonicalize_path_in_place(&mut copy);
			copy == RawString::from(path)
		});
		if let Some((index, _, _)) = self.lookup.get_full(path) {
			return index;
		}
		self.intern(path.into())
	}

	fn intern(&mut self, path: RawString) -> usize {
		let entry = self.lookup.entry(path);
		let index = entry.index();
		if let Entry::Vacant(entry) = entry {
			entry.insert(());
			self.ins.push(Vec::new());
			self.outs.push(Vec::new());
		}
		index
	}

	/// Look up a path, canonicalizing it first.
	pub fn find_path(&self, path: &RawStr) -> Option<usize> {
		let mut canonical = RawString::from(path);
		canonicalize_path_in_place(&mut canonical);
		self.find_normalized_path(&canonical)
	}

	/// Look up an already-canonical path.
	pub fn find_normalized_path(&self, path: &RawStr) -> Option<usize> {
		match self.lookup.get_full(path) {
			Some((index, _, _)) => Some(index),
			None => None,
		}
	}

	/// The synthetic node collecting `default` targets. Created on first
	/// use; later calls return the same node.
	pub fn add_default(&mut self) -> usize {
		if let Some(index) = self.default_index {
			return index;
		}
		// Canonicalization never produces an empty path, so the empty key
		// cannot collide with a real file.
		let index = self.intern(RawString::new());
		self.default_index = Some(index);
		index
	}

	pub fn is_default(&self, index: usize) -> bool {
		self.default_index == Some(index)
	}

	/// Record that `input` feeds the edge producing `output`.
	///
	/// Self-edges are dropped. Both adjacency lists keep insertion order.
	pub fn add_edge(&mut self, input: usize, output: usize) {
		if input == output {
			return;
		}
		self.outs[input].push(output);
		self.ins[output].push(input);
	}

	/// The display name of a node.
	pub fn path(&self, index: usize) -> &RawStr {
		if self.is_default(index) {
			return RawStr::from_str("default");
		}
		match self.lookup.get_index(index) {
			Some((path, _)) => &path[..],
			None => RawStr::from_str(""),
		}
	}

	/// The inputs of the edge producing `index`.
	pub fn ins(&self, index: usize) -> &[usize] {
		&self.ins[index]
	}

	/// The nodes whose edges consume `index`.
	pub fn outs(&self, index: usize) -> &[usize] {
		&self.outs[index]
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn interning_is_canonical() {
		let mut graph = Graph::new();
		let a = graph.add_path(RawString::from("src/a.c"));
		let same = graph.add_path(RawString::from("./src//a.c"));
		let other = graph.add_path(RawString::from("src/b.c"));
		assert_eq!(a, same);
		assert_ne!(a, other);
		assert_eq!(graph.size(), 2);
		assert_eq!(graph.path(a), RawStr::from_str("src/a.c"));
	}

	#[test]
	fn find_path_canonicalizes() {
		let mut graph = Graph::new();
		let a = graph.add_path(RawString::from("a.c"));
		assert_eq!(graph.find_path(RawStr::from_str("./a.c")), Some(a));
		assert_eq!(graph.find_path(RawStr::from_str("missing.c")), None);
		assert_eq!(graph.find_normalized_path(RawStr::from_str("a.c")), Some(a));
	}

	#[test]
	fn adjacency_keeps_insertion_order() {
		let mut graph = Graph::new();
		let a = graph.add_path(RawString::from("a"));
		let b = graph.add_path(RawString::from("b"));
		let c = graph.add_path(RawString::from("c"));
		graph.add_edge(b, a);
		graph.add_edge(c, a);
		graph.add_edge(b, c);
		assert_eq!(graph.ins(a), [b, c]);
		assert_eq!(graph.outs(b), [a, c]);
		assert!(graph.ins(b).is_empty());
	}

	#[test]
	fn self_edges_are_dropped() {
		let mut graph = Graph::new();
		let a = graph.add_path(RawString::from("a"));
		graph.add_edge(a, a);
		assert!(graph.ins(a).is_empty());
		assert!(graph.outs(a).is_empty());
	}

	#[test]
	fn default_node_is_distinct() {
		let mut graph = Graph::new();
		let a = graph.add_path(RawString::from("default"));
		let d = graph.add_default();
		assert_ne!(a, d);
		assert_eq!(graph.add_default(), d);
		assert!(graph.is_default(d));
		assert_eq!(graph.path(d), RawStr::from_str("default"));
	}
}
