//! Variable scoping: file scopes, subninja nesting, and build-edge scopes.

use super::eval::{append_escaped_path, evaluate, Scope};
use crate::rule::Rule;
use raw_string::RawString;
use std::collections::HashMap;

/// A flat name → value mapping of already-evaluated variables.
#[derive(Clone, Debug, Default)]
pub struct BasicScope {
	variables: HashMap<String, RawString>,
}

impl BasicScope {
	pub fn new() -> Self {
		BasicScope::default()
	}

	/// Insert a variable, replacing any earlier definition.
	pub fn set(&mut self, key: &str, value: RawString) {
		self.variables.insert(key.to_string(), value);
	}
}

impl Scope for BasicScope {
	fn append_value(&self, output: &mut RawString, name: &str) -> bool {
		match self.variables.get(name) {
			Some(value) => {
				output.push_str(value);
				true
			}
			None => false,
		}
	}
}

/// A non-empty stack of scopes, one frame per `subninja` level.
///
/// Frames are materialized lazily on first write, so a subninja file which
/// defines no variables allocates nothing.
#[derive(Debug, Default)]
pub struct NestedScope {
	// (depth, frame) pairs for every depth that saw a write, innermost last.
	frames: Vec<(usize, BasicScope)>,
	depth: usize,
}

impl NestedScope {
	pub fn new() -> Self {
		NestedScope::default()
	}

	/// The number of scopes on the stack.
	pub fn len(&self) -> usize {
		self.depth + 1
	}

	pub fn is_empty(&self) -> bool {
		false
	}

	/// Enter a new innermost scope.
	pub fn push(&mut self) {
		self.depth += 1;
	}

	/// Leave the innermost scope, returning the variables written to it.
	///
	/// Must not be called on the outermost scope.
	pub fn pop(&mut self) -> BasicScope {
		debug_assert!(self.depth > 0);
		let top_is_materialized = match self.frames.last() {
			Some((depth, _)) => *depth == self.depth,
			None => false,
		};
		let top = if top_is_materialized {
			match self.frames.pop() {
				Some((_, frame)) => frame,
				None => BasicScope::new(),
			}
		} else {
			BasicScope::new()
		};
		if self.depth > 0 {
			self.depth -= 1;
		}
		top
	}

	/// Set a variable in the innermost scope.
	pub fn set(&mut self, key: &str, value: RawString) {
		let top_is_materialized = match self.frames.last() {
			Some((depth, _)) => *depth == self.depth,
			None => false,
		};
		if !top_is_materialized {
			self.frames.push((self.depth, BasicScope::new()));
		}
		if let Some((_, frame)) = self.frames.last_mut() {
			frame.set(key, value);
		}
	}
}

impl Scope for NestedScope {
	fn append_value(&self, output: &mut RawString, name: &str) -> bool {
		self.frames
			.iter()
			.rev()
			.any(|(_, frame)| frame.append_value(output, name))
	}
}

/// The scope seen from inside a single build edge.
///
/// Lookup order follows the ninja manual: the built-in `$in`, `$out` and
/// `$in_newline`; bindings local to the edge; rule-level bindings, expanded
/// lazily against this same scope; then the surrounding file scope.
pub struct EdgeScope<'a, S: Scope> {
	ins: &'a [RawString],
	outs: &'a [RawString],
	local: BasicScope,
	rule: &'a Rule,
	parent: &'a S,
}

impl<'a, S: Scope> EdgeScope<'a, S> {
	/// Create the scope for one edge.
	///
	/// `ins` and `outs` are the explicit inputs and outputs only; implicit
	/// and order-only paths never show up in `$in` or `$out`.
	pub fn new(parent: &'a S, rule: &'a Rule, ins: &'a [RawString], outs: &'a [RawString]) -> Self {
		EdgeScope {
			ins,
			outs,
			local: BasicScope::new(),
			rule,
			parent,
		}
	}

	/// Set a variable local to this edge.
	pub fn set(&mut self, key: &str, value: RawString) {
		self.local.set(key, value);
	}

	fn append_paths(output: &mut RawString, paths: &[RawString], separator: u8) {
		for (i, path) in paths.iter().enumerate() {
			if i > 0 {
				output.push(separator);
			}
			append_escaped_path(output, path);
		}
	}
}

impl<'a, S: Scope> Scope for EdgeScope<'a, S> {
	fn append_value(&self, output: &mut RawString, name: &str) -> bool {
		match name {
			"in" => {
				Self::append_paths(output, self.ins, b' ');
				true
			}
			"out" => {
				Self::append_paths(output, self.outs, b' ');
				true
			}
			"in_newline" => {
				Self::append_paths(output, self.ins, b'\n');
				true
			}
			_ => {
				if self.local.append_value(output, name) {
					return true;
				}
				if let Some(value) = self.rule.lookup_var(name) {
					// Rule bindings expand late, with `$in` and friends in
					// scope.
					evaluate(output, value, self);
					return true;
				}
				self.parent.append_value(output, name)
			}
		}
	}
}
