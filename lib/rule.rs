//! Build rules and their reserved variables.

use crate::manifest::EvalString;

/// The variable names which may appear in a `rule` block.
///
/// Anything else in a rule body is an error, matching ninja.
pub const RESERVED: [&str; 11] = [
	"command",
	"depfile",
	"dyndep",
	"description",
	"deps",
	"generator",
	"pool",
	"restat",
	"rspfile",
	"rspfile_content",
	"msvc_deps_prefix",
];

/// A rule definition: a name plus its (unexpanded) reserved bindings.
#[derive(Debug)]
pub struct Rule {
	name: String,
	bindings: [Option<EvalString>; RESERVED.len()],
	/// Where the rule's source text lives in the build context's parts.
	pub parts_index: usize,
}

impl Rule {
	pub fn new(name: &str) -> Self {
		Rule {
			name: name.to_string(),
			bindings: Default::default(),
			parts_index: usize::max_value(),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Add a binding to the rule, replacing any earlier one.
	///
	/// Returns `false` when `name` is not a reserved variable. The reserved
	/// set is small and fixed, so a linear scan beats any map.
	pub fn add(&mut self, name: &str, value: EvalString) -> bool {
		match RESERVED.iter().position(|reserved| *reserved == name) {
			Some(i) => {
				self.bindings[i] = Some(value);
				true
			}
			None => false,
		}
	}

	/// Look up a binding by name.
	pub fn lookup_var(&self, name: &str) -> Option<&EvalString> {
		RESERVED
			.iter()
			.position(|reserved| *reserved == name)
			.and_then(|i| self.bindings[i].as_ref())
	}
}
