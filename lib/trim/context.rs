//! The parsed state of a manifest chain: source parts, build commands,
//! rules, scopes, and the file graph.

use crate::buildlog::hash_command;
use crate::canonical::canonicalize_path_in_place;
use crate::error::ErrorWithLocation;
use crate::graph::Graph;
use crate::manifest::read_bytes;
use crate::manifest::reader::{ManifestReader, Record};
use crate::manifest::scope::{EdgeScope, NestedScope};
use crate::manifest::{evaluate, evaluate_to_string, ReadError, Scope};
use crate::rule::Rule;
use pile::Pile;
use raw_string::{RawStr, RawString};
use std::collections::HashMap;
use std::path::Path;

/// One span of the eventual output: original source text, a synthesized
/// replacement, or text that must never be emitted (subninja'd files).
#[derive(Debug)]
pub enum Part<'a> {
	Source(&'a RawStr),
	Synth(RawString),
	Omitted,
}

/// How a build command ends up in the output.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Resolution {
	/// Emit the original source text.
	Print,
	/// Replace with a `phony` edge keeping the same outputs.
	Phony,
}

/// One `build` or `default` statement.
#[derive(Debug)]
pub struct BuildCommand<'a> {
	pub resolution: Resolution,
	/// Index of this command's span in [`BuildContext::parts`].
	pub parts_index: usize,
	/// Hash of the evaluated command, as stored in `.ninja_log`.
	pub hash: u64,
	/// The source from the start of the construct up to, but not
	/// including, the `:` after the outputs.
	pub out_str: &'a RawStr,
	/// The `|@ validations` suffix of the header line, possibly empty.
	pub validation_str: &'a RawStr,
	/// Index into [`BuildContext::rules`].
	pub rule_index: usize,
}

/// Index of the built-in `phony` rule.
pub const PHONY_RULE: usize = 0;
/// Index of the pseudo-rule backing `default` statements.
pub const DEFAULT_RULE: usize = 1;

/// Whether `rule_index` is `phony` or the `default` pseudo-rule.
pub fn is_built_in_rule(rule_index: usize) -> bool {
	rule_index < 2
}

/// Everything learned from parsing a manifest and the files it pulls in.
///
/// All file contents live in the [`Pile`] handed to [`new`][Self::new], so
/// the `Part` and `BuildCommand` slices stay valid for the context's
/// lifetime.
pub struct BuildContext<'a> {
	pile: &'a Pile<Vec<u8>>,
	pub parts: Vec<Part<'a>>,
	pub commands: Vec<BuildCommand<'a>>,
	/// For each graph node, the command producing it, if any.
	pub node_to_command: Vec<Option<usize>>,
	pub rules: Vec<Rule>,
	rule_lookup: HashMap<String, usize>,
	pub file_scope: NestedScope,
	pub graph: Graph,
}

impl<'a> BuildContext<'a> {
	pub fn new(pile: &'a Pile<Vec<u8>>) -> Self {
		let mut ctx = BuildContext {
			pile,
			parts: Vec::new(),
			commands: Vec::new(),
			node_to_command: Vec::new(),
			rules: Vec::new(),
			rule_lookup: HashMap::new(),
			file_scope: NestedScope::new(),
			graph: Graph::new(),
		};
		for name in &["phony", "default"] {
			let mut rule = Rule::new(name);
			rule.parts_index = ctx.parts.len();
			ctx.parts.push(Part::Source(RawStr::from_str("")));
			ctx.rule_lookup.insert(name.to_string(), ctx.rules.len());
			ctx.rules.push(rule);
		}
		ctx
	}

	/// Intern a path, keeping the node-to-command map in step with the
	/// graph.
	pub fn path_index(&mut self, path: RawString) -> usize {
		let index = self.graph.add_path(path);
		if index >= self.node_to_command.len() {
			self.node_to_command.resize(index + 1, None);
		}
		index
	}

	/// Intern an already-canonical path (one from a log file).
	pub fn path_index_for_normalized(&mut self, path: &RawStr) -> usize {
		let index = self.graph.add_normalized_path(path);
		if index >= self.node_to_command.len() {
			self.node_to_command.resize(index + 1, None);
		}
		index
	}

	fn default_index(&mut self) -> usize {
		let index = self.graph.add_default();
		if index >= self.node_to_command.len() {
			self.node_to_command.resize(index + 1, None);
		}
		index
	}

	fn push_part(&mut self, emit: bool, slice: &'a RawStr) {
		self.parts.push(if emit {
			Part::Source(slice)
		} else {
			Part::Omitted
		});
	}

	/// Parse `source`, recursing into `include`d and `subninja`'d files.
	///
	/// `include`d text is inlined in place of the `include` line. A
	/// `subninja` keeps its own line verbatim; the child file's constructs
	/// feed the graph and rule table under a pushed scope (`emit` false),
	/// but its text is never part of the output.
	pub fn parse(
		&mut self,
		filename: &Path,
		source: &'a RawStr,
		emit: bool,
	) -> Result<(), ErrorWithLocation<ReadError>> {
		let mut reader = ManifestReader::new(filename, source);
		while let Some(record) = reader.next()? {
			match record {
				Record::Variable(mut var) => {
					let name = var.name()?;
					let mut value = RawString::new();
					evaluate(&mut value, var.value()?, &self.file_scope);
					self.file_scope.set(name, value);
					let slice = &source[var.start()..var.position()];
					self.push_part(emit, slice);
				}

				Record::Pool(mut pool) => {
					pool.name()?;
					let mut vars = pool.variables();
					while let Some(mut var) = vars.next()? {
						var.name()?;
						var.value()?;
					}
					let slice = &source[pool.start()..pool.position()];
					self.push_part(emit, slice);
				}

				Record::Rule(mut rule_reader) => {
					let name = rule_reader.name()?;
					if self.rule_lookup.contains_key(name) {
						return Err(rule_reader.error(ReadError::DuplicateRule(name.to_string())));
					}
					let mut rule = Rule::new(name);
					let mut vars = rule_reader.variables();
					while let Some(mut var) = vars.next()? {
						let var_name = var.name()?;
						let value = var.value()?.clone();
						if !rule.add(var_name, value) {
							return Err(var.error(ReadError::UnexpectedRuleVariable {
								rule: name.to_string(),
								variable: var_name.to_string(),
							}));
						}
					}
					rule.parts_index = self.parts.len();
					let slice = &source[rule_reader.start()..rule_reader.position()];
					self.push_part(emit, slice);
					self.rule_lookup.insert(name.to_string(), self.rules.len());
					self.rules.push(rule);
				}

				Record::Build(mut build) => {
					let mut outs = Vec::new();
					{
						let mut paths = build.outs();
						while let Some(path) = paths.next()? {
							outs.push(evaluate_to_string(path, &self.file_scope));
						}
					}
					let explicit_outs = outs.len();
					{
						let mut paths = build.implicit_outs()?;
						while let Some(path) = paths.next()? {
							outs.push(evaluate_to_string(path, &self.file_scope));
						}
					}
					if outs.is_empty() {
						return Err(build.error(ReadError::MissingOutputs));
					}
					let out_str = &source[build.start()..build.position()];

					let rule_name = build.rule_name()?;
					let rule_index = match self.rule_lookup.get(rule_name) {
						Some(&index) => index,
						None => {
							return Err(
								build.error(ReadError::UndefinedRule(rule_name.to_string()))
							);
						}
					};

					let mut ins = Vec::new();
					{
						let mut paths = build.ins();
						while let Some(path) = paths.next()? {
							ins.push(evaluate_to_string(path, &self.file_scope));
						}
					}
					let explicit_ins = ins.len();
					{
						let mut paths = build.implicit_ins()?;
						while let Some(path) = paths.next()? {
							ins.push(evaluate_to_string(path, &self.file_scope));
						}
					}
					{
						let mut paths = build.order_only_deps()?;
						while let Some(path) = paths.next()? {
							ins.push(evaluate_to_string(path, &self.file_scope));
						}
					}

					// Validations are kept as text for the phony rewrite,
					// but play no role in the graph.
					let validation_start = build.position();
					{
						let mut paths = build.validations()?;
						while paths.next()?.is_some() {}
					}
					let validation_str = &source[validation_start..build.position()];

					// Hashes must match the ones ninja wrote to its log,
					// and ninja hashes commands with canonical paths.
					for path in outs.iter_mut().chain(ins.iter_mut()) {
						canonicalize_path_in_place(path);
					}

					let hash = {
						let mut scope = EdgeScope::new(
							&self.file_scope,
							&self.rules[rule_index],
							&ins[..explicit_ins],
							&outs[..explicit_outs],
						);
						let mut vars = build.variables()?;
						while let Some(mut var) = vars.next()? {
							let var_name = var.name()?;
							let value = evaluate_to_string(var.value()?, &scope);
							scope.set(var_name, value);
						}
						let mut command = RawString::new();
						scope.append_value(&mut command, "command");
						let mut rspfile_content = RawString::new();
						scope.append_value(&mut rspfile_content, "rspfile_content");
						hash_command(&command, &rspfile_content)
					};

					let parts_index = self.parts.len();
					let slice = &source[build.start()..build.position()];
					self.push_part(emit, slice);
					let command_index = self.commands.len();
					self.commands.push(BuildCommand {
						resolution: Resolution::Phony,
						parts_index,
						hash,
						out_str,
						validation_str,
						rule_index,
					});

					let mut out_indices = Vec::with_capacity(outs.len());
					for out in outs {
						let index = self.path_index(out);
						self.node_to_command[index] = Some(command_index);
						out_indices.push(index);
					}
					for input in ins {
						let index = self.path_index(input);
						for &out in &out_indices {
							self.graph.add_edge(index, out);
						}
					}
				}

				Record::Default(mut default) => {
					let mut targets = Vec::new();
					{
						let mut paths = default.paths();
						while let Some(path) = paths.next()? {
							targets.push(evaluate_to_string(path, &self.file_scope));
						}
					}
					if targets.is_empty() {
						return Err(default.error(ReadError::ExpectedPath));
					}
					let parts_index = self.parts.len();
					let slice = &source[default.start()..default.position()];
					self.push_part(emit, slice);
					let command_index = self.commands.len();
					// Phonied edges keep their outputs defined, so a
					// `default` line stays valid and is always emitted.
					self.commands.push(BuildCommand {
						resolution: Resolution::Print,
						parts_index,
						hash: 0,
						out_str: RawStr::from_str(""),
						validation_str: RawStr::from_str(""),
						rule_index: DEFAULT_RULE,
					});
					let default_index = self.default_index();
					self.node_to_command[default_index] = Some(command_index);
					for target in targets {
						let input = self.path_index(target);
						self.graph.add_edge(input, default_index);
					}
				}

				Record::Include(mut include) => {
					let mut path = RawString::new();
					evaluate(&mut path, include.path()?, &self.file_scope);
					let file = match path.to_path() {
						Ok(path) => include.parent().with_file_name(path),
						Err(e) => return Err(include.error(ReadError::from(e))),
					};
					if !file.exists() {
						return Err(include.error(ReadError::IncludeNotFound(file)));
					}
					let contents = match read_bytes(&file) {
						Ok(contents) => contents,
						Err(error) => return Err(include.error(error)),
					};
					let pile = self.pile;
					let contents = RawStr::from_bytes(pile.add(contents));
					self.parse(&file, contents, emit)?;
				}

				Record::Subninja(mut subninja) => {
					let mut path = RawString::new();
					evaluate(&mut path, subninja.path()?, &self.file_scope);
					let file = match path.to_path() {
						Ok(path) => subninja.parent().with_file_name(path),
						Err(e) => return Err(subninja.error(ReadError::from(e))),
					};
					if !file.exists() {
						return Err(subninja.error(ReadError::IncludeNotFound(file)));
					}
					let slice = &source[subninja.start()..subninja.position()];
					self.push_part(emit, slice);
					let contents = match read_bytes(&file) {
						Ok(contents) => contents,
						Err(error) => return Err(subninja.error(error)),
					};
					let pile = self.pile;
					let contents = RawStr::from_bytes(pile.add(contents));
					self.file_scope.push();
					let result = self.parse(&file, contents, false);
					self.file_scope.pop();
					result?;
				}
			}
		}

		let tail = reader.tail();
		if !tail.is_empty() {
			self.push_part(emit, tail);
		}
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::buildlog::murmur_hash_64a;

	fn parse(source: &str) -> (Pile<Vec<u8>>, String) {
		(Pile::new(), source.to_string())
	}

	fn parts_to_string(ctx: &BuildContext) -> String {
		let mut out = Vec::new();
		for part in &ctx.parts {
			match part {
				Part::Source(slice) => out.extend_from_slice(slice.as_bytes()),
				Part::Synth(text) => out.extend_from_slice(text.as_bytes()),
				Part::Omitted => {}
			}
		}
		String::from_utf8(out).unwrap()
	}

	#[test]
	fn parses_edges_into_the_graph() {
		let source = "\
rule cc
  command = cc $in -o $out

build a.o: cc a.c | a.h || order
build prog: cc a.o b.o
";
		let (pile, source) = parse(source);
		let mut ctx = BuildContext::new(&pile);
		ctx.parse(Path::new("build.ninja"), RawStr::from_str(&source), true)
			.unwrap();

		assert_eq!(ctx.commands.len(), 2);
		assert_eq!(ctx.rules.len(), 3);

		let a_o = ctx.graph.find_path(RawStr::from_str("a.o")).unwrap();
		let a_c = ctx.graph.find_path(RawStr::from_str("a.c")).unwrap();
		let a_h = ctx.graph.find_path(RawStr::from_str("a.h")).unwrap();
		let order = ctx.graph.find_path(RawStr::from_str("order")).unwrap();
		let prog = ctx.graph.find_path(RawStr::from_str("prog")).unwrap();
		assert_eq!(ctx.graph.ins(a_o), [a_c, a_h, order]);
		assert!(ctx.graph.outs(a_o).contains(&prog));
		assert_eq!(ctx.node_to_command[a_o], Some(0));
		assert_eq!(ctx.node_to_command[prog], Some(1));
		assert_eq!(ctx.node_to_command[a_c], None);

		// $in holds only the explicit inputs.
		assert_eq!(ctx.commands[0].hash, murmur_hash_64a(b"cc a.c -o a.o"));
		assert_eq!(
			ctx.commands[1].hash,
			murmur_hash_64a(b"cc a.o b.o -o prog")
		);

		// Concatenating the parts reproduces the source.
		assert_eq!(parts_to_string(&ctx), source);
	}

	#[test]
	fn out_str_stops_before_the_colon() {
		let source = "rule cc\n  command = cc\nbuild out1 out2 | imp: cc in\n";
		let (pile, source) = parse(source);
		let mut ctx = BuildContext::new(&pile);
		ctx.parse(Path::new("build.ninja"), RawStr::from_str(&source), true)
			.unwrap();
		assert_eq!(
			ctx.commands[0].out_str,
			RawStr::from_str("build out1 out2 | imp")
		);
		assert!(ctx.commands[0].validation_str.is_empty());
	}

	#[test]
	fn validation_str_keeps_the_suffix() {
		let source = "rule cc\n  command = cc\nbuild x: cc y |@ v w\n";
		let (pile, source) = parse(source);
		let mut ctx = BuildContext::new(&pile);
		ctx.parse(Path::new("build.ninja"), RawStr::from_str(&source), true)
			.unwrap();
		assert_eq!(ctx.commands[0].validation_str, RawStr::from_str("|@ v w"));
	}

	#[test]
	fn edge_locals_shadow_file_scope() {
		let source = "\
cflags = -O2
rule cc
  command = cc $cflags $in
build a.o: cc a.c
  cflags = -O0
build b.o: cc b.c
";
		let (pile, source) = parse(source);
		let mut ctx = BuildContext::new(&pile);
		ctx.parse(Path::new("build.ninja"), RawStr::from_str(&source), true)
			.unwrap();
		assert_eq!(ctx.commands[0].hash, murmur_hash_64a(b"cc -O0 a.c"));
		assert_eq!(ctx.commands[1].hash, murmur_hash_64a(b"cc -O2 b.c"));
	}

	#[test]
	fn rspfile_content_feeds_the_hash() {
		let source = "\
rule link
  command = link @$out.rsp
  rspfile = $out.rsp
  rspfile_content = $in
build prog: link a.o
";
		let (pile, source) = parse(source);
		let mut ctx = BuildContext::new(&pile);
		ctx.parse(Path::new("build.ninja"), RawStr::from_str(&source), true)
			.unwrap();
		assert_eq!(
			ctx.commands[0].hash,
			murmur_hash_64a(b"link @prog.rsp;rspfile=a.o")
		);
	}

	#[test]
	fn hashes_use_canonical_paths() {
		let source = "\
rule cc
  command = cc $in -o $out
build ./out/../a.o: cc ./a.c
";
		let (pile, source) = parse(source);
		let mut ctx = BuildContext::new(&pile);
		ctx.parse(Path::new("build.ninja"), RawStr::from_str(&source), true)
			.unwrap();
		assert!(ctx.graph.find_normalized_path(RawStr::from_str("a.o")).is_some());
		assert_eq!(ctx.commands[0].hash, murmur_hash_64a(b"cc a.c -o a.o"));
	}

	#[test]
	fn duplicate_rule_is_an_error() {
		let source = "rule cc\n  command = cc\nrule cc\n  command = cc\n";
		let (pile, source) = parse(source);
		let mut ctx = BuildContext::new(&pile);
		let err = ctx
			.parse(Path::new("build.ninja"), RawStr::from_str(&source), true)
			.unwrap_err();
		match err.error {
			ReadError::DuplicateRule(name) => assert_eq!(name, "cc"),
			other => panic!("unexpected error: {}", other),
		}
	}

	#[test]
	fn unknown_rule_is_an_error() {
		let source = "build a.o: cc a.c\n";
		let (pile, source) = parse(source);
		let mut ctx = BuildContext::new(&pile);
		let err = ctx
			.parse(Path::new("build.ninja"), RawStr::from_str(&source), true)
			.unwrap_err();
		match err.error {
			ReadError::UndefinedRule(name) => assert_eq!(name, "cc"),
			other => panic!("unexpected error: {}", other),
		}
	}

	#[test]
	fn non_reserved_rule_variable_is_an_error() {
		let source = "rule cc\n  commandd = cc\n";
		let (pile, source) = parse(source);
		let mut ctx = BuildContext::new(&pile);
		let err = ctx
			.parse(Path::new("build.ninja"), RawStr::from_str(&source), true)
			.unwrap_err();
		match err.error {
			ReadError::UnexpectedRuleVariable { rule, variable } => {
				assert_eq!(rule, "cc");
				assert_eq!(variable, "commandd");
			}
			other => panic!("unexpected error: {}", other),
		}
	}

	#[test]
	fn phony_edges_use_the_built_in_rule() {
		let source = "build alias: phony real\n";
		let (pile, source) = parse(source);
		let mut ctx = BuildContext::new(&pile);
		ctx.parse(Path::new("build.ninja"), RawStr::from_str(&source), true)
			.unwrap();
		assert_eq!(ctx.commands[0].rule_index, PHONY_RULE);
		assert!(is_built_in_rule(ctx.commands[0].rule_index));
	}
}
