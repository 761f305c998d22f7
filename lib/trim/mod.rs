//! The trim solver: reduce a manifest to the edges affected by a change.
//!
//! Given the manifest, the paths the user marked as changed, and ninja's
//! own records of the previous build (`.ninja_deps` and `.ninja_log`), the
//! solver keeps every build command that must run again and replaces all
//! others with `phony` edges over the same outputs. Kept commands are
//! emitted byte-for-byte from the original source.

pub mod context;

use self::context::{is_built_in_rule, BuildContext, Part, Resolution};
use crate::buildlog::{LogError, LogReader};
use crate::deplog::{DepLogError, DepsReader, DepsRecord};
use crate::error::{ErrorWithLocation, Location};
use crate::manifest::{ReadError, Scope};
use log::debug;
use pile::Pile;
use raw_string::{RawStr, RawString};
use std::error;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Component, Path, PathBuf};

/// An error from the trim pipeline. All of them are fatal.
#[derive(Debug)]
pub enum Error {
	Manifest(ErrorWithLocation<ReadError>),
	DepLog(DepLogError),
	Log(LogError),
	Io(std::io::Error),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::Manifest(e) => write!(f, "{}", e),
			Error::DepLog(e) => write!(f, "{}", e),
			Error::Log(e) => write!(f, "{}", e),
			Error::Io(e) => write!(f, "{}", e),
		}
	}
}

impl error::Error for Error {}

impl From<ErrorWithLocation<ReadError>> for Error {
	fn from(src: ErrorWithLocation<ReadError>) -> Error {
		Error::Manifest(src)
	}
}

impl From<DepLogError> for Error {
	fn from(src: DepLogError) -> Error {
		Error::DepLog(src)
	}
}

impl From<LogError> for Error {
	fn from(src: LogError) -> Error {
		Error::Log(src)
	}
}

impl From<std::io::Error> for Error {
	fn from(src: std::io::Error) -> Error {
		Error::Io(src)
	}
}

/// Reduce the manifest at `ninja_file` (with contents `contents`) to the
/// work needed for the paths listed in `affected`, one per line, and write
/// the resulting manifest to `output`.
///
/// `.ninja_deps` and `.ninja_log` are looked up in the manifest's
/// `builddir`, resolved against the manifest's own directory. A missing
/// dep log merely adds no edges; a missing build log means nothing can be
/// trusted, so everything is kept. With `explain`, every inclusion
/// decision is reported on stderr.
pub fn trim<W: Write, A: BufRead>(
	output: &mut W,
	ninja_file: &Path,
	contents: Vec<u8>,
	affected: &mut A,
	explain: bool,
) -> Result<(), Error> {
	let pile = Pile::new();
	let contents = RawStr::from_bytes(pile.add(contents));
	let mut ctx = BuildContext::new(&pile);
	ctx.parse(ninja_file, contents, true)?;
	debug!(
		"parsed {} build commands over {} paths",
		ctx.commands.len(),
		ctx.graph.size()
	);

	let ninja_file_dir = ninja_file.parent().unwrap_or_else(|| Path::new(""));
	let builddir = {
		let mut builddir = RawString::new();
		ctx.file_scope.append_value(&mut builddir, "builddir");
		match builddir.to_path() {
			Ok(path) => ninja_file_dir.join(path),
			Err(_) => {
				return Err(Error::Manifest(Location::UNKNOWN.error(
					ReadError::InvalidUtf8 {
						variable: Some("builddir".to_string()),
					},
				)));
			}
		}
	};

	let ninja_deps = builddir.join(".ninja_deps");
	if ninja_deps.exists() {
		merge_deps(&mut ctx, &ninja_deps)?;
	}

	let mut affected_nodes = vec![false; ctx.graph.size()];

	let ninja_log = builddir.join(".ninja_log");
	if !ninja_log.exists() {
		// Without a log there is no record of what already ran, so keep
		// every command.
		if explain {
			eprintln!(
				"Unable to find '{}', so including everything",
				ninja_log.display()
			);
		}
		for mark in &mut affected_nodes {
			*mark = true;
		}
	} else {
		mark_changed_commands(&ctx, &ninja_log, &mut affected_nodes, explain)?;
	}

	mark_user_affected(&ctx, ninja_file_dir, affected, &mut affected_nodes, explain)?;

	let mut seen = vec![false; ctx.graph.size()];
	for index in 0..ctx.graph.size() {
		mark_if_inputs_affected(index, &mut seen, &mut affected_nodes, &ctx, explain);
	}

	// Inputs of an affected command are not themselves affected, but they
	// must exist before the command can run, so pull them in too.
	for flag in &mut seen {
		*flag = false;
	}
	let mut needs_all_inputs = vec![false; ctx.graph.size()];
	for index in 0..ctx.graph.size() {
		mark_required_inputs(
			index,
			&mut seen,
			&mut affected_nodes,
			&mut needs_all_inputs,
			&ctx,
			explain,
		);
	}

	for index in 0..ctx.graph.size() {
		if affected_nodes[index] {
			if let Some(command) = ctx.node_to_command[index] {
				ctx.commands[command].resolution = Resolution::Print;
			}
		}
	}

	let mut rule_referenced = vec![false; ctx.rules.len()];
	for command_index in 0..ctx.commands.len() {
		let (resolution, parts_index, rule_index) = {
			let command = &ctx.commands[command_index];
			(command.resolution, command.parts_index, command.rule_index)
		};
		// Commands from subninja'd files are never rewritten: their file
		// stays on disk as-is, so their rules must stay referenced.
		let omitted = match ctx.parts[parts_index] {
			Part::Omitted => true,
			_ => false,
		};
		if resolution == Resolution::Print || omitted {
			rule_referenced[rule_index] = true;
			continue;
		}
		let command = &ctx.commands[command_index];
		let mut phony = RawString::from(command.out_str);
		phony.push_str(if command.validation_str.is_empty() {
			": phony"
		} else {
			": phony "
		});
		phony.push_str(command.validation_str);
		phony.push(b'\n');
		ctx.parts[parts_index] = Part::Synth(phony);
	}

	for rule_index in 0..ctx.rules.len() {
		if !rule_referenced[rule_index] {
			ctx.parts[ctx.rules[rule_index].parts_index] = Part::Synth(RawString::new());
		}
	}

	for part in &ctx.parts {
		match part {
			Part::Source(slice) => output.write_all(slice.as_bytes())?,
			Part::Synth(text) => output.write_all(text.as_bytes())?,
			Part::Omitted => {}
		}
	}
	Ok(())
}

// Later records override earlier ones, so collect the whole file before
// touching the graph.
fn merge_deps(ctx: &mut BuildContext<'_>, ninja_deps: &Path) -> Result<(), Error> {
	let file = File::open(ninja_deps)?;
	let mut reader = DepsReader::new(BufReader::new(file))?;
	let mut paths: Vec<RawString> = Vec::new();
	let mut deps: Vec<Option<Vec<i32>>> = Vec::new();
	while let Some(record) = reader.read_record()? {
		match record {
			DepsRecord::Path { id, path } => {
				if id < 0 {
					continue;
				}
				let id = id as usize;
				if id >= paths.len() {
					paths.resize(id + 1, RawString::new());
				}
				paths[id] = path;
			}
			DepsRecord::Deps {
				out,
				deps: record_deps,
				..
			} => {
				if out < 0 {
					continue;
				}
				let out = out as usize;
				if out >= deps.len() {
					deps.resize(out + 1, None);
				}
				deps[out] = Some(record_deps);
			}
		}
	}

	let lookup: Vec<Option<usize>> = paths
		.iter()
		.map(|path| {
			if path.is_empty() {
				None
			} else {
				Some(ctx.path_index_for_normalized(path))
			}
		})
		.collect();

	let mut edges = 0;
	for (out, record) in deps.iter().enumerate() {
		let record = match record {
			Some(record) => record,
			None => continue,
		};
		let out_index = match lookup.get(out) {
			Some(&Some(index)) => index,
			_ => continue,
		};
		for &input in record {
			if input < 0 {
				continue;
			}
			if let Some(&Some(input_index)) = lookup.get(input as usize) {
				ctx.graph.add_edge(input_index, out_index);
				edges += 1;
			}
		}
	}
	debug!("merged {} dynamic dependencies from {:?}", edges, ninja_deps);
	Ok(())
}

// A command whose output is absent from the log never ran; one whose
// logged hash differs was edited. Both must run again.
fn mark_changed_commands(
	ctx: &BuildContext<'_>,
	ninja_log: &Path,
	affected: &mut [bool],
	explain: bool,
) -> Result<(), Error> {
	let file = File::open(ninja_log)?;
	let mut reader = LogReader::new(BufReader::new(file))?;
	let mut seen = vec![false; ctx.graph.size()];
	let mut hash_mismatch = vec![false; ctx.graph.size()];
	while let Some(entry) = reader.read_entry()? {
		// Entries in the log were written canonicalized. The last entry
		// for an output wins.
		if let Some(index) = ctx.graph.find_normalized_path(&entry.output) {
			seen[index] = true;
			let hash = ctx.node_to_command[index].map(|command| ctx.commands[command].hash);
			hash_mismatch[index] = hash != Some(entry.command_hash);
		}
	}

	for index in 0..ctx.graph.size() {
		if affected[index] || ctx.graph.ins(index).is_empty() {
			continue;
		}
		// Built-in rules never show up in the log; neither do nodes whose
		// producing edge only exists in the dep log.
		let command = match ctx.node_to_command[index] {
			Some(command) => command,
			None => continue,
		};
		if is_built_in_rule(ctx.commands[command].rule_index) {
			continue;
		}
		if !seen[index] {
			affected[index] = true;
			if explain {
				eprintln!(
					"Including '{}' as it was not found in '{}'",
					ctx.graph.path(index),
					ninja_log.display()
				);
			}
		} else if hash_mismatch[index] {
			affected[index] = true;
			if explain {
				eprintln!(
					"Including '{}' as the build command hash differs in '{}'",
					ctx.graph.path(index),
					ninja_log.display()
				);
			}
		}
	}
	Ok(())
}

fn mark_user_affected<A: BufRead>(
	ctx: &BuildContext<'_>,
	ninja_file_dir: &Path,
	affected: &mut A,
	marks: &mut [bool],
	explain: bool,
) -> Result<(), Error> {
	let mut line = RawString::new();
	loop {
		line.clear();
		if affected.read_until(b'\n', line.as_mut_bytes())? == 0 {
			return Ok(());
		}
		if line.last() == Some(b'\n') {
			line.pop();
		}
		if line.last() == Some(b'\r') {
			line.pop();
		}
		if line.is_empty() {
			continue;
		}

		// Try the path as written, then made absolute, then made relative
		// to the manifest's directory.
		let mut found = ctx.graph.find_path(&line);
		if found.is_none() {
			if let Ok(text) = line.to_str() {
				if !Path::new(text).is_absolute() {
					let absolute = absolute_path(&ninja_file_dir.join(text))?;
					found = find_path_buf(ctx, &absolute);
				} else {
					let base = absolute_path(ninja_file_dir)?;
					let relative = lexically_relative(Path::new(text), &base);
					found = find_path_buf(ctx, &relative);
				}
			}
		}

		match found {
			Some(index) => {
				if explain && !marks[index] {
					eprintln!(
						"Including '{}' as it was marked as affected by the user",
						line
					);
				}
				marks[index] = true;
			}
			None => eprintln!("'{}' not found in input file", line),
		}
	}
}

fn find_path_buf(ctx: &BuildContext<'_>, path: &Path) -> Option<usize> {
	let raw = RawString::from_bytes(path.to_string_lossy().into_owned().into_bytes());
	ctx.graph.find_path(&raw)
}

fn absolute_path(path: &Path) -> Result<PathBuf, Error> {
	if path.is_absolute() {
		Ok(path.to_path_buf())
	} else {
		Ok(std::env::current_dir()?.join(path))
	}
}

// The lexical counterpart of C++'s `path::lexically_relative`: no
// filesystem access, an empty result when the roots differ.
fn lexically_relative(path: &Path, base: &Path) -> PathBuf {
	let mut path_components = path.components();
	let mut base_components = base.components();
	loop {
		match (
			path_components.clone().next(),
			base_components.clone().next(),
		) {
			(Some(p), Some(b)) if p == b => {
				path_components.next();
				base_components.next();
			}
			_ => break,
		}
	}
	let mut result = PathBuf::new();
	for component in base_components {
		match component {
			Component::Normal(_) => result.push(".."),
			Component::CurDir => {}
			_ => return PathBuf::new(),
		}
	}
	result.push(path_components.as_path());
	result
}

// Memoized DFS: process every input first, so transitive marks have
// reached them before this node decides.
fn mark_if_inputs_affected(
	index: usize,
	seen: &mut [bool],
	affected: &mut [bool],
	ctx: &BuildContext<'_>,
	explain: bool,
) {
	if seen[index] {
		return;
	}
	seen[index] = true;

	for &input in ctx.graph.ins(index) {
		mark_if_inputs_affected(input, seen, affected, ctx, explain);
	}

	if affected[index] {
		return;
	}

	if let Some(&input) = ctx.graph.ins(index).iter().find(|&&input| affected[input]) {
		if explain && is_user_rule(ctx, index) {
			eprintln!(
				"Including '{}' as it has the affected input '{}'",
				ctx.graph.path(index),
				ctx.graph.path(input)
			);
		}
		affected[index] = true;
	}
}

// Second memoized DFS, downstream first: an affected user-defined command
// needs all of its inputs, and that need propagates to the commands
// producing them. Built-in edges are transparent but still propagate.
fn mark_required_inputs(
	index: usize,
	seen: &mut [bool],
	affected: &mut [bool],
	needs_all_inputs: &mut [bool],
	ctx: &BuildContext<'_>,
	explain: bool,
) {
	if seen[index] {
		return;
	}
	seen[index] = true;

	for &out in ctx.graph.outs(index) {
		mark_required_inputs(out, seen, affected, needs_all_inputs, ctx, explain);
	}

	if ctx.graph.ins(index).is_empty() {
		return;
	}

	if is_user_rule(ctx, index) && affected[index] {
		needs_all_inputs[index] = true;
		return;
	}

	if let Some(&out) = ctx
		.graph
		.outs(index)
		.iter()
		.find(|&&out| needs_all_inputs[out])
	{
		if !affected[index] {
			if explain {
				eprintln!(
					"Including '{}' as it is a required input for the affected output '{}'",
					ctx.graph.path(index),
					ctx.graph.path(out)
				);
			}
			affected[index] = true;
		}
		needs_all_inputs[index] = true;
	}
}

fn is_user_rule(ctx: &BuildContext<'_>, index: usize) -> bool {
	match ctx.node_to_command[index] {
		Some(command) => !is_built_in_rule(ctx.commands[command].rule_index),
		None => false,
	}
}
