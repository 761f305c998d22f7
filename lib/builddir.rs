//! Locating the build directory without building a full context.

use crate::error::{ErrorWithLocation, Location};
use crate::manifest::read_bytes;
use crate::manifest::reader::{ManifestReader, PathListReader, Record, VariableListReader};
use crate::manifest::scope::BasicScope;
use crate::manifest::{evaluate, ReadError, Scope};
use raw_string::{RawStr, RawString};
use std::path::{Path, PathBuf};

/// Evaluate the file-scope `builddir` variable of a manifest and resolve
/// it against the manifest's own directory.
///
/// Follows `include`s. A `subninja` introduces its own scope and can never
/// change the top-level `builddir`, so the child file is not even opened.
pub fn build_dir(
	ninja_file: &Path,
	contents: &RawStr,
) -> Result<PathBuf, ErrorWithLocation<ReadError>> {
	let mut scope = BasicScope::new();
	collect_file_scope(ninja_file, contents, &mut scope)?;
	let mut builddir = RawString::new();
	scope.append_value(&mut builddir, "builddir");
	let dir = ninja_file.parent().unwrap_or_else(|| Path::new(""));
	match builddir.to_path() {
		Ok(path) => Ok(dir.join(path)),
		Err(e) => Err(Location::UNKNOWN.error(ReadError::from(e))),
	}
}

fn collect_file_scope(
	filename: &Path,
	source: &RawStr,
	scope: &mut BasicScope,
) -> Result<(), ErrorWithLocation<ReadError>> {
	let mut reader = ManifestReader::new(filename, source);
	while let Some(record) = reader.next()? {
		match record {
			Record::Variable(mut var) => {
				let name = var.name()?;
				let mut value = RawString::new();
				evaluate(&mut value, var.value()?, &*scope);
				scope.set(name, value);
			}
			Record::Include(mut include) => {
				let mut path = RawString::new();
				evaluate(&mut path, include.path()?, &*scope);
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
				collect_file_scope(&file, RawStr::from_bytes(&contents), scope)?;
			}
			Record::Subninja(mut subninja) => {
				subninja.path()?;
			}
			Record::Pool(mut pool) => {
				pool.name()?;
				consume_variables(pool.variables())?;
			}
			Record::Rule(mut rule) => {
				rule.name()?;
				consume_variables(rule.variables())?;
			}
			Record::Default(mut default) => {
				consume_paths(default.paths())?;
			}
			Record::Build(mut build) => {
				consume_paths(build.outs())?;
				consume_paths(build.implicit_outs()?)?;
				build.rule_name()?;
				consume_paths(build.ins())?;
				consume_paths(build.implicit_ins()?)?;
				consume_paths(build.order_only_deps()?)?;
				consume_paths(build.validations()?)?;
				consume_variables(build.variables()?)?;
			}
		}
	}
	Ok(())
}

fn consume_paths(mut paths: PathListReader<'_, '_>) -> Result<(), ErrorWithLocation<ReadError>> {
	while paths.next()?.is_some() {}
	Ok(())
}

fn consume_variables(
	mut vars: VariableListReader<'_, '_>,
) -> Result<(), ErrorWithLocation<ReadError>> {
	while let Some(mut var) = vars.next()? {
		var.name()?;
		var.value()?;
	}
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn defaults_to_the_manifest_directory() {
		let dir = build_dir(
			Path::new("some/dir/build.ninja"),
			RawStr::from_str("rule cc\n  command = cc\n"),
		)
		.unwrap();
		assert_eq!(dir, Path::new("some/dir"));
	}

	#[test]
	fn expands_variables_in_builddir() {
		let source = "\
prefix = out
builddir = $prefix/debug
rule cc
  command = cc
build a.o: cc a.c
";
		let dir = build_dir(Path::new("proj/build.ninja"), RawStr::from_str(source)).unwrap();
		assert_eq!(dir, Path::new("proj/out/debug"));
	}

	#[test]
	fn later_definitions_win() {
		let source = "builddir = one\nbuilddir = two\n";
		let dir = build_dir(Path::new("build.ninja"), RawStr::from_str(source)).unwrap();
		assert_eq!(dir, Path::new("two"));
	}
}
