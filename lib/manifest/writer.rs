//! Emitting manifest constructs with correct syntax.
//!
//! The build-edge writer is a chain of single-use writers whose type
//! progression enforces the section order of a `build` line: outputs,
//! implicit outputs, rule name, inputs, implicit inputs, order-only
//! dependencies, validations, variables. A section written from an empty
//! iterator emits nothing, so unused sections are simply passed through.

use super::eval::EvalString;
use std::io::{Result, Write};

fn write_section<'i, W, I>(out: &mut W, lead: &str, paths: I) -> Result<()>
where
	W: Write,
	I: IntoIterator<Item = &'i EvalString>,
{
	let mut separator = lead;
	for path in paths {
		write!(out, "{}{}", separator, path)?;
		separator = " ";
	}
	Ok(())
}

/// Writes top-level manifest constructs to a stream.
pub struct ManifestWriter<'w, W: Write> {
	out: &'w mut W,
}

impl<'w, W: Write> ManifestWriter<'w, W> {
	pub fn new(out: &'w mut W) -> Self {
		ManifestWriter { out }
	}

	/// Write a file-scope `name = value` line.
	pub fn variable(&mut self, name: &str, value: &EvalString) -> Result<()> {
		writeln!(self.out, "{} = {}", name, value)
	}

	/// Start a `pool` block; its variables follow indented.
	pub fn pool(&mut self, name: &str) -> Result<ScopedVariableWriter<'_, W>> {
		writeln!(self.out, "pool {}", name)?;
		Ok(ScopedVariableWriter { out: &mut *self.out })
	}

	/// Start a `rule` block; its variables follow indented.
	pub fn rule(&mut self, name: &str) -> Result<ScopedVariableWriter<'_, W>> {
		writeln!(self.out, "rule {}", name)?;
		Ok(ScopedVariableWriter { out: &mut *self.out })
	}

	/// Start a `build` edge; continue with [`BuildOutsWriter::outs`].
	pub fn build(&mut self) -> BuildOutsWriter<'_, W> {
		BuildOutsWriter { out: &mut *self.out }
	}

	/// Write a `default` line.
	pub fn defaults<'i, I>(&mut self, paths: I) -> Result<()>
	where
		I: IntoIterator<Item = &'i EvalString>,
	{
		write!(self.out, "default")?;
		write_section(&mut *self.out, " ", paths)?;
		writeln!(self.out)
	}

	pub fn include(&mut self, path: &EvalString) -> Result<()> {
		writeln!(self.out, "include {}", path)
	}

	pub fn subninja(&mut self, path: &EvalString) -> Result<()> {
		writeln!(self.out, "subninja {}", path)
	}
}

/// Writes the indented variables of a `pool`, `rule` or `build` block.
pub struct ScopedVariableWriter<'w, W: Write> {
	out: &'w mut W,
}

impl<'w, W: Write> ScopedVariableWriter<'w, W> {
	pub fn variable(&mut self, name: &str, value: &EvalString) -> Result<()> {
		writeln!(self.out, "  {} = {}", name, value)
	}
}

/// Writes the explicit outputs of a `build` line.
pub struct BuildOutsWriter<'w, W: Write> {
	out: &'w mut W,
}

impl<'w, W: Write> BuildOutsWriter<'w, W> {
	pub fn outs<'i, I>(self, paths: I) -> Result<BuildImplicitOutsWriter<'w, W>>
	where
		I: IntoIterator<Item = &'i EvalString>,
	{
		write!(self.out, "build")?;
		write_section(&mut *self.out, " ", paths)?;
		Ok(BuildImplicitOutsWriter { out: self.out })
	}
}

/// Writes the `| implicit` outputs of a `build` line.
pub struct BuildImplicitOutsWriter<'w, W: Write> {
	out: &'w mut W,
}

impl<'w, W: Write> BuildImplicitOutsWriter<'w, W> {
	pub fn implicit_outs<'i, I>(self, paths: I) -> Result<BuildRuleWriter<'w, W>>
	where
		I: IntoIterator<Item = &'i EvalString>,
	{
		write_section(&mut *self.out, " | ", paths)?;
		Ok(BuildRuleWriter { out: self.out })
	}
}

/// Writes the rule name of a `build` line.
pub struct BuildRuleWriter<'w, W: Write> {
	out: &'w mut W,
}

impl<'w, W: Write> BuildRuleWriter<'w, W> {
	pub fn rule(self, name: &str) -> Result<BuildInsWriter<'w, W>> {
		write!(self.out, ": {}", name)?;
		Ok(BuildInsWriter { out: self.out })
	}
}

/// Writes the explicit inputs of a `build` line.
pub struct BuildInsWriter<'w, W: Write> {
	out: &'w mut W,
}

impl<'w, W: Write> BuildInsWriter<'w, W> {
	pub fn ins<'i, I>(self, paths: I) -> Result<BuildImplicitInsWriter<'w, W>>
	where
		I: IntoIterator<Item = &'i EvalString>,
	{
		write_section(&mut *self.out, " ", paths)?;
		Ok(BuildImplicitInsWriter { out: self.out })
	}
}

/// Writes the `| implicit` inputs of a `build` line.
pub struct BuildImplicitInsWriter<'w, W: Write> {
	out: &'w mut W,
}

impl<'w, W: Write> BuildImplicitInsWriter<'w, W> {
	pub fn implicit_ins<'i, I>(self, paths: I) -> Result<BuildOrderOnlyDepsWriter<'w, W>>
	where
		I: IntoIterator<Item = &'i EvalString>,
	{
		write_section(&mut *self.out, " | ", paths)?;
		Ok(BuildOrderOnlyDepsWriter { out: self.out })
	}
}

/// Writes the `|| order-only` dependencies of a `build` line.
pub struct BuildOrderOnlyDepsWriter<'w, W: Write> {
	out: &'w mut W,
}

impl<'w, W: Write> BuildOrderOnlyDepsWriter<'w, W> {
	pub fn order_only_deps<'i, I>(self, paths: I) -> Result<BuildValidationsWriter<'w, W>>
	where
		I: IntoIterator<Item = &'i EvalString>,
	{
		write_section(&mut *self.out, " || ", paths)?;
		Ok(BuildValidationsWriter { out: self.out })
	}
}

/// Writes the `|@ validations` of a `build` line and finishes the header.
pub struct BuildValidationsWriter<'w, W: Write> {
	out: &'w mut W,
}

impl<'w, W: Write> BuildValidationsWriter<'w, W> {
	/// Write the validations and the newline ending the header; edge
	/// variables may follow on the returned writer.
	pub fn validations<'i, I>(self, paths: I) -> Result<ScopedVariableWriter<'w, W>>
	where
		I: IntoIterator<Item = &'i EvalString>,
	{
		write_section(&mut *self.out, " |@ ", paths)?;
		writeln!(self.out)?;
		Ok(ScopedVariableWriter { out: self.out })
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::manifest::reader::{ManifestReader, Record};
	use raw_string::RawStr;
	use std::path::Path;

	fn text(s: &str) -> EvalString {
		let mut e = EvalString::new();
		e.append_text(RawStr::from_str(s));
		e
	}

	#[test]
	fn writes_a_full_edge() {
		let mut out = Vec::new();
		{
			let mut writer = ManifestWriter::new(&mut out);
			let mut variables = writer
				.build()
				.outs(&[text("a.o")])
				.unwrap()
				.implicit_outs(&[text("a.d")])
				.unwrap()
				.rule("cc")
				.unwrap()
				.ins(&[text("a.c")])
				.unwrap()
				.implicit_ins(&[text("a.h"), text("b.h")])
				.unwrap()
				.order_only_deps(&[text("gen")])
				.unwrap()
				.validations(&[text("lint")])
				.unwrap();
			variables.variable("cflags", &text("-O2")).unwrap();
		}
		assert_eq!(
			String::from_utf8(out).unwrap(),
			"build a.o | a.d: cc a.c | a.h b.h || gen |@ lint\n  cflags = -O2\n"
		);
	}

	#[test]
	fn empty_sections_are_omitted() {
		let mut out = Vec::new();
		{
			let mut writer = ManifestWriter::new(&mut out);
			writer
				.build()
				.outs(&[text("x")])
				.unwrap()
				.implicit_outs(&[])
				.unwrap()
				.rule("phony")
				.unwrap()
				.ins(&[])
				.unwrap()
				.implicit_ins(&[])
				.unwrap()
				.order_only_deps(&[])
				.unwrap()
				.validations(&[])
				.unwrap();
		}
		assert_eq!(String::from_utf8(out).unwrap(), "build x: phony\n");
	}

	#[test]
	fn writes_rules_pools_and_statements() {
		let mut out = Vec::new();
		{
			let mut writer = ManifestWriter::new(&mut out);
			writer.variable("cflags", &text("-O2")).unwrap();
			writer
				.pool("link_pool")
				.unwrap()
				.variable("depth", &text("4"))
				.unwrap();
			let mut rule = writer.rule("cc").unwrap();
			rule.variable("command", &text("gcc -c ")).unwrap();
			writer.defaults(&[text("a.o"), text("b.o")]).unwrap();
			writer.include(&text("extra.ninja")).unwrap();
			writer.subninja(&text("sub/build.ninja")).unwrap();
		}
		assert_eq!(
			String::from_utf8(out).unwrap(),
			"cflags = -O2\n\
			 pool link_pool\n  depth = 4\n\
			 rule cc\n  command = gcc -c$ \n\
			 default a.o b.o\n\
			 include extra.ninja\n\
			 subninja sub/build.ninja\n"
		);
	}

	#[test]
	fn escaped_output_parses_back() {
		let mut out = Vec::new();
		{
			let mut writer = ManifestWriter::new(&mut out);
			let mut path = text("dir with space/");
			path.append_variable("name");
			writer
				.build()
				.outs(&[path])
				.unwrap()
				.implicit_outs(&[])
				.unwrap()
				.rule("touch")
				.unwrap()
				.ins(&[])
				.unwrap()
				.implicit_ins(&[])
				.unwrap()
				.order_only_deps(&[])
				.unwrap()
				.validations(&[])
				.unwrap();
		}
		let written = String::from_utf8(out).unwrap();
		assert_eq!(written, "build dir$ with$ space/${name}: touch\n");

		let source = RawStr::from_str(&written);
		let mut reader = ManifestReader::new(Path::new("written.ninja"), source);
		let mut build = match reader.next().unwrap() {
			Some(Record::Build(build)) => build,
			_ => panic!("expected a build record"),
		};
		let mut outs = build.outs();
		let first = outs.next().unwrap().expect("one output").clone();
		assert_eq!(first.parts().len(), 2);
		assert!(outs.next().unwrap().is_none());
		assert_eq!(build.rule_name().unwrap(), "touch");
	}
}
