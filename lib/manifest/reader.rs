//! Pull-based reading of manifest constructs.
//!
//! [`ManifestReader::next`] yields one [`Record`] per top-level construct.
//! Each record is a thin reader over the shared lexer and a single
//! [`EvalString`] scratch buffer, so reading a whole manifest does not
//! allocate per record. The caller drives each record's methods in manifest
//! order and can snapshot the construct's exact source text through
//! `start()` and `bytes_parsed()`.

use super::error::ParseError;
use super::eval::EvalString;
use super::lexer::{Lexer, Token};
use crate::error::{ErrorWithLocation, Location};
use raw_string::RawStr;
use std::path::Path;

type ParseResult<T> = Result<T, ErrorWithLocation<ParseError>>;

/// A pull parser over one manifest file.
pub struct ManifestReader<'a> {
	lexer: Lexer<'a>,
	scratch: EvalString,
	construct_start: usize,
}

/// One top-level construct.
pub enum Record<'r, 'a> {
	Pool(PoolReader<'r, 'a>),
	Build(BuildReader<'r, 'a>),
	Rule(RuleReader<'r, 'a>),
	Default(DefaultReader<'r, 'a>),
	Variable(VariableReader<'r, 'a>),
	Include(IncludeReader<'r, 'a>),
	Subninja(SubninjaReader<'r, 'a>),
}

impl<'a> ManifestReader<'a> {
	/// Create a reader over `source`. The file name is used in errors and
	/// exposed through [`IncludeReader::parent`] for path resolution.
	pub fn new(filename: &Path, source: &'a RawStr) -> Self {
		ManifestReader {
			lexer: Lexer::new(filename, source),
			scratch: EvalString::new(),
			construct_start: 0,
		}
	}

	/// Read the next top-level construct, or `None` at the end of the file.
	///
	/// The returned record must be fully driven before calling `next`
	/// again. Blank lines before a construct count towards its span, so
	/// concatenating all spans (plus [`tail`][Self::tail]) reproduces the
	/// source exactly.
	pub fn next(&mut self) -> ParseResult<Option<Record<'_, 'a>>> {
		self.construct_start = self.lexer.position();
		loop {
			match self.lexer.read_token()? {
				Token::Newline => continue,
				Token::Eof => return Ok(None),
				Token::Pool => {
					let start = self.construct_start;
					return Ok(Some(Record::Pool(PoolReader { r: self, start })));
				}
				Token::Build => {
					let start = self.construct_start;
					return Ok(Some(Record::Build(BuildReader { r: self, start })));
				}
				Token::Rule => {
					let start = self.construct_start;
					return Ok(Some(Record::Rule(RuleReader { r: self, start })));
				}
				Token::Default => {
					let start = self.construct_start;
					return Ok(Some(Record::Default(DefaultReader { r: self, start })));
				}
				Token::Include => {
					let start = self.construct_start;
					return Ok(Some(Record::Include(IncludeReader { r: self, start })));
				}
				Token::Subninja => {
					let start = self.construct_start;
					return Ok(Some(Record::Subninja(SubninjaReader { r: self, start })));
				}
				Token::Ident => {
					self.lexer.unread_token();
					let start = self.construct_start;
					return Ok(Some(Record::Variable(VariableReader { r: self, start })));
				}
				token => {
					return Err(self.lexer.error(ParseError::UnexpectedToken(token.name())))
				}
			}
		}
	}

	/// The bytes after the last construct: trailing blank lines and
	/// comments. Only meaningful once [`next`][Self::next] returned `None`.
	pub fn tail(&self) -> &'a RawStr {
		&self.lexer.source()[self.construct_start..]
	}

	pub fn source(&self) -> &'a RawStr {
		self.lexer.source()
	}

	pub fn position(&self) -> usize {
		self.lexer.position()
	}

	pub fn location(&self) -> Location {
		self.lexer.location()
	}

	fn expect_token(&mut self, expected: Token) -> ParseResult<()> {
		let token = self.lexer.read_token()?;
		// A missing final newline ends the construct just as well.
		if token == expected || (expected == Token::Newline && token == Token::Eof) {
			Ok(())
		} else {
			Err(self.lexer.error(ParseError::ExpectedToken {
				expected: expected.name(),
				found: token.name(),
			}))
		}
	}
}

/// A lending iterator over a whitespace-separated path list.
///
/// Reads into the shared scratch buffer; each returned reference is only
/// valid until the next call.
pub struct PathListReader<'r, 'a> {
	r: Option<&'r mut ManifestReader<'a>>,
	terminator: Option<Token>,
}

impl<'r, 'a> PathListReader<'r, 'a> {
	/// The next path, or `None` at the end of the list.
	pub fn next(&mut self) -> ParseResult<Option<&EvalString>> {
		let done = match &mut self.r {
			Some(r) => {
				r.scratch.clear();
				r.lexer.read_path(&mut r.scratch)?;
				r.scratch.is_empty()
			}
			None => return Ok(None),
		};
		if done {
			if let Some(token) = self.terminator {
				if let Some(r) = self.r.as_mut() {
					r.expect_token(token)?;
				}
			}
			self.r = None;
			return Ok(None);
		}
		match &self.r {
			Some(r) => Ok(Some(&r.scratch)),
			None => Ok(None),
		}
	}
}

/// A lending iterator over an indented `var = value` block.
pub struct VariableListReader<'r, 'a> {
	r: &'r mut ManifestReader<'a>,
}

impl<'r, 'a> VariableListReader<'r, 'a> {
	/// The next variable line, or `None` at the end of the block.
	pub fn next(&mut self) -> ParseResult<Option<VariableReader<'_, 'a>>> {
		if self.r.lexer.peek_token(Token::Indent)? {
			let start = self.r.lexer.position();
			Ok(Some(VariableReader {
				r: &mut *self.r,
				start,
			}))
		} else {
			Ok(None)
		}
	}
}

/// A `name = value` line, either at file scope or indented under a
/// `pool`, `rule` or `build` construct.
pub struct VariableReader<'r, 'a> {
	r: &'r mut ManifestReader<'a>,
	start: usize,
}

impl<'r, 'a> VariableReader<'r, 'a> {
	pub fn start(&self) -> usize {
		self.start
	}

	pub fn position(&self) -> usize {
		self.r.lexer.position()
	}

	pub fn bytes_parsed(&self) -> usize {
		self.position() - self.start
	}

	pub fn error<E>(&self, error: E) -> ErrorWithLocation<E> {
		self.r.lexer.error(error)
	}

	pub fn name(&mut self) -> ParseResult<&'a str> {
		match self.r.lexer.read_ident() {
			Some(name) => Ok(name),
			None => Err(self.r.lexer.error(ParseError::MissingVariableName)),
		}
	}

	/// The (unexpanded) value. Must be called after [`name`][Self::name];
	/// consumes the line's newline.
	pub fn value(&mut self) -> ParseResult<&EvalString> {
		self.r.expect_token(Token::Equals)?;
		let r = &mut *self.r;
		r.scratch.clear();
		r.lexer.read_var_value(&mut r.scratch)?;
		Ok(&self.r.scratch)
	}
}

/// A `pool name` construct.
pub struct PoolReader<'r, 'a> {
	r: &'r mut ManifestReader<'a>,
	start: usize,
}

impl<'r, 'a> PoolReader<'r, 'a> {
	pub fn start(&self) -> usize {
		self.start
	}

	pub fn position(&self) -> usize {
		self.r.lexer.position()
	}

	pub fn bytes_parsed(&self) -> usize {
		self.position() - self.start
	}

	pub fn error<E>(&self, error: E) -> ErrorWithLocation<E> {
		self.r.lexer.error(error)
	}

	pub fn name(&mut self) -> ParseResult<&'a str> {
		let name = match self.r.lexer.read_ident() {
			Some(name) => name,
			None => return Err(self.r.lexer.error(ParseError::MissingPoolName)),
		};
		self.r.expect_token(Token::Newline)?;
		Ok(name)
	}

	pub fn variables(&mut self) -> VariableListReader<'_, 'a> {
		VariableListReader { r: &mut *self.r }
	}
}

/// A `rule name` construct.
pub struct RuleReader<'r, 'a> {
	r: &'r mut ManifestReader<'a>,
	start: usize,
}

impl<'r, 'a> RuleReader<'r, 'a> {
	pub fn start(&self) -> usize {
		self.start
	}

	pub fn position(&self) -> usize {
		self.r.lexer.position()
	}

	pub fn bytes_parsed(&self) -> usize {
		self.position() - self.start
	}

	pub fn error<E>(&self, error: E) -> ErrorWithLocation<E> {
		self.r.lexer.error(error)
	}

	pub fn name(&mut self) -> ParseResult<&'a str> {
		let name = match self.r.lexer.read_ident() {
			Some(name) => name,
			None => return Err(self.r.lexer.error(ParseError::MissingRuleName)),
		};
		self.r.expect_token(Token::Newline)?;
		Ok(name)
	}

	pub fn variables(&mut self) -> VariableListReader<'_, 'a> {
		VariableListReader { r: &mut *self.r }
	}
}

/// A `build outs: rule ins` construct.
///
/// The methods follow the manifest grammar and must be called in this
/// order: `outs`, `implicit_outs`, `rule_name`, `ins`, `implicit_ins`,
/// `order_only_deps`, `validations`, `variables`.
pub struct BuildReader<'r, 'a> {
	r: &'r mut ManifestReader<'a>,
	start: usize,
}

impl<'r, 'a> BuildReader<'r, 'a> {
	pub fn start(&self) -> usize {
		self.start
	}

	pub fn position(&self) -> usize {
		self.r.lexer.position()
	}

	pub fn bytes_parsed(&self) -> usize {
		self.position() - self.start
	}

	pub fn error<E>(&self, error: E) -> ErrorWithLocation<E> {
		self.r.lexer.error(error)
	}

	/// The explicit output paths.
	pub fn outs(&mut self) -> PathListReader<'_, 'a> {
		PathListReader {
			r: Some(&mut *self.r),
			terminator: None,
		}
	}

	/// The `| implicit` output paths. Empty when there is no `|`.
	pub fn implicit_outs(&mut self) -> ParseResult<PathListReader<'_, 'a>> {
		Ok(if self.r.lexer.peek_token(Token::Pipe)? {
			PathListReader {
				r: Some(&mut *self.r),
				terminator: None,
			}
		} else {
			PathListReader {
				r: None,
				terminator: None,
			}
		})
	}

	/// The rule name. Consumes the `:` separating outputs from the rule.
	pub fn rule_name(&mut self) -> ParseResult<&'a str> {
		self.r.expect_token(Token::Colon)?;
		match self.r.lexer.read_ident() {
			Some(name) => Ok(name),
			None => Err(self.r.lexer.error(ParseError::MissingBuildRuleName)),
		}
	}

	/// The explicit input paths.
	pub fn ins(&mut self) -> PathListReader<'_, 'a> {
		PathListReader {
			r: Some(&mut *self.r),
			terminator: None,
		}
	}

	/// The `| implicit` input paths.
	pub fn implicit_ins(&mut self) -> ParseResult<PathListReader<'_, 'a>> {
		Ok(if self.r.lexer.peek_token(Token::Pipe)? {
			PathListReader {
				r: Some(&mut *self.r),
				terminator: None,
			}
		} else {
			PathListReader {
				r: None,
				terminator: None,
			}
		})
	}

	/// The `|| order-only` dependency paths.
	pub fn order_only_deps(&mut self) -> ParseResult<PathListReader<'_, 'a>> {
		Ok(if self.r.lexer.peek_token(Token::Pipe2)? {
			PathListReader {
				r: Some(&mut *self.r),
				terminator: None,
			}
		} else {
			PathListReader {
				r: None,
				terminator: None,
			}
		})
	}

	/// The `|@ validation` paths.
	pub fn validations(&mut self) -> ParseResult<PathListReader<'_, 'a>> {
		Ok(if self.r.lexer.peek_token(Token::PipeAt)? {
			PathListReader {
				r: Some(&mut *self.r),
				terminator: None,
			}
		} else {
			PathListReader {
				r: None,
				terminator: None,
			}
		})
	}

	/// The indented variable block. Consumes the newline that ends the
	/// header line.
	pub fn variables(&mut self) -> ParseResult<VariableListReader<'_, 'a>> {
		self.r.expect_token(Token::Newline)?;
		Ok(VariableListReader { r: &mut *self.r })
	}
}

/// A `default paths` construct.
pub struct DefaultReader<'r, 'a> {
	r: &'r mut ManifestReader<'a>,
	start: usize,
}

impl<'r, 'a> DefaultReader<'r, 'a> {
	pub fn start(&self) -> usize {
		self.start
	}

	pub fn position(&self) -> usize {
		self.r.lexer.position()
	}

	pub fn bytes_parsed(&self) -> usize {
		self.position() - self.start
	}

	pub fn error<E>(&self, error: E) -> ErrorWithLocation<E> {
		self.r.lexer.error(error)
	}

	/// The target paths, up to and including the newline.
	pub fn paths(&mut self) -> PathListReader<'_, 'a> {
		PathListReader {
			r: Some(&mut *self.r),
			terminator: Some(Token::Newline),
		}
	}
}

/// An `include path` construct.
pub struct IncludeReader<'r, 'a> {
	r: &'r mut ManifestReader<'a>,
	start: usize,
}

impl<'r, 'a> IncludeReader<'r, 'a> {
	pub fn start(&self) -> usize {
		self.start
	}

	pub fn position(&self) -> usize {
		self.r.lexer.position()
	}

	pub fn bytes_parsed(&self) -> usize {
		self.position() - self.start
	}

	pub fn error<E>(&self, error: E) -> ErrorWithLocation<E> {
		self.r.lexer.error(error)
	}

	/// The included path, up to and including the newline.
	pub fn path(&mut self) -> ParseResult<&EvalString> {
		{
			let r = &mut *self.r;
			r.scratch.clear();
			r.lexer.read_path(&mut r.scratch)?;
		}
		self.r.expect_token(Token::Newline)?;
		Ok(&self.r.scratch)
	}

	/// The file this `include` appeared in. Callable before or after
	/// [`path`][Self::path].
	pub fn parent(&self) -> &Path {
		self.r.lexer.filename()
	}
}

/// A `subninja path` construct.
pub struct SubninjaReader<'r, 'a> {
	r: &'r mut ManifestReader<'a>,
	start: usize,
}

impl<'r, 'a> SubninjaReader<'r, 'a> {
	pub fn start(&self) -> usize {
		self.start
	}

	pub fn position(&self) -> usize {
		self.r.lexer.position()
	}

	pub fn bytes_parsed(&self) -> usize {
		self.position() - self.start
	}

	pub fn error<E>(&self, error: E) -> ErrorWithLocation<E> {
		self.r.lexer.error(error)
	}

	/// The subninja'd path, up to and including the newline.
	pub fn path(&mut self) -> ParseResult<&EvalString> {
		{
			let r = &mut *self.r;
			r.scratch.clear();
			r.lexer.read_path(&mut r.scratch)?;
		}
		self.r.expect_token(Token::Newline)?;
		Ok(&self.r.scratch)
	}

	/// The file this `subninja` appeared in.
	pub fn parent(&self) -> &Path {
		self.r.lexer.filename()
	}
}
