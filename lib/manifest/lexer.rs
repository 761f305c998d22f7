//! The manifest lexer: a token stream with byte-exact position tracking.

use super::error::ParseError;
use super::eval::EvalString;
use crate::error::{ErrorWithLocation, Location};
use raw_string::RawStr;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::str::from_utf8_unchecked;

/// A token of the `build.ninja` grammar.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Token {
	Build,
	Colon,
	Default,
	Equals,
	Ident,
	Include,
	Indent,
	Newline,
	Pipe,
	Pipe2,
	PipeAt,
	Pool,
	Rule,
	Subninja,
	Eof,
}

impl Token {
	/// A human-readable name, used in error messages.
	pub fn name(self) -> &'static str {
		match self {
			Token::Build => "'build'",
			Token::Colon => "':'",
			Token::Default => "'default'",
			Token::Equals => "'='",
			Token::Ident => "identifier",
			Token::Include => "'include'",
			Token::Indent => "indent",
			Token::Newline => "newline",
			Token::Pipe => "'|'",
			Token::Pipe2 => "'||'",
			Token::PipeAt => "'|@'",
			Token::Pool => "'pool'",
			Token::Rule => "'rule'",
			Token::Subninja => "'subninja'",
			Token::Eof => "end of file",
		}
	}
}

/// Characters allowed in rule and variable names.
pub fn is_identifier_char(b: u8) -> bool {
	b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.'
}

// `$var` without braces is more restrictive than `${var}`: no dots.
fn is_simple_variable_char(b: u8) -> bool {
	b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

/// A lexer over one manifest file.
///
/// `position()` is the current byte offset into the source, which callers
/// use to snapshot the exact source text of a construct.
pub struct Lexer<'a> {
	filename: PathBuf,
	input: &'a RawStr,
	ofs: usize,
	last_token: usize,
}

impl<'a> Lexer<'a> {
	/// Create a lexer over `input`. The file name is only used in errors
	/// and to resolve `include`/`subninja` paths.
	pub fn new(filename: &Path, input: &'a RawStr) -> Self {
		Lexer {
			filename: filename.to_path_buf(),
			input,
			ofs: 0,
			last_token: 0,
		}
	}

	/// The current byte offset into the source.
	pub fn position(&self) -> usize {
		self.ofs
	}

	/// The full source this lexer reads from.
	pub fn source(&self) -> &'a RawStr {
		self.input
	}

	pub fn filename(&self) -> &Path {
		&self.filename
	}

	fn peek_byte(&self, at: usize) -> Option<u8> {
		self.input.as_bytes().get(at).copied()
	}

	/// Read the next token.
	///
	/// Comment lines are skipped here, so they end up inside the span of
	/// the construct that follows them.
	pub fn read_token(&mut self) -> Result<Token, ErrorWithLocation<ParseError>> {
		loop {
			self.last_token = self.ofs;
			let bytes = &self.input.as_bytes()[self.ofs..];
			let spaces = bytes.iter().position(|&b| b != b' ').unwrap_or(bytes.len());
			let pos = self.ofs + spaces;
			let token = match self.peek_byte(pos) {
				None => {
					self.ofs = pos;
					return Ok(Token::Eof);
				}
				Some(b'\n') => {
					self.ofs = pos + 1;
					return Ok(Token::Newline);
				}
				Some(b'\r') if self.peek_byte(pos + 1) == Some(b'\n') => {
					self.ofs = pos + 2;
					return Ok(Token::Newline);
				}
				Some(b'#') => {
					self.ofs = match memchr::memchr(b'\n', &self.input.as_bytes()[pos..]) {
						Some(n) => pos + n + 1,
						None => self.input.len(),
					};
					continue;
				}
				Some(_) if spaces > 0 => {
					self.ofs = pos;
					Token::Indent
				}
				Some(b':') => {
					self.ofs = pos + 1;
					Token::Colon
				}
				Some(b'=') => {
					self.ofs = pos + 1;
					Token::Equals
				}
				Some(b'|') => match self.peek_byte(pos + 1) {
					Some(b'@') => {
						self.ofs = pos + 2;
						Token::PipeAt
					}
					Some(b'|') => {
						self.ofs = pos + 2;
						Token::Pipe2
					}
					_ => {
						self.ofs = pos + 1;
						Token::Pipe
					}
				},
				Some(b) if is_identifier_char(b) => {
					let rest = &self.input.as_bytes()[pos..];
					let len = rest
						.iter()
						.position(|&b| !is_identifier_char(b))
						.unwrap_or(rest.len());
					self.ofs = pos + len;
					// Identifier characters are all ASCII.
					match unsafe { from_utf8_unchecked(&rest[..len]) } {
						"build" => Token::Build,
						"rule" => Token::Rule,
						"pool" => Token::Pool,
						"default" => Token::Default,
						"include" => Token::Include,
						"subninja" => Token::Subninja,
						_ => Token::Ident,
					}
				}
				Some(b) => return Err(self.error(ParseError::UnexpectedCharacter(b as char))),
			};
			self.eat_whitespace();
			return Ok(token);
		}
	}

	/// Rewind to the start of the last read token. One token of backup.
	pub fn unread_token(&mut self) {
		self.ofs = self.last_token;
	}

	/// If the next token is `token`, consume it and return true.
	pub fn peek_token(&mut self, token: Token) -> Result<bool, ErrorWithLocation<ParseError>> {
		if self.read_token()? == token {
			Ok(true)
		} else {
			self.unread_token();
			Ok(false)
		}
	}

	// Spaces and escaped newlines, but not newlines themselves.
	fn eat_whitespace(&mut self) {
		loop {
			match self.peek_byte(self.ofs) {
				Some(b' ') => self.ofs += 1,
				Some(b'$') => match (self.peek_byte(self.ofs + 1), self.peek_byte(self.ofs + 2)) {
					(Some(b'\n'), _) => self.ofs += 2,
					(Some(b'\r'), Some(b'\n')) => self.ofs += 3,
					_ => return,
				},
				_ => return,
			}
		}
	}

	/// Read a rule or variable name. Returns `None` if there is none here.
	pub fn read_ident(&mut self) -> Option<&'a str> {
		self.last_token = self.ofs;
		let bytes = &self.input.as_bytes()[self.ofs..];
		let len = bytes
			.iter()
			.position(|&b| !is_identifier_char(b))
			.unwrap_or(bytes.len());
		if len == 0 {
			return None;
		}
		let ident = &self.input[self.ofs..self.ofs + len];
		self.ofs += len;
		self.eat_whitespace();
		// Identifier characters are all ASCII.
		Some(unsafe { from_utf8_unchecked(ident.as_bytes()) })
	}

	/// Read a path (complete with `$`-escapes) into `out`.
	///
	/// Stops at an unescaped space, `:`, `|` or newline without consuming
	/// it; trailing spaces are eaten. An empty result means the path list
	/// ended.
	pub fn read_path(&mut self, out: &mut EvalString) -> Result<(), ErrorWithLocation<ParseError>> {
		self.read_eval_string(out, true)
	}

	/// Read the value side of a `var = value` line into `out`, up to and
	/// including the newline.
	pub fn read_var_value(
		&mut self,
		out: &mut EvalString,
	) -> Result<(), ErrorWithLocation<ParseError>> {
		self.read_eval_string(out, false)
	}

	fn read_eval_string(
		&mut self,
		out: &mut EvalString,
		path: bool,
	) -> Result<(), ErrorWithLocation<ParseError>> {
		self.last_token = self.ofs;
		loop {
			let bytes = self.input.as_bytes();
			let run = bytes[self.ofs..]
				.iter()
				.position(|&b| match b {
					b'$' | b'\n' | b'\r' => true,
					b' ' | b':' | b'|' => path,
					_ => false,
				})
				.unwrap_or(bytes.len() - self.ofs);
			if run > 0 {
				out.append_text(&self.input[self.ofs..self.ofs + run]);
				self.ofs += run;
			}
			match self.peek_byte(self.ofs) {
				Some(b'$') => self.read_escape(out)?,
				Some(b'\n') => {
					if !path {
						self.ofs += 1;
					}
					break;
				}
				Some(b'\r') => {
					if self.peek_byte(self.ofs + 1) == Some(b'\n') {
						if !path {
							self.ofs += 2;
						}
						break;
					}
					return Err(self.error(ParseError::UnexpectedCharacter('\r')));
				}
				_ => break,
			}
		}
		if path {
			self.eat_whitespace();
		}
		Ok(())
	}

	// `self.ofs` points at the `$`.
	fn read_escape(&mut self, out: &mut EvalString) -> Result<(), ErrorWithLocation<ParseError>> {
		match self.peek_byte(self.ofs + 1) {
			Some(b'$') => {
				out.append_text(RawStr::from_str("$"));
				self.ofs += 2;
			}
			Some(b' ') => {
				out.append_text(RawStr::from_str(" "));
				self.ofs += 2;
			}
			Some(b':') => {
				out.append_text(RawStr::from_str(":"));
				self.ofs += 2;
			}
			Some(b'\n') => {
				self.ofs += 2;
				self.skip_continuation_indent();
			}
			Some(b'\r') if self.peek_byte(self.ofs + 2) == Some(b'\n') => {
				self.ofs += 3;
				self.skip_continuation_indent();
			}
			Some(b'{') => {
				let start = self.ofs + 2;
				let bytes = &self.input.as_bytes()[start..];
				let len = bytes
					.iter()
					.position(|&b| !is_identifier_char(b))
					.unwrap_or(bytes.len());
				if len == 0 || self.peek_byte(start + len) != Some(b'}') {
					return Err(self.error(ParseError::InvalidEscape));
				}
				let name = &self.input[start..start + len];
				out.append_variable(unsafe { from_utf8_unchecked(name.as_bytes()) });
				self.ofs = start + len + 1;
			}
			Some(b) if is_simple_variable_char(b) => {
				let start = self.ofs + 1;
				let bytes = &self.input.as_bytes()[start..];
				let len = bytes
					.iter()
					.position(|&b| !is_simple_variable_char(b))
					.unwrap_or(bytes.len());
				let name = &self.input[start..start + len];
				out.append_variable(unsafe { from_utf8_unchecked(name.as_bytes()) });
				self.ofs = start + len;
			}
			_ => return Err(self.error(ParseError::InvalidEscape)),
		}
		Ok(())
	}

	// The indentation after an escaped newline is not part of the value.
	fn skip_continuation_indent(&mut self) {
		let bytes = &self.input.as_bytes()[self.ofs..];
		let n = bytes.iter().position(|&b| b != b' ').unwrap_or(bytes.len());
		self.ofs += n;
	}

	/// The location of the last read token, for error reporting.
	pub fn location(&self) -> Location {
		let bytes = &self.input.as_bytes()[..self.last_token];
		let line = bytes.iter().filter(|&&b| b == b'\n').count() as u32 + 1;
		let line_start = bytes
			.iter()
			.rposition(|&b| b == b'\n')
			.map_or(0, |n| n + 1);
		let column = (self.last_token - line_start) as u32 + 1;
		Location {
			file: Some(&self.filename),
			line: NonZeroU32::new(line),
			column: NonZeroU32::new(column),
		}
	}

	/// Wrap an error with the current location and the offending line.
	pub fn error<E>(&self, error: E) -> ErrorWithLocation<E> {
		let bytes = self.input.as_bytes();
		let line_start = bytes[..self.last_token]
			.iter()
			.rposition(|&b| b == b'\n')
			.map_or(0, |n| n + 1);
		let line_end =
			memchr::memchr(b'\n', &bytes[line_start..]).map_or(bytes.len(), |n| line_start + n);
		let snippet = String::from_utf8_lossy(&bytes[line_start..line_end]).into_owned();
		self.location().error(error).with_snippet(snippet)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::manifest::EvalPart;
	use raw_string::RawString;

	fn lexer(source: &str) -> Lexer {
		Lexer::new(Path::new("test.ninja"), RawStr::from_str(source))
	}

	fn path(lexer: &mut Lexer) -> RawString {
		let mut out = EvalString::new();
		lexer.read_path(&mut out).unwrap();
		let mut text = RawString::new();
		for part in out.parts() {
			match part {
				EvalPart::Text(t) => text.push_str(t),
				EvalPart::Variable(n) => {
					text.push(b'$');
					text.push_str(n.as_str());
				}
			}
		}
		text
	}

	#[test]
	fn tokens_of_a_build_line() {
		let mut l = lexer("build a.o | a.d: cc a.c || extra\n");
		assert_eq!(l.read_token().unwrap(), Token::Build);
		assert_eq!(path(&mut l), "a.o");
		assert_eq!(path(&mut l), "");
		assert_eq!(l.read_token().unwrap(), Token::Pipe);
		assert_eq!(path(&mut l), "a.d");
		assert_eq!(path(&mut l), "");
		assert_eq!(l.read_token().unwrap(), Token::Colon);
		assert_eq!(l.read_ident(), Some("cc"));
		assert_eq!(path(&mut l), "a.c");
		assert_eq!(path(&mut l), "");
		assert_eq!(l.read_token().unwrap(), Token::Pipe2);
		assert_eq!(path(&mut l), "extra");
		assert_eq!(l.read_token().unwrap(), Token::Newline);
		assert_eq!(l.read_token().unwrap(), Token::Eof);
	}

	#[test]
	fn keywords_need_a_full_match() {
		let mut l = lexer("buildings = 1\n");
		assert_eq!(l.read_token().unwrap(), Token::Ident);
		assert_eq!(l.read_token().unwrap(), Token::Equals);
	}

	#[test]
	fn pipe_at_token() {
		let mut l = lexer("|@ |");
		assert_eq!(l.read_token().unwrap(), Token::PipeAt);
		assert_eq!(l.read_token().unwrap(), Token::Pipe);
	}

	#[test]
	fn indent_and_newline() {
		let mut l = lexer("a = 1\n  b = 2\n\nc = 3");
		assert_eq!(l.read_token().unwrap(), Token::Ident);
		assert_eq!(l.read_token().unwrap(), Token::Equals);
		let mut value = EvalString::new();
		l.read_var_value(&mut value).unwrap();
		assert_eq!(l.read_token().unwrap(), Token::Indent);
		assert_eq!(l.read_ident(), Some("b"));
		assert_eq!(l.read_token().unwrap(), Token::Equals);
		value.clear();
		l.read_var_value(&mut value).unwrap();
		assert_eq!(l.read_token().unwrap(), Token::Newline);
		assert_eq!(l.read_token().unwrap(), Token::Ident);
	}

	#[test]
	fn peek_and_unread() {
		let mut l = lexer("build x: phony\n");
		assert!(!l.peek_token(Token::Pool).unwrap());
		assert_eq!(l.read_token().unwrap(), Token::Build);
		let before = l.position();
		assert!(!l.peek_token(Token::Colon).unwrap());
		assert_eq!(l.position(), before);
	}

	#[test]
	fn comments_are_skipped() {
		let mut l = lexer("# header\n  # indented comment\nrule cc\n");
		assert_eq!(l.read_token().unwrap(), Token::Rule);
		assert_eq!(l.read_ident(), Some("cc"));
	}

	#[test]
	fn escapes_in_paths() {
		let mut l = lexer("a$ b$:c$$d x");
		assert_eq!(path(&mut l), "a b:c$d");
		assert_eq!(path(&mut l), "x");
	}

	#[test]
	fn variable_references() {
		let mut l = lexer("${dir}/x$suffix.o:");
		let mut out = EvalString::new();
		l.read_path(&mut out).unwrap();
		assert_eq!(
			out.parts(),
			&[
				EvalPart::Variable("dir".to_string()),
				EvalPart::Text(RawString::from("/x")),
				EvalPart::Variable("suffix".to_string()),
				EvalPart::Text(RawString::from(".o")),
			]
		);
		assert_eq!(l.read_token().unwrap(), Token::Colon);
	}

	#[test]
	fn dots_only_in_braced_variables() {
		let mut l = lexer("$a.b ${a.b}");
		let mut out = EvalString::new();
		l.read_path(&mut out).unwrap();
		assert_eq!(
			out.parts(),
			&[
				EvalPart::Variable("a".to_string()),
				EvalPart::Text(RawString::from(".b")),
			]
		);
		out.clear();
		l.read_path(&mut out).unwrap();
		assert_eq!(out.parts(), &[EvalPart::Variable("a.b".to_string())]);
	}

	#[test]
	fn escaped_newline_continues_value() {
		let mut l = lexer("x = a$\n    b\n");
		assert_eq!(l.read_token().unwrap(), Token::Ident);
		assert_eq!(l.read_token().unwrap(), Token::Equals);
		let mut out = EvalString::new();
		l.read_var_value(&mut out).unwrap();
		assert_eq!(out.parts(), &[EvalPart::Text(RawString::from("ab"))]);
		assert_eq!(l.read_token().unwrap(), Token::Eof);
	}

	#[test]
	fn value_keeps_colons_and_pipes() {
		let mut l = lexer("cmd = a:b | c\n");
		assert_eq!(l.read_token().unwrap(), Token::Ident);
		assert_eq!(l.read_token().unwrap(), Token::Equals);
		let mut out = EvalString::new();
		l.read_var_value(&mut out).unwrap();
		assert_eq!(out.parts(), &[EvalPart::Text(RawString::from("a:b | c"))]);
	}

	#[test]
	fn invalid_escape_has_location() {
		let mut l = lexer("x = 1\ny = $!\n");
		for _ in 0..2 {
			assert_eq!(l.read_token().unwrap(), Token::Ident);
			assert_eq!(l.read_token().unwrap(), Token::Equals);
			let mut out = EvalString::new();
			match l.read_var_value(&mut out) {
				Ok(()) => {}
				Err(e) => {
					assert_eq!(e.error, ParseError::InvalidEscape);
					assert_eq!(e.line.map(|l| l.get()), Some(2));
					assert_eq!(e.snippet.as_deref(), Some("y = $!"));
					return;
				}
			}
		}
		panic!("expected an invalid escape error");
	}

	#[test]
	fn position_tracks_bytes() {
		let source = "pool p\nbuild x: phony\n";
		let mut l = lexer(source);
		assert_eq!(l.position(), 0);
		assert_eq!(l.read_token().unwrap(), Token::Pool);
		assert_eq!(l.read_ident(), Some("p"));
		assert_eq!(l.read_token().unwrap(), Token::Newline);
		assert_eq!(l.position(), source.find("build").unwrap());
	}
}
