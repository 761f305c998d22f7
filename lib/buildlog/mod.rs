//! Reading and writing build logs (i.e. `.ninja_log` files).
//!
//! The v5 format is one tab-separated line per executed command:
//! start and end times in milliseconds, the output's mtime on the on-disk
//! clock, the output path, and the command hash in lowercase hex.

use crate::clock::Timestamp;
use raw_string::{RawStr, RawString};
use std::error;
use std::fmt;
use std::io::{BufRead, Write};

mod murmur;

pub use self::murmur::murmur_hash_64a;

/// An entry in the build log for one output path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
	pub start_time_ms: i32,
	pub end_time_ms: i32,
	pub mtime: Option<Timestamp>,
	pub output: RawString,
	pub command_hash: u64,
}

/// An error while reading a `.ninja_log` file.
#[derive(Debug)]
pub enum LogError {
	/// The signature line is not `# ninja log v<version>`.
	BadSignature,
	/// A version other than 5.
	UnsupportedVersion(u32),
	Io(std::io::Error),
}

impl fmt::Display for LogError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			LogError::BadSignature => write!(f, "Not a ninja log file"),
			LogError::UnsupportedVersion(version) => write!(
				f,
				"Only version 5 of the ninja log is supported, but version {} was found",
				version
			),
			LogError::Io(e) => write!(f, "{}", e),
		}
	}
}

impl error::Error for LogError {
	fn source(&self) -> Option<&(dyn error::Error + 'static)> {
		match self {
			LogError::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<std::io::Error> for LogError {
	fn from(src: std::io::Error) -> LogError {
		LogError::Io(src)
	}
}

/// The hash ninja records for an edge: the evaluated command, with the
/// rspfile contents mixed in when there are any.
pub fn hash_command(command: &RawStr, rspfile_content: &RawStr) -> u64 {
	if rspfile_content.is_empty() {
		murmur_hash_64a(command.as_bytes())
	} else {
		let mut data = RawString::from(command);
		data.push_str(";rspfile=");
		data.push_str(rspfile_content);
		murmur_hash_64a(data.as_bytes())
	}
}

/// Reads `.ninja_log` entries in file order.
///
/// The log may contain several entries for one output; the last one wins.
pub struct LogReader<R> {
	input: R,
	line: RawString,
}

impl<R: BufRead> LogReader<R> {
	/// Check the signature line and create a reader.
	pub fn new(mut input: R) -> Result<Self, LogError> {
		let mut line = RawString::new();
		input.read_until(b'\n', line.as_mut_bytes())?;
		if line.last() == Some(b'\n') {
			line.pop();
		}
		if line.last() == Some(b'\r') {
			line.pop();
		}
		if !line.starts_with("# ninja log v") {
			return Err(LogError::BadSignature);
		}
		let version = match parse(&line[13..]) {
			Some(version) => version,
			None => return Err(LogError::BadSignature),
		};
		if version != 5 {
			return Err(LogError::UnsupportedVersion(version));
		}
		Ok(LogReader {
			input,
			line: RawString::new(),
		})
	}

	/// The next entry, or `None` at the end of the file.
	///
	/// Malformed lines are skipped silently, like ninja skips them.
	pub fn read_entry(&mut self) -> Result<Option<LogEntry>, LogError> {
		loop {
			self.line.clear();
			if self.input.read_until(b'\n', self.line.as_mut_bytes())? == 0 {
				return Ok(None);
			}
			if self.line.last() == Some(b'\n') {
				self.line.pop();
			}
			if self.line.last() == Some(b'\r') {
				self.line.pop();
			}
			if let Some(entry) = parse_entry(&self.line) {
				return Ok(Some(entry));
			}
		}
	}
}

fn parse_entry(line: &RawStr) -> Option<LogEntry> {
	let mut tabs = memchr::memchr_iter(b'\t', line.as_bytes());
	let tab1 = tabs.next()?;
	let tab2 = tabs.next()?;
	let tab3 = tabs.next()?;
	let tab4 = tabs.next()?;
	Some(LogEntry {
		start_time_ms: parse(&line[..tab1])?,
		end_time_ms: parse(&line[tab1 + 1..tab2])?,
		mtime: Timestamp::from_nanos(parse(&line[tab2 + 1..tab3])?),
		output: line[tab3 + 1..tab4].into(),
		command_hash: parse_hex(&line[tab4 + 1..])?,
	})
}

fn parse<T: std::str::FromStr>(s: &RawStr) -> Option<T> {
	s.to_str().ok().and_then(|s| s.parse().ok())
}

fn parse_hex(s: &RawStr) -> Option<u64> {
	s.to_str().ok().and_then(|s| u64::from_str_radix(s, 16).ok())
}

/// Writes a `.ninja_log` file.
pub struct LogWriter<W> {
	out: W,
}

impl<W: Write> LogWriter<W> {
	/// Write the signature line and create a writer.
	pub fn new(mut out: W) -> Result<Self, LogError> {
		out.write_all(b"# ninja log v5\n")?;
		Ok(LogWriter { out })
	}

	/// Append one entry.
	pub fn write_entry(&mut self, entry: &LogEntry) -> Result<(), LogError> {
		writeln!(
			self.out,
			"{}\t{}\t{}\t{}\t{:x}",
			entry.start_time_ms,
			entry.end_time_ms,
			entry.mtime.map_or(0, Timestamp::to_nanos),
			entry.output,
			entry.command_hash,
		)?;
		Ok(())
	}

	pub fn into_inner(self) -> W {
		self.out
	}
}
