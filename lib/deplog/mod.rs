//! Reading and writing dependency logs (i.e. `.ninja_deps` files).
//!
//! The v4 format is the signature line `# ninjadeps\n`, a little-endian
//! 32-bit version, then a sequence of records. Each record starts with a
//! little-endian `u32` whose top bit selects the record type and whose low
//! 31 bits give the payload size. A path record holds a NUL-padded path
//! followed by a checksum which is the one's complement of the path's
//! sequential id; a deps record holds an output id, an mtime on the
//! on-disk clock, and the input ids.

use crate::clock::Timestamp;
use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use raw_string::{RawStr, RawString};
use std::error;
use std::fmt;
use std::io::{ErrorKind, Read, Write};

/// The most bytes a record payload may hold.
pub const MAX_RECORD_SIZE: u32 = (1 << 22) - 1;

const SIGNATURE: &[u8] = b"# ninjadeps\n";
const VERSION: i32 = 4;

/// One record of a `.ninja_deps` file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DepsRecord {
	/// A path. `id` is recovered from the record's checksum; ninja assigns
	/// them sequentially.
	Path { id: i32, path: RawString },
	/// The discovered dependencies of the path with id `out`, replacing
	/// any earlier record for the same id.
	Deps {
		out: i32,
		mtime: Option<Timestamp>,
		deps: Vec<i32>,
	},
}

/// An error while reading or writing a `.ninja_deps` file.
#[derive(Debug)]
pub enum DepLogError {
	BadSignature,
	UnsupportedVersion(i32),
	RecordTooLarge(u32),
	InvalidRecord,
	UnexpectedEof,
	Io(std::io::Error),
}

impl fmt::Display for DepLogError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			DepLogError::BadSignature => write!(f, "Not a ninjadeps file"),
			DepLogError::UnsupportedVersion(version) => write!(
				f,
				"Only version 4 of ninjadeps is supported, but version {} was found",
				version
			),
			DepLogError::RecordTooLarge(size) => {
				write!(f, "Record of {} bytes exceeds the maximum size", size)
			}
			DepLogError::InvalidRecord => write!(f, "Invalid record in ninjadeps file"),
			DepLogError::UnexpectedEof => {
				write!(f, "Unexpected end of file in ninjadeps record")
			}
			DepLogError::Io(e) => write!(f, "{}", e),
		}
	}
}

impl error::Error for DepLogError {
	fn source(&self) -> Option<&(dyn error::Error + 'static)> {
		match self {
			DepLogError::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<std::io::Error> for DepLogError {
	fn from(src: std::io::Error) -> DepLogError {
		if src.kind() == ErrorKind::UnexpectedEof {
			DepLogError::UnexpectedEof
		} else {
			DepLogError::Io(src)
		}
	}
}

/// Reads `.ninja_deps` records in file order.
pub struct DepsReader<R> {
	input: R,
}

impl<R: Read> DepsReader<R> {
	/// Check the signature and version, and create a reader.
	pub fn new(mut input: R) -> Result<Self, DepLogError> {
		let mut signature = [0u8; 12];
		input
			.read_exact(&mut signature)
			.map_err(|e| match e.kind() {
				ErrorKind::UnexpectedEof => DepLogError::BadSignature,
				_ => DepLogError::Io(e),
			})?;
		if signature != *SIGNATURE {
			return Err(DepLogError::BadSignature);
		}
		let version = input.read_i32::<LE>()?;
		if version != VERSION {
			return Err(DepLogError::UnsupportedVersion(version));
		}
		Ok(DepsReader { input })
	}

	/// The next record, or `None` at a clean end of file.
	pub fn read_record(&mut self) -> Result<Option<DepsRecord>, DepLogError> {
		let head = match self.input.read_u32::<LE>() {
			Ok(head) => head,
			Err(ref e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
			Err(e) => return Err(DepLogError::Io(e)),
		};
		let size = head & 0x7fff_ffff;
		if size > MAX_RECORD_SIZE {
			return Err(DepLogError::RecordTooLarge(size));
		}
		if head & 0x8000_0000 == 0 {
			// Path record: NUL-padded name, then the checksum.
			if size < 4 || size % 4 != 0 {
				return Err(DepLogError::InvalidRecord);
			}
			let mut name = vec![0u8; size as usize - 4];
			self.input.read_exact(&mut name)?;
			for _ in 0..3 {
				if name.last() == Some(&0) {
					name.pop();
				}
			}
			let checksum = self.input.read_u32::<LE>()?;
			Ok(Some(DepsRecord::Path {
				id: !checksum as i32,
				path: RawString::from_bytes(name),
			}))
		} else {
			// Deps record: output id, mtime, then the input ids.
			if size < 12 || size % 4 != 0 {
				return Err(DepLogError::InvalidRecord);
			}
			let out = self.input.read_i32::<LE>()?;
			let mtime = Timestamp::from_nanos(self.input.read_u64::<LE>()?);
			let count = (size as usize - 12) / 4;
			let mut deps = Vec::with_capacity(count);
			for _ in 0..count {
				deps.push(self.input.read_i32::<LE>()?);
			}
			Ok(Some(DepsRecord::Deps { out, mtime, deps }))
		}
	}
}

/// Writes a `.ninja_deps` file.
pub struct DepsWriter<W> {
	out: W,
	next_path_id: i32,
}

impl<W: Write> DepsWriter<W> {
	/// Write the signature and version, and create a writer.
	pub fn new(mut out: W) -> Result<Self, DepLogError> {
		out.write_all(SIGNATURE)?;
		out.write_i32::<LE>(VERSION)?;
		Ok(DepsWriter {
			out,
			next_path_id: 0,
		})
	}

	/// Write a path record and return the id assigned to it.
	pub fn record_path(&mut self, path: &RawStr) -> Result<i32, DepLogError> {
		let padded = (path.len() as u64 + 3) / 4 * 4;
		if padded + 4 > u64::from(MAX_RECORD_SIZE) {
			return Err(DepLogError::RecordTooLarge(MAX_RECORD_SIZE));
		}
		let padding = padded as usize - path.len();
		self.out.write_u32::<LE>(padded as u32 + 4)?;
		self.out.write_all(path.as_bytes())?;
		self.out.write_all(&b"\0\0\0"[..padding])?;
		let id = self.next_path_id;
		self.out.write_u32::<LE>(!(id as u32))?;
		self.next_path_id += 1;
		Ok(id)
	}

	/// Write a dependencies record for the path id `out`.
	pub fn record_deps(
		&mut self,
		out: i32,
		mtime: Option<Timestamp>,
		deps: &[i32],
	) -> Result<(), DepLogError> {
		let size = 12 + deps.len() as u64 * 4;
		if size > u64::from(MAX_RECORD_SIZE) {
			return Err(DepLogError::RecordTooLarge(MAX_RECORD_SIZE));
		}
		self.out.write_u32::<LE>(size as u32 | 0x8000_0000)?;
		self.out.write_i32::<LE>(out)?;
		self.out.write_u64::<LE>(mtime.map_or(0, Timestamp::to_nanos))?;
		for &dep in deps {
			self.out.write_i32::<LE>(dep)?;
		}
		Ok(())
	}

	pub fn into_inner(self) -> W {
		self.out
	}
}

#[cfg(test)]
mod test {
	use super::*;

	// The hand-written v4 file below has two path records and one deps
	// record saying `bar` depends on `foo`.
	#[rustfmt::skip]
	fn sample_bytes() -> Vec<u8> {
		let mut bytes = Vec::new();
		bytes.extend_from_slice(b"# ninjadeps\n");
		bytes.extend_from_slice(&[4, 0, 0, 0]);
		// "foo", one byte of padding, checksum !0
		bytes.extend_from_slice(&[8, 0, 0, 0]);
		bytes.extend_from_slice(b"foo\0");
		bytes.extend_from_slice(&[0xff, 0xff, 0xff, 0xff]);
		// "bar", one byte of padding, checksum !1
		bytes.extend_from_slice(&[8, 0, 0, 0]);
		bytes.extend_from_slice(b"bar\0");
		bytes.extend_from_slice(&[0xfe, 0xff, 0xff, 0xff]);
		// deps: bar (id 1) <- foo (id 0), mtime 0x0123456789abcdef
		bytes.extend_from_slice(&[16, 0, 0, 0x80]);
		bytes.extend_from_slice(&[1, 0, 0, 0]);
		bytes.extend_from_slice(&[0xef, 0xcd, 0xab, 0x89, 0x67, 0x45, 0x23, 0x01]);
		bytes.extend_from_slice(&[0, 0, 0, 0]);
		bytes
	}

	fn sample_records() -> Vec<DepsRecord> {
		vec![
			DepsRecord::Path {
				id: 0,
				path: RawString::from("foo"),
			},
			DepsRecord::Path {
				id: 1,
				path: RawString::from("bar"),
			},
			DepsRecord::Deps {
				out: 1,
				mtime: Timestamp::from_nanos(0x0123_4567_89ab_cdef),
				deps: vec![0],
			},
		]
	}

	fn read_all(bytes: &[u8]) -> Vec<DepsRecord> {
		let mut reader = DepsReader::new(bytes).unwrap();
		let mut records = Vec::new();
		while let Some(record) = reader.read_record().unwrap() {
			records.push(record);
		}
		records
	}

	#[test]
	fn decodes_known_bytes() {
		assert_eq!(read_all(&sample_bytes()), sample_records());
	}

	#[test]
	fn encodes_known_records() {
		let mut writer = DepsWriter::new(Vec::new()).unwrap();
		assert_eq!(writer.record_path(RawStr::from_str("foo")).unwrap(), 0);
		assert_eq!(writer.record_path(RawStr::from_str("bar")).unwrap(), 1);
		writer
			.record_deps(1, Timestamp::from_nanos(0x0123_4567_89ab_cdef), &[0])
			.unwrap();
		assert_eq!(writer.into_inner(), sample_bytes());
	}

	#[test]
	fn encode_decode_round_trips() {
		let mut writer = DepsWriter::new(Vec::new()).unwrap();
		for path in &["a", "ab", "abc", "abcd", "dir/e.h"] {
			writer.record_path(RawStr::from_str(path)).unwrap();
		}
		writer.record_deps(0, None, &[1, 2, 3, 4]).unwrap();
		writer.record_deps(0, Timestamp::from_nanos(7), &[4]).unwrap();
		let bytes = writer.into_inner();
		let records = read_all(&bytes);

		let mut rewritten = DepsWriter::new(Vec::new()).unwrap();
		for record in &records {
			match record {
				DepsRecord::Path { path, .. } => {
					rewritten.record_path(path).unwrap();
				}
				DepsRecord::Deps { out, mtime, deps } => {
					rewritten.record_deps(*out, *mtime, deps).unwrap();
				}
			}
		}
		assert_eq!(rewritten.into_inner(), bytes);
	}

	#[test]
	fn four_byte_path_has_no_padding() {
		let mut writer = DepsWriter::new(Vec::new()).unwrap();
		writer.record_path(RawStr::from_str("abcd")).unwrap();
		let bytes = writer.into_inner();
		let records = read_all(&bytes);
		assert_eq!(
			records,
			[DepsRecord::Path {
				id: 0,
				path: RawString::from("abcd"),
			}]
		);
	}

	#[test]
	fn rejects_bad_signature() {
		match DepsReader::new(&b"# ninjalogs\n\x04\0\0\0"[..]) {
			Err(DepLogError::BadSignature) => {}
			_ => panic!("expected a signature error"),
		}
	}

	#[test]
	fn rejects_other_versions() {
		match DepsReader::new(&b"# ninjadeps\n\x03\0\0\0"[..]) {
			Err(DepLogError::UnsupportedVersion(3)) => {}
			_ => panic!("expected a version error"),
		}
	}

	#[test]
	fn truncated_record_is_an_error() {
		let mut bytes = sample_bytes();
		bytes.truncate(bytes.len() - 2);
		let mut reader = DepsReader::new(&bytes[..]).unwrap();
		reader.read_record().unwrap();
		reader.read_record().unwrap();
		match reader.read_record() {
			Err(DepLogError::UnexpectedEof) => {}
			other => panic!("expected an EOF error, got {:?}", other.map(|_| ())),
		}
	}

	#[test]
	fn oversized_record_is_an_error() {
		let mut bytes = b"# ninjadeps\n\x04\0\0\0".to_vec();
		bytes.extend_from_slice(&(MAX_RECORD_SIZE + 1).to_le_bytes());
		let mut reader = DepsReader::new(&bytes[..]).unwrap();
		match reader.read_record() {
			Err(DepLogError::RecordTooLarge(_)) => {}
			other => panic!("expected a size error, got {:?}", other.map(|_| ())),
		}
	}
}
