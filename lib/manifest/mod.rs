//! Everything related to the `build.ninja` file format.
//!
//! > manifest bytes → [`ManifestReader`] → records → evaluation against
//! > [`scope`]s
//!
//! The [`reader`] yields one record per top-level construct while keeping
//! track of each construct's exact source text. [`eval`] holds the
//! [`EvalString`] representation of `$`-interpolated text and the
//! [`Scope`] trait it is evaluated against; [`scope`] provides the scope
//! implementations (plain, subninja-nested, and per-build-edge). The
//! [`writer`] emits syntactically valid constructs for the opposite
//! direction.

pub mod error;
pub mod eval;
pub mod lexer;
pub mod reader;
pub mod scope;
pub mod writer;

pub use self::error::{ParseError, ReadError};
pub use self::eval::{evaluate, evaluate_to_string, EvalPart, EvalString, Scope};
pub use self::lexer::{Lexer, Token};
pub use self::reader::{ManifestReader, Record};
pub use self::writer::ManifestWriter;

use std::fs::File;
use std::io::Read;
use std::path::Path;

pub(crate) fn read_bytes(file_name: &Path) -> Result<Vec<u8>, ReadError> {
	let mut bytes = Vec::new();
	File::open(file_name)
		.and_then(|f| std::io::BufReader::with_capacity(0x10000, f).read_to_end(&mut bytes))
		.map_err(|error| ReadError::Io {
			file_name: file_name.to_owned(),
			error,
		})?;
	Ok(bytes)
}
