//! This library crate contains all the re-usable parts of `trimj`, a tool
//! that reduces a ninja build file to only the build commands affected by
//! a given set of changed files, turning everything else into no-op
//! `phony` edges.
//!
//! # File formats
//!
//! This crate implements support for several file formats:
//!
//! - **`build.ninja` files**
//!
//!   The [`manifest`] module contains everything you need to parse
//!   `build.ninja` files while keeping each construct's exact source text,
//!   including variable expansion, scoping, and a writer for emitting
//!   constructs.
//!
//! - **`.ninja_log` files**
//!
//!   The [`buildlog`] module reads and writes `.ninja_log` files, which
//!   store how each target was built previously, along with the command
//!   hash ninja uses to detect changed commands.
//!
//! - **`.ninja_deps` files**
//!
//!   The [`deplog`] module reads and writes `.ninja_deps` files, which
//!   hold the dependency information discovered during previous builds.
//!
//! # Utilities
//!
//! Other than file formats, this crate also provides:
//!
//! - **Error handling**
//!
//!   [`ErrorWithLocation`][error::ErrorWithLocation] adds location
//!   information (file name, line, column, and the offending line) to an
//!   [`Error`][std::error::Error], so that the user can see where
//!   something went wrong while reading a file.
//!
//! - **A path graph**
//!
//!   The [`graph`] module interns [canonicalized][canonical] paths and
//!   tracks which build commands consume and produce them.
//!
//! - **The trim solver**
//!
//!   The [`trim`] module ties everything together: it decides which build
//!   commands must run for a given change set and rewrites the manifest
//!   accordingly.

pub mod builddir;
pub mod buildlog;
pub mod canonical;
pub mod clock;
pub mod deplog;
pub mod error;
pub mod graph;
pub mod manifest;
pub mod rule;
pub mod trim;
