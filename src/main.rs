use std::fs::File;
use std::io::{BufReader, Write};
use std::path::PathBuf;
use std::process::exit;
use structopt::StructOpt;
use trimj::trim::{trim, Error};

mod logger;

#[derive(StructOpt)]
#[structopt(
	name = "trimj",
	about = "Reduce a ninja build file to the build commands affected by a set of changed files."
)]
struct Opt {
	/// The ninja build file to reduce.
	#[structopt(short = "f", long = "file", parse(from_os_str))]
	file: PathBuf,

	/// A file listing the changed paths, one per line.
	#[structopt(short = "c", long = "changed", parse(from_os_str))]
	changed: PathBuf,

	/// Compare the output against this file instead of printing it.
	#[structopt(short = "e", long = "expected", parse(from_os_str))]
	expected: Option<PathBuf>,

	/// Explain on stderr why each build command was kept.
	#[structopt(long = "explain")]
	explain: bool,
}

static LOGGER: logger::Logger = logger::Logger;

fn main() {
	// Keep `-v` working alongside clap's own `-V`.
	if std::env::args().skip(1).any(|arg| arg == "-v" || arg == "--version") {
		println!("{}", env!("CARGO_PKG_VERSION"));
		return;
	}

	log::set_logger(&LOGGER).ok();
	log::set_max_level(log::LevelFilter::Info);

	let opt = Opt::from_args();
	exit(match run(&opt) {
		Ok(true) => 0,
		Ok(false) => 1,
		Err(error) => {
			eprintln!("{}", error);
			1
		}
	});
}

fn run(opt: &Opt) -> Result<bool, Error> {
	let contents = std::fs::read(&opt.file)?;
	let mut changed = BufReader::new(File::open(&opt.changed)?);

	match &opt.expected {
		None => {
			let stdout = std::io::stdout();
			let mut stdout = stdout.lock();
			trim(&mut stdout, &opt.file, contents, &mut changed, opt.explain)?;
			stdout.flush()?;
			Ok(true)
		}
		Some(expected) => {
			let mut trimmed = Vec::new();
			trim(&mut trimmed, &opt.file, contents, &mut changed, opt.explain)?;
			let expected = std::fs::read(expected)?;
			if trimmed == expected {
				Ok(true)
			} else {
				eprintln!("Output is different to expected");
				let stdout = std::io::stdout();
				let mut stdout = stdout.lock();
				stdout.write_all(&trimmed)?;
				stdout.flush()?;
				Ok(false)
			}
		}
	}
}
