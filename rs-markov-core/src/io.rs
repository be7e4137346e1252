use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Reads a whole text file into memory.
pub fn read_file<P: AsRef<Path>>(filename: P) -> io::Result<String> {
	fs::read_to_string(filename)
}

/// Builds the default snapshot path for a training file and an order.
///
/// Example:
/// `data/schiller.txt` + `3` → `data/schiller-3.chain`
pub fn snapshot_path<P: AsRef<Path>>(input_path: P, order: usize) -> io::Result<PathBuf> {
	let input_path = input_path.as_ref();

	let parent = input_path.parent().unwrap_or_else(|| Path::new("."));
	let file_stem = input_path
		.file_stem()
		.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Input path has no filename"))?;

	let mut name = OsString::from(file_stem);
	name.push(format!("-{}.chain", order));
	Ok(parent.join(name))
}

/// Writes `bytes` to a sibling temporary file, then renames it over `path`.
///
/// A reader never observes a half-written snapshot.
pub(crate) fn write_atomic<P: AsRef<Path>>(path: P, bytes: &[u8]) -> io::Result<()> {
	let path = path.as_ref();
	let mut tmp = path.as_os_str().to_owned();
	tmp.push(".tmp");
	let tmp = PathBuf::from(tmp);

	fs::write(&tmp, bytes)?;
	fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn snapshot_path_keeps_folder() {
		let path = snapshot_path("data/schiller.txt", 3).unwrap();
		assert_eq!(path, PathBuf::from("data/schiller-3.chain"));
	}

	#[test]
	fn snapshot_path_needs_a_filename() {
		assert!(snapshot_path("/", 2).is_err());
	}

	#[test]
	fn write_atomic_replaces_content() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("out.bin");
		write_atomic(&path, b"first").unwrap();
		write_atomic(&path, b"second").unwrap();
		assert_eq!(fs::read(&path).unwrap(), b"second");
		assert!(!dir.path().join("out.bin.tmp").exists());
	}
}
