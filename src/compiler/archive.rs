//! Source archive: the complete generated package as a zip, for audit.

use crate::error::PipelineError;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

fn archive_error(e: impl ToString) -> PipelineError {
    PipelineError::Generation {
        target: "source archive".into(),
        message: e.to_string(),
    }
}

pub fn write_archive<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Vec<u8>, PipelineError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (path, text) in files {
        zip.start_file(path, options).map_err(archive_error)?;
        zip.write_all(text.as_bytes()).map_err(archive_error)?;
    }
    let cursor = zip.finish().map_err(archive_error)?;
    Ok(cursor.into_inner())
}

/// Read one entry back as text.
pub fn read_entry(archive: &[u8], name: &str) -> Result<String, PipelineError> {
    let mut zip = ZipArchive::new(Cursor::new(archive)).map_err(archive_error)?;
    let mut entry = zip.by_name(name).map_err(archive_error)?;
    let mut text = String::new();
    entry.read_to_string(&mut text).map_err(archive_error)?;
    Ok(text)
}

pub fn entry_names(archive: &[u8]) -> Result<Vec<String>, PipelineError> {
    let zip = ZipArchive::new(Cursor::new(archive)).map_err(archive_error)?;
    Ok(zip.file_names().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_read_back() {
        let bytes = write_archive([("Cargo.toml", "[package]\n"), ("src/main.rs", "fn main() {}\n")]).unwrap();
        assert_eq!(read_entry(&bytes, "src/main.rs").unwrap(), "fn main() {}\n");
        let mut names = entry_names(&bytes).unwrap();
        names.sort();
        assert_eq!(names, vec!["Cargo.toml", "src/main.rs"]);
    }
}
