//! Result archive storage and extraction

use super::DeliveryError;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::warn;
use zip::ZipArchive;

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}

/// Local file name for an uploaded archive.
///
/// Derived from the last path segment. Every batch uploads `output.zip`, so
/// the parent segment (the task hash) is prefixed when present:
/// `tasks/<hash>/output.zip` becomes `<hash>-output.zip`.
pub fn archive_name(rel_path: &str) -> Option<String> {
    let segments: Vec<&str> = rel_path.split('/').filter(|s| !s.is_empty()).collect();
    let last = segments.last()?;
    let stem = Path::new(last)
        .file_stem()
        .map(|s| sanitize(&s.to_string_lossy()))
        .filter(|s| !s.is_empty())?;

    let parent = segments
        .len()
        .checked_sub(2)
        .map(|i| sanitize(segments[i]))
        .filter(|s| !s.is_empty());
    Some(match parent {
        Some(parent) => format!("{}-{}.zip", parent, stem),
        None => format!("{}.zip", stem),
    })
}

/// Extract a zip next to itself, refusing entries that escape `dest`
pub fn extract_zip(archive_path: &Path, dest: &Path) -> Result<Vec<PathBuf>, DeliveryError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;
    let mut written = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(rel) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "Skipping zip entry outside the output directory");
            continue;
        };
        let out = dest.join(rel);

        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut target = File::create(&out)?;
        io::copy(&mut entry, &mut target)?;
        written.push(out);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            zip.start_file(name.to_string(), SimpleFileOptions::default()).unwrap();
            zip.write_all(data.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_archive_name() {
        assert_eq!(archive_name("tasks/ab12/output.zip").as_deref(), Some("ab12-output.zip"));
        assert_eq!(archive_name("output.zip").as_deref(), Some("output.zip"));
        assert_eq!(archive_name("results/../x y.zip").as_deref(), Some("x_y.zip"));
        assert_eq!(archive_name("/"), None);
        assert_eq!(archive_name(""), None);
    }

    #[test]
    fn test_extract_zip() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("out.zip");
        fs::write(
            &archive,
            zip_bytes(&[("main.obj", "OBJ"), ("pdb/main.pdb", "PDB")]),
        )
        .unwrap();

        let written = extract_zip(&archive, dir.path()).unwrap();

        assert_eq!(written.len(), 2);
        assert_eq!(fs::read(dir.path().join("main.obj")).unwrap(), b"OBJ");
        assert_eq!(fs::read(dir.path().join("pdb/main.pdb")).unwrap(), b"PDB");
    }

    #[test]
    fn test_escaping_entries_skipped() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("build");
        fs::create_dir_all(&dest).unwrap();
        let archive = dest.join("out.zip");
        fs::write(&archive, zip_bytes(&[("../evil.obj", "x"), ("ok.obj", "y")])).unwrap();

        let written = extract_zip(&archive, &dest).unwrap();

        assert_eq!(written, vec![dest.join("ok.obj")]);
        assert!(!dir.path().join("evil.obj").exists());
    }

    #[test]
    fn test_not_a_zip() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("out.zip");
        fs::write(&archive, b"definitely not a zip").unwrap();

        assert!(matches!(
            extract_zip(&archive, dir.path()),
            Err(DeliveryError::Zip(_))
        ));
    }
}
