//! Listing of recorded files in the data directory.

use serde::Serialize;
use std::io;
use std::path::Path;

/// A regular file in the data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedFile {
    pub name: String,
    /// Name escaped for use as a single URL path segment.
    pub href: String,
    pub size: u64,
    pub size_human: String,
}

/// Regular files directly under `dir`, sorted by name.
pub fn list_recorded_files(dir: &Path) -> io::Result<Vec<RecordedFile>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        files.push(RecordedFile {
            href: urlencoding::encode(&name).into_owned(),
            size: metadata.len(),
            size_human: human_size(metadata.len()),
            name,
        });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// SI-prefixed byte count: `82 B`, `1.5 kB`, `83 MB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];

    if bytes < 10 {
        return format!("{} B", bytes);
    }

    let mut exponent = 0;
    let mut scaled = bytes as f64;
    while scaled >= 1000.0 && exponent < UNITS.len() - 1 {
        scaled /= 1000.0;
        exponent += 1;
    }

    let rounded = (scaled * 10.0 + 0.5).floor() / 10.0;
    if rounded < 10.0 {
        format!("{:.1} {}", rounded, UNITS[exponent])
    } else {
        format!("{:.0} {}", rounded, UNITS[exponent])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_use_si_prefixes() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(82), "82 B");
        assert_eq!(human_size(999), "999 B");
        assert_eq!(human_size(1500), "1.5 kB");
        assert_eq!(human_size(82_854_982), "83 MB");
        assert_eq!(human_size(3_200_000_000), "3.2 GB");
    }

    #[test]
    fn lists_only_regular_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("zed_20240101_000000.ts"), b"zz").unwrap();
        std::fs::write(dir.path().join("alice 1.ts"), vec![0u8; 1500]).unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let files = list_recorded_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);

        assert_eq!(files[0].name, "alice 1.ts");
        assert_eq!(files[0].href, "alice%201.ts");
        assert_eq!(files[0].size, 1500);
        assert_eq!(files[0].size_human, "1.5 kB");

        assert_eq!(files[1].name, "zed_20240101_000000.ts");
        assert_eq!(files[1].size_human, "2 B");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_recorded_files(&dir.path().join("absent")).is_err());
    }
}
