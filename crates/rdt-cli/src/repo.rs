use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
}

impl FileEntry {
    /// One listing line as sent by the server: `name size`.
    pub fn to_line(&self) -> String {
        format!("{} {}", self.name, self.size)
    }

    /// The name may contain spaces, the size never does.
    pub fn from_line(line: &str) -> Option<Self> {
        let (name, size) = line.rsplit_once(' ')?;
        if name.is_empty() {
            return None;
        }
        Some(FileEntry {
            name: name.to_string(),
            size: size.parse().ok()?,
        })
    }
}

/// Regular files directly inside `dir`, sorted by name.
pub fn list_files(dir: &Path) -> io::Result<Vec<FileEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        // names that are not UTF-8 cannot be requested over the wire
        if let Some(name) = entry.file_name().to_str() {
            entries.push(FileEntry {
                name: name.to_string(),
                size: meta.len(),
            });
        }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// A bare file name that cannot escape the repository directory.
pub fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && name.is_ascii()
}

/// `dir/name`, or `dir/stem(n).ext` with the smallest free `n`.
pub fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let first = dir.join(name);
    if !first.exists() {
        return first;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    (1..)
        .map(|n| match ext {
            Some(ext) => dir.join(format!("{stem}({n}).{ext}")),
            None => dir.join(format!("{stem}({n})")),
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

pub fn format_listing(entries: &[FileEntry]) -> String {
    let width = entries
        .iter()
        .map(|e| e.name.len())
        .max()
        .unwrap_or(0)
        .max(8);
    let mut out = format!("{:>4}  {:<width$}  {:>10}\n", "No.", "Name", "Size");
    for (i, entry) in entries.iter().enumerate() {
        out.push_str(&format!(
            "{:>4}  {:<width$}  {:>10}\n",
            i, entry.name, entry.size
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rdt-repo-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn listing_line_round_trip() {
        let entry = FileEntry {
            name: "my notes.txt".into(),
            size: 1234,
        };
        assert_eq!(entry.to_line(), "my notes.txt 1234");
        assert_eq!(FileEntry::from_line(&entry.to_line()), Some(entry));
        assert_eq!(FileEntry::from_line("nosize"), None);
        assert_eq!(FileEntry::from_line("a b"), None);
        assert_eq!(FileEntry::from_line(" 5"), None);
    }

    #[test]
    fn lists_only_regular_files() {
        let dir = temp_dir("list");
        fs::write(dir.join("b.txt"), b"12345").unwrap();
        fs::write(dir.join("a.bin"), b"").unwrap();
        fs::create_dir(dir.join("sub")).unwrap();

        let entries = list_files(&dir).unwrap();
        assert_eq!(
            entries,
            vec![
                FileEntry {
                    name: "a.bin".into(),
                    size: 0
                },
                FileEntry {
                    name: "b.txt".into(),
                    size: 5
                },
            ]
        );
        let table = format_listing(&entries);
        assert!(table.contains("b.txt"));
        assert_eq!(table.lines().count(), 3);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unique_path_avoids_clashes() {
        let dir = temp_dir("unique");
        assert_eq!(unique_path(&dir, "a.txt"), dir.join("a.txt"));
        fs::write(dir.join("a.txt"), b"x").unwrap();
        assert_eq!(unique_path(&dir, "a.txt"), dir.join("a(1).txt"));
        fs::write(dir.join("a(1).txt"), b"x").unwrap();
        assert_eq!(unique_path(&dir, "a.txt"), dir.join("a(2).txt"));

        fs::write(dir.join("README"), b"x").unwrap();
        assert_eq!(unique_path(&dir, "README"), dir.join("README(1)"));
        fs::write(dir.join(".env"), b"x").unwrap();
        assert_eq!(unique_path(&dir, ".env"), dir.join(".env(1)"));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn plain_names() {
        assert!(is_plain_name("report.pdf"));
        assert!(is_plain_name("with space.txt"));
        assert!(!is_plain_name("../etc/passwd"));
        assert!(!is_plain_name("dir/file"));
        assert!(!is_plain_name(".."));
        assert!(!is_plain_name(""));
    }
}
