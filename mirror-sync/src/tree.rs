//! In-memory file trees.
//!
//! A [`FileTree`] is a snapshot of a repository's files at some ref. Trees are
//! what the generator consumes and produces, and what gets committed to mirror
//! branches.

use serde::Serialize;
use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path};
use tracing::debug;

/// Directory never included in trees read from disk.
const GIT_DIR: &str = ".git";

/// File mode as stored by git.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileMode {
    /// `100644`
    #[default]
    Regular,
    /// `100755`
    Executable,
    /// `120000`; the content is the link target.
    Symlink,
    /// `160000`; the content is the commit SHA the submodule points at.
    Submodule,
}

impl FileMode {
    /// Returns the git tree mode string.
    #[must_use]
    pub fn git_mode(self) -> &'static str {
        match self {
            Self::Regular => "100644",
            Self::Executable => "100755",
            Self::Symlink => "120000",
            Self::Submodule => "160000",
        }
    }

    /// Git object type of entries with this mode.
    #[must_use]
    pub fn git_type(self) -> &'static str {
        match self {
            Self::Submodule => "commit",
            _ => "blob",
        }
    }

    /// Parses a git tree mode.
    #[must_use]
    pub fn from_git_mode(mode: &str) -> Option<Self> {
        match mode {
            "100644" => Some(Self::Regular),
            "100755" => Some(Self::Executable),
            "120000" => Some(Self::Symlink),
            "160000" => Some(Self::Submodule),
            _ => None,
        }
    }
}

/// A single file in a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Raw file content.
    pub content: Vec<u8>,
    /// File mode.
    pub mode: FileMode,
}

/// Kind of difference between two trees for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// A path that differs between two trees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeChange {
    pub path: String,
    pub kind: ChangeKind,
}

/// Files keyed by their `/`-separated path relative to the repository root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTree {
    files: BTreeMap<String, FileEntry>,
}

impl FileTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a regular file.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.insert_entry(
            path,
            FileEntry {
                content: content.into(),
                mode: FileMode::Regular,
            },
        );
    }

    /// Inserts a file with an explicit mode.
    pub fn insert_entry(&mut self, path: impl Into<String>, entry: FileEntry) {
        self.files.insert(path.into(), entry);
    }

    /// Removes a file, returning it if present.
    pub fn remove(&mut self, path: &str) -> Option<FileEntry> {
        self.files.remove(path)
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.files.get(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterates over files in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileEntry)> {
        self.files.iter().map(|(path, entry)| (path.as_str(), entry))
    }

    /// Returns true if both trees hold the same paths with the same content.
    ///
    /// Modes are ignored.
    #[must_use]
    pub fn same_content(&self, other: &FileTree) -> bool {
        self.files.len() == other.files.len()
            && self
                .files
                .iter()
                .zip(other.files.iter())
                .all(|((a_path, a), (b_path, b))| a_path == b_path && a.content == b.content)
    }

    /// Lists the paths that differ when going from `self` to `candidate`.
    #[must_use]
    pub fn changes_to(&self, candidate: &FileTree) -> Vec<TreeChange> {
        let mut changes = Vec::new();

        for (path, entry) in &candidate.files {
            match self.files.get(path) {
                None => changes.push(TreeChange {
                    path: path.clone(),
                    kind: ChangeKind::Added,
                }),
                Some(current) if current.content != entry.content => changes.push(TreeChange {
                    path: path.clone(),
                    kind: ChangeKind::Modified,
                }),
                Some(_) => {}
            }
        }

        for path in self.files.keys() {
            if !candidate.files.contains_key(path) {
                changes.push(TreeChange {
                    path: path.clone(),
                    kind: ChangeKind::Removed,
                });
            }
        }

        changes.sort_by(|a, b| a.path.cmp(&b.path));
        changes
    }

    /// Copies the entries of `from` that are missing here and match `keep`.
    pub fn carry_over(&mut self, from: &FileTree, keep: impl Fn(&str, &FileEntry) -> bool) {
        for (path, entry) in &from.files {
            if !self.files.contains_key(path) && keep(path, entry) {
                self.files.insert(path.clone(), entry.clone());
            }
        }
    }

    /// Writes every file below `root`, creating directories as needed.
    ///
    /// Symlinks are recreated as links. Submodules become empty directories,
    /// as in a checkout without initialized submodules.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors and on paths that would escape `root`.
    pub fn write_to(&self, root: &Path) -> io::Result<()> {
        for (path, entry) in &self.files {
            let relative = Path::new(path);
            if relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
            {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("refusing to write path outside the tree: {path}"),
                ));
            }

            let target = root.join(relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            match entry.mode {
                FileMode::Submodule => std::fs::create_dir_all(&target)?,
                FileMode::Symlink => write_symlink(&entry.content, &target)?,
                FileMode::Regular | FileMode::Executable => {
                    std::fs::write(&target, &entry.content)?;
                    set_mode(&target, entry.mode)?;
                }
            }
        }
        Ok(())
    }

    /// Reads every file and symlink below `root` into a tree.
    ///
    /// `.git` and paths matching [`is_ignored`] are skipped. Symlinks are
    /// recorded with their target and never followed.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn read_from(root: &Path, ignore: &[String]) -> io::Result<Self> {
        let mut tree = Self::new();
        read_directory_recursive(root, root, ignore, &mut tree)?;
        Ok(tree)
    }
}

impl<P: Into<String>, C: Into<Vec<u8>>> FromIterator<(P, C)> for FileTree {
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        let mut tree = Self::new();
        for (path, content) in iter {
            tree.insert(path, content);
        }
        tree
    }
}

fn read_directory_recursive(
    root: &Path,
    current: &Path,
    ignore: &[String],
    tree: &mut FileTree,
) -> io::Result<()> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let path = entry.path();
        let relative = tree_path(root, &path);

        if is_ignored(&relative, ignore) {
            debug!(path = %relative, "Skipping ignored path");
            continue;
        }

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            read_directory_recursive(root, &path, ignore, tree)?;
        } else if file_type.is_file() {
            let content = std::fs::read(&path)?;
            let mode = read_mode(&entry.metadata()?);
            tree.insert_entry(relative, FileEntry { content, mode });
        } else if file_type.is_symlink() {
            let content = link_target(&std::fs::read_link(&path)?);
            tree.insert_entry(
                relative,
                FileEntry {
                    content,
                    mode: FileMode::Symlink,
                },
            );
        } else {
            debug!(path = %relative, "Skipping non-regular file");
        }
    }
    Ok(())
}

fn tree_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Whether a `/`-separated path is excluded from trees read from disk.
///
/// True for `.git`, for paths with a component equal to an `ignore` entry and
/// for paths starting with an entry followed by `/`.
#[must_use]
pub fn is_ignored(relative: &str, ignore: &[String]) -> bool {
    relative.split('/').any(|component| {
        component == GIT_DIR || ignore.iter().any(|pattern| pattern == component)
    }) || ignore.iter().any(|pattern| {
        let pattern = pattern.trim_end_matches('/');
        relative == pattern || relative.starts_with(&format!("{pattern}/"))
    })
}

#[cfg(unix)]
fn read_mode(metadata: &std::fs::Metadata) -> FileMode {
    use std::os::unix::fs::PermissionsExt;
    if metadata.permissions().mode() & 0o111 != 0 {
        FileMode::Executable
    } else {
        FileMode::Regular
    }
}

#[cfg(not(unix))]
fn read_mode(_metadata: &std::fs::Metadata) -> FileMode {
    FileMode::Regular
}

#[cfg(unix)]
fn link_target(target: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    target.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn link_target(target: &Path) -> Vec<u8> {
    target.to_string_lossy().replace('\\', "/").into_bytes()
}

#[cfg(unix)]
fn write_symlink(target: &[u8], link: &Path) -> io::Result<()> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    std::os::unix::fs::symlink(OsStr::from_bytes(target), link)
}

#[cfg(not(unix))]
fn write_symlink(target: &[u8], link: &Path) -> io::Result<()> {
    std::fs::write(link, target)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: FileMode) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let bits = if mode == FileMode::Executable {
        0o755
    } else {
        0o644
    };
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(bits))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: FileMode) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree(files: &[(&str, &str)]) -> FileTree {
        files.iter().map(|(p, c)| (*p, *c)).collect()
    }

    #[test]
    fn same_content_ignores_mode() {
        let a = tree(&[("run.sh", "echo hi")]);
        let mut b = FileTree::new();
        b.insert_entry(
            "run.sh",
            FileEntry {
                content: b"echo hi".to_vec(),
                mode: FileMode::Executable,
            },
        );
        assert!(a.same_content(&b));
    }

    #[test]
    fn same_content_detects_differences() {
        let a = tree(&[("a.txt", "1"), ("b.txt", "2")]);
        assert!(!a.same_content(&tree(&[("a.txt", "1")])));
        assert!(!a.same_content(&tree(&[("a.txt", "1"), ("b.txt", "3")])));
        assert!(!a.same_content(&tree(&[("a.txt", "1"), ("c.txt", "2")])));
    }

    #[test]
    fn lists_changes_sorted_by_path() {
        let current = tree(&[("a.txt", "1"), ("b.txt", "2"), ("c.txt", "3")]);
        let candidate = tree(&[("a.txt", "1"), ("b.txt", "changed"), ("d.txt", "new")]);

        let changes = current.changes_to(&candidate);

        assert_eq!(
            changes,
            vec![
                TreeChange {
                    path: "b.txt".to_string(),
                    kind: ChangeKind::Modified
                },
                TreeChange {
                    path: "c.txt".to_string(),
                    kind: ChangeKind::Removed
                },
                TreeChange {
                    path: "d.txt".to_string(),
                    kind: ChangeKind::Added
                },
            ]
        );
    }

    #[test]
    fn writes_and_reads_back_nested_files() {
        let temp = TempDir::new().unwrap();
        let original = tree(&[("src/lib.py", "print(1)"), ("README.md", "hello")]);

        original.write_to(temp.path()).unwrap();
        let read = FileTree::read_from(temp.path(), &[]).unwrap();

        assert!(read.same_content(&original));
        assert_eq!(read.get("src/lib.py").unwrap().content, b"print(1)");
    }

    #[test]
    fn read_skips_git_and_ignored_paths() {
        let temp = TempDir::new().unwrap();
        tree(&[
            (".git/HEAD", "ref: refs/heads/main"),
            ("pkg/__pycache__/mod.pyc", "bytes"),
            ("build/out.txt", "artifact"),
            ("pkg/mod.py", "x = 1"),
        ])
        .write_to(temp.path())
        .unwrap();

        let read = FileTree::read_from(
            temp.path(),
            &["__pycache__".to_string(), "build/".to_string()],
        )
        .unwrap();

        assert_eq!(read.len(), 1);
        assert!(read.get("pkg/mod.py").is_some());
    }

    #[test]
    fn write_rejects_escaping_paths() {
        let temp = TempDir::new().unwrap();
        let result = tree(&[("../evil.txt", "x")]).write_to(temp.path());
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::InvalidInput);
    }

    #[cfg(unix)]
    #[test]
    fn preserves_executable_mode() {
        let temp = TempDir::new().unwrap();
        let mut original = FileTree::new();
        original.insert_entry(
            "bin/run",
            FileEntry {
                content: b"#!/bin/sh".to_vec(),
                mode: FileMode::Executable,
            },
        );

        original.write_to(temp.path()).unwrap();
        let read = FileTree::read_from(temp.path(), &[]).unwrap();

        assert_eq!(read.get("bin/run").unwrap().mode, FileMode::Executable);
    }

    #[test]
    fn parses_git_modes() {
        assert_eq!(FileMode::from_git_mode("100644"), Some(FileMode::Regular));
        assert_eq!(FileMode::from_git_mode("100755"), Some(FileMode::Executable));
        assert_eq!(FileMode::from_git_mode("120000"), Some(FileMode::Symlink));
        assert_eq!(FileMode::from_git_mode("160000"), Some(FileMode::Submodule));
        assert_eq!(FileMode::from_git_mode("040000"), None);
        assert_eq!(FileMode::Executable.git_mode(), "100755");
        assert_eq!(FileMode::Submodule.git_type(), "commit");
        assert_eq!(FileMode::Symlink.git_type(), "blob");
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_round_trip_as_links() {
        let temp = TempDir::new().unwrap();
        let mut original = tree(&[("docs/guide.md", "# Guide")]);
        original.insert_entry(
            "GUIDE.md",
            FileEntry {
                content: b"docs/guide.md".to_vec(),
                mode: FileMode::Symlink,
            },
        );

        original.write_to(temp.path()).unwrap();
        assert!(std::fs::symlink_metadata(temp.path().join("GUIDE.md"))
            .unwrap()
            .file_type()
            .is_symlink());
        let read = FileTree::read_from(temp.path(), &[]).unwrap();

        assert_eq!(read, original);
    }

    #[test]
    fn submodules_are_written_as_empty_directories() {
        let temp = TempDir::new().unwrap();
        let mut original = tree(&[("a.txt", "1")]);
        original.insert_entry(
            "vendor/lib",
            FileEntry {
                content: b"0123456789abcdef0123456789abcdef01234567".to_vec(),
                mode: FileMode::Submodule,
            },
        );

        original.write_to(temp.path()).unwrap();

        assert!(temp.path().join("vendor/lib").is_dir());
        let read = FileTree::read_from(temp.path(), &[]).unwrap();
        assert!(read.get("vendor/lib").is_none());
    }

    #[test]
    fn carry_over_fills_only_missing_matching_entries() {
        let downstream = tree(&[("a.txt", "old"), ("cache/x", "kept"), ("gone.txt", "x")]);
        let mut generated = tree(&[("a.txt", "new")]);

        generated.carry_over(&downstream, |path, _| path.starts_with("cache/") || path == "a.txt");

        assert_eq!(generated, tree(&[("a.txt", "new"), ("cache/x", "kept")]));
    }

    #[test]
    fn ignore_matches_components_and_prefixes() {
        let ignore = ["__pycache__".to_string(), "build/".to_string()];
        assert!(is_ignored("pkg/__pycache__/m.pyc", &ignore));
        assert!(is_ignored("build/out.txt", &ignore));
        assert!(is_ignored(".git/HEAD", &ignore));
        assert!(!is_ignored("src/build.rs", &ignore));
    }
}
