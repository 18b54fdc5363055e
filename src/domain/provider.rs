//! Content provider
//!
//! Answers path queries against one host's content tree and applies the
//! mutations an SFTP client can request. Paths are slash-separated; leading,
//! trailing and repeated slashes are ignored, as are `.` segments, and `..`
//! steps back one level without leaving the root. The empty path, `/` and
//! `.` all name the root.

use crate::domain::content::{Content, ContentNode, ContentTree};
use crate::error::{MockError, Result};

/// Largest file a client may grow through writes or size changes.
pub const MAX_FILE_LEN: u64 = 1 << 30;

/// Split a path into its meaningful segments.
///
/// `..` removes the previous segment and never climbs above the root.
#[must_use]
pub fn normalize_path(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            name => segments.push(name),
        }
    }
    segments
}

/// Canonical absolute form of `path`, as reported by `realpath`.
#[must_use]
pub fn canonical_path(path: &str) -> String {
    format!("/{}", normalize_path(path).join("/"))
}

/// What a path resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry<'a> {
    Dir(&'a ContentTree),
    File(&'a Content),
}

impl Entry<'_> {
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        matches!(self, Self::Dir(_))
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        match self {
            Self::Dir(_) => 0,
            Self::File(content) => content.len(),
        }
    }
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// In-memory view of one host's files.
#[derive(Debug, Clone, Default)]
pub struct ContentProvider {
    root: ContentTree,
}

impl ContentProvider {
    #[must_use]
    pub const fn new(root: ContentTree) -> Self {
        Self { root }
    }

    /// True unless the value at `path` is file content.
    ///
    /// Callers are expected to check existence first; a missing path is not
    /// file content and so reports `true`.
    #[must_use]
    pub fn is_dir(&self, path: &str) -> bool {
        !matches!(self.get(path), Some(Entry::File(_)))
    }

    #[must_use]
    pub fn exists(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<Entry<'_>> {
        self.resolve(path).ok()
    }

    /// Walk the tree to `path`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if any segment is missing or passes through a file.
    pub fn resolve(&self, path: &str) -> Result<Entry<'_>> {
        let segments = normalize_path(path);
        let Some((last, parents)) = segments.split_last() else {
            return Ok(Entry::Dir(&self.root));
        };

        let mut current = &self.root;
        for segment in parents {
            match current.get(*segment) {
                Some(ContentNode::Dir(tree)) => current = tree,
                _ => return Err(MockError::not_found(path)),
            }
        }

        match current.get(*last) {
            Some(ContentNode::Dir(tree)) => Ok(Entry::Dir(tree)),
            Some(ContentNode::File(content)) => Ok(Entry::File(content)),
            None => Err(MockError::not_found(path)),
        }
    }

    /// Entries of the directory at `path`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing path and `Content` if it is a file.
    pub fn list(&self, path: &str) -> Result<Vec<ListEntry>> {
        match self.resolve(path)? {
            Entry::Dir(tree) => Ok(tree
                .iter()
                .map(|(name, node)| ListEntry {
                    name: name.clone(),
                    is_dir: node.is_dir(),
                    size: node.size(),
                })
                .collect()),
            Entry::File(_) => Err(MockError::content(path, "not a directory")),
        }
    }

    /// Full contents of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing path and `Content` for a directory.
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        match self.resolve(path)? {
            Entry::File(content) => Ok(content.as_bytes().into_owned()),
            Entry::Dir(_) => Err(MockError::content(path, "is a directory")),
        }
    }

    /// Size in bytes of the entry at `path`. Directories report zero.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing path.
    pub fn size(&self, path: &str) -> Result<u64> {
        self.resolve(path).map(|entry| entry.size())
    }

    /// Replace the file at `path` with `data`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Fails if the parent directory is missing or `path` is a directory.
    pub fn put(&mut self, path: &str, data: Vec<u8>) -> Result<()> {
        let (parent, name) = split_parent(path)?;
        let dir = dir_mut(&mut self.root, &parent, path)?;
        if matches!(dir.get(name), Some(ContentNode::Dir(_))) {
            return Err(MockError::content(path, "is a directory"));
        }
        dir.insert(name.to_string(), ContentNode::File(Content::Bytes(data)));
        Ok(())
    }

    /// Open-for-write semantics: create an empty file if missing, and empty
    /// an existing file when `truncate` is set.
    ///
    /// # Errors
    ///
    /// Fails if the parent directory is missing or `path` is a directory.
    pub fn create_file(&mut self, path: &str, truncate: bool) -> Result<()> {
        let (parent, name) = split_parent(path)?;
        let dir = dir_mut(&mut self.root, &parent, path)?;
        match dir.get_mut(name) {
            Some(ContentNode::Dir(_)) => Err(MockError::content(path, "is a directory")),
            Some(ContentNode::File(content)) => {
                if truncate {
                    *content = Content::Bytes(Vec::new());
                }
                Ok(())
            }
            None => {
                dir.insert(name.to_string(), ContentNode::File(Content::Bytes(Vec::new())));
                Ok(())
            }
        }
    }

    /// Write `data` at `offset`, zero-filling any gap past the current end.
    ///
    /// # Errors
    ///
    /// Fails if `path` does not name an existing file or the write would
    /// grow it past [`MAX_FILE_LEN`].
    pub fn write_at(&mut self, path: &str, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|end| *end <= MAX_FILE_LEN)
            .ok_or_else(|| MockError::content(path, "offset out of range"))?;
        let (Ok(start), Ok(end)) = (usize::try_from(offset), usize::try_from(end)) else {
            return Err(MockError::content(path, "offset out of range"));
        };
        let content = file_mut(&mut self.root, path)?;
        let mut bytes = std::mem::replace(content, Content::Bytes(Vec::new())).into_bytes();
        if bytes.len() < end {
            bytes.resize(end, 0);
        }
        bytes[start..end].copy_from_slice(data);
        *content = Content::Bytes(bytes);
        Ok(())
    }

    /// Cut or extend the file at `path` to `len` bytes.
    ///
    /// # Errors
    ///
    /// Fails if `path` does not name an existing file or `len` exceeds
    /// [`MAX_FILE_LEN`].
    pub fn truncate(&mut self, path: &str, len: u64) -> Result<()> {
        if len > MAX_FILE_LEN {
            return Err(MockError::content(path, "size out of range"));
        }
        let len = usize::try_from(len).map_err(|_| MockError::content(path, "size out of range"))?;
        let content = file_mut(&mut self.root, path)?;
        let mut bytes = std::mem::replace(content, Content::Bytes(Vec::new())).into_bytes();
        bytes.resize(len, 0);
        *content = Content::Bytes(bytes);
        Ok(())
    }

    /// Create an empty directory.
    ///
    /// # Errors
    ///
    /// Fails if the parent is missing or an entry already exists at `path`.
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        let (parent, name) = split_parent(path)?;
        let dir = dir_mut(&mut self.root, &parent, path)?;
        if dir.contains_key(name) {
            return Err(MockError::content(path, "already exists"));
        }
        dir.insert(name.to_string(), ContentNode::Dir(ContentTree::new()));
        Ok(())
    }

    /// Remove a file.
    ///
    /// # Errors
    ///
    /// Fails if `path` is missing or names a directory.
    pub fn remove(&mut self, path: &str) -> Result<()> {
        let (parent, name) = split_parent(path)?;
        let dir = dir_mut(&mut self.root, &parent, path)?;
        match dir.get(name) {
            Some(ContentNode::File(_)) => {
                dir.shift_remove(name);
                Ok(())
            }
            Some(ContentNode::Dir(_)) => Err(MockError::content(path, "is a directory")),
            None => Err(MockError::not_found(path)),
        }
    }

    /// Remove an empty directory.
    ///
    /// # Errors
    ///
    /// Fails if `path` is missing, is a file, is the root or is not empty.
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let (parent, name) = split_parent(path)?;
        let dir = dir_mut(&mut self.root, &parent, path)?;
        match dir.get(name) {
            Some(ContentNode::Dir(tree)) if tree.is_empty() => {
                dir.shift_remove(name);
                Ok(())
            }
            Some(ContentNode::Dir(_)) => Err(MockError::content(path, "directory not empty")),
            Some(ContentNode::File(_)) => Err(MockError::content(path, "not a directory")),
            None => Err(MockError::not_found(path)),
        }
    }

    /// Move the entry at `from` to `to`. The destination must not exist.
    ///
    /// # Errors
    ///
    /// Fails if the source is missing, the destination exists, the
    /// destination parent is missing, or a directory would be moved into
    /// itself.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let (from_parent, from_name) = split_parent(from)?;
        let (to_parent, to_name) = split_parent(to)?;

        let from_segments = normalize_path(from);
        let to_segments = normalize_path(to);
        if to_segments.len() > from_segments.len() && to_segments.starts_with(&from_segments) {
            return Err(MockError::content(to, "cannot move a directory into itself"));
        }
        if from_segments == to_segments {
            return if self.exists(from) {
                Ok(())
            } else {
                Err(MockError::not_found(from))
            };
        }

        if !self.exists(from) {
            return Err(MockError::not_found(from));
        }
        match self.resolve(&format!("/{}", to_parent.join("/"))) {
            Ok(Entry::Dir(tree)) if tree.contains_key(to_name) => {
                return Err(MockError::content(to, "already exists"));
            }
            Ok(Entry::Dir(_)) => {}
            Ok(Entry::File(_)) => return Err(MockError::content(to, "parent is not a directory")),
            Err(_) => return Err(MockError::not_found(to)),
        }

        let source = dir_mut(&mut self.root, &from_parent, from)?;
        let node = source
            .shift_remove(from_name)
            .ok_or_else(|| MockError::not_found(from))?;
        let target = dir_mut(&mut self.root, &to_parent, to)?;
        target.insert(to_name.to_string(), node);
        Ok(())
    }

    /// Copy of the current tree.
    #[must_use]
    pub fn snapshot(&self) -> ContentTree {
        self.root.clone()
    }

    #[must_use]
    pub fn into_tree(self) -> ContentTree {
        self.root
    }
}

fn split_parent(path: &str) -> Result<(Vec<&str>, &str)> {
    let mut segments = normalize_path(path);
    let name = segments
        .pop()
        .ok_or_else(|| MockError::content("/", "the root has no parent"))?;
    Ok((segments, name))
}

fn dir_mut<'a>(
    root: &'a mut ContentTree,
    segments: &[&str],
    path: &str,
) -> Result<&'a mut ContentTree> {
    let mut current = root;
    for segment in segments {
        current = match current.get_mut(*segment) {
            Some(ContentNode::Dir(tree)) => tree,
            Some(ContentNode::File(_)) => {
                return Err(MockError::content(path, "parent is not a directory"));
            }
            None => return Err(MockError::not_found(path)),
        };
    }
    Ok(current)
}

fn file_mut<'a>(root: &'a mut ContentTree, path: &str) -> Result<&'a mut Content> {
    let (parent, name) = split_parent(path)?;
    let dir = dir_mut(root, &parent, path)?;
    match dir.get_mut(name) {
        Some(ContentNode::File(content)) => Ok(content),
        Some(ContentNode::Dir(_)) => Err(MockError::content(path, "is a directory")),
        None => Err(MockError::not_found(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_tree;

    fn sample() -> ContentProvider {
        ContentProvider::new(content_tree! {
            "a_file.txt" => "content",
            "count" => (3i64),
            "folder" => {
                "nested.txt" => "deep",
                "empty" => {},
            },
        })
    }

    // ============== Path Tests ==============

    #[test]
    fn test_normalize_path_ignores_slashes_and_dots() {
        assert_eq!(normalize_path("//a/./b/"), vec!["a", "b"]);
        assert!(normalize_path("").is_empty());
        assert!(normalize_path("/").is_empty());
        assert!(normalize_path(".").is_empty());
    }

    #[test]
    fn test_canonical_path() {
        assert_eq!(canonical_path("."), "/");
        assert_eq!(canonical_path(""), "/");
        assert_eq!(canonical_path("folder/./empty/"), "/folder/empty");
        assert_eq!(canonical_path("/folder/../a_file.txt"), "/a_file.txt");
        assert_eq!(canonical_path("/../.."), "/");
    }

    #[test]
    fn test_normalize_path_pops_parent_segments() {
        assert_eq!(normalize_path("a/../b"), vec!["b"]);
        assert_eq!(normalize_path("/a/b/../../c/./d"), vec!["c", "d"]);
        assert!(normalize_path("/..").is_empty());
        assert!(normalize_path("../../..").is_empty());
        assert_eq!(normalize_path("../a"), vec!["a"]);
    }

    #[test]
    fn test_resolve_matches_canonical_path() {
        let provider = sample();
        let entry = provider.resolve("/folder/../folder/nested.txt").unwrap();
        assert_eq!(entry, provider.resolve("/folder/nested.txt").unwrap());
        assert!(provider.resolve("folder/empty/..").unwrap().is_dir());
        assert_eq!(
            provider.resolve("/../a_file.txt").unwrap(),
            provider.resolve(&canonical_path("/../a_file.txt")).unwrap()
        );
    }

    #[test]
    fn test_parent_segments_never_become_entries() {
        let mut provider = sample();
        assert!(provider.mkdir("/..").is_err());
        assert!(provider.put("..", b"x".to_vec()).is_err());
        assert!(provider.create_file("/folder/..", true).is_err(), "names the root");
        provider.mkdir("folder/../made").unwrap();
        assert!(provider.is_dir("made"));
        assert!(!provider.snapshot().contains_key(".."));
    }

    // ============== Query Tests ==============

    #[test]
    fn test_root_aliases_resolve_to_root() {
        let provider = sample();
        for path in ["", "/", "."] {
            let entry = provider.resolve(path).unwrap();
            assert!(entry.is_dir(), "{path:?} should be the root");
        }
    }

    #[test]
    fn test_is_dir() {
        let provider = sample();
        assert!(provider.is_dir("/"));
        assert!(provider.is_dir("folder"));
        assert!(provider.is_dir("/folder/empty"));
        assert!(!provider.is_dir("a_file.txt"));
        assert!(!provider.is_dir("count"));
    }

    #[test]
    fn test_is_dir_missing_path_is_not_file_content() {
        let provider = sample();
        assert!(!provider.exists("nope"));
        assert!(provider.is_dir("nope"));
    }

    #[test]
    fn test_resolve_through_file_is_not_found() {
        let provider = sample();
        let err = provider.resolve("a_file.txt/child").unwrap_err();
        assert!(matches!(err, MockError::NotFound { .. }));
    }

    #[test]
    fn test_list_preserves_declaration_order() {
        let provider = sample();
        let names: Vec<String> = provider
            .list("/")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a_file.txt", "count", "folder"]);
    }

    #[test]
    fn test_list_reports_kinds_and_sizes() {
        let provider = sample();
        let entries = provider.list("folder").unwrap();
        assert_eq!(
            entries[0],
            ListEntry {
                name: "nested.txt".to_string(),
                is_dir: false,
                size: 4,
            }
        );
        assert!(entries[1].is_dir);
    }

    #[test]
    fn test_list_file_fails() {
        let err = sample().list("a_file.txt").unwrap_err();
        assert!(matches!(err, MockError::Content { .. }));
    }

    #[test]
    fn test_read_file() {
        let provider = sample();
        assert_eq!(provider.read("/a_file.txt").unwrap(), b"content");
        assert_eq!(provider.read("count").unwrap(), b"3");
        assert_eq!(provider.read("folder/nested.txt").unwrap(), b"deep");
    }

    #[test]
    fn test_read_dir_fails() {
        assert!(matches!(
            sample().read("folder").unwrap_err(),
            MockError::Content { .. }
        ));
    }

    #[test]
    fn test_size() {
        let provider = sample();
        assert_eq!(provider.size("a_file.txt").unwrap(), 7);
        assert_eq!(provider.size("folder").unwrap(), 0);
        assert!(provider.size("missing").is_err());
    }

    // ============== Mutation Tests ==============

    #[test]
    fn test_put_creates_and_replaces() {
        let mut provider = sample();
        provider.put("/folder/new.bin", vec![1, 2, 3]).unwrap();
        assert_eq!(provider.read("folder/new.bin").unwrap(), vec![1, 2, 3]);

        provider.put("a_file.txt", b"replaced".to_vec()).unwrap();
        assert_eq!(provider.read("a_file.txt").unwrap(), b"replaced");
        let names: Vec<String> = provider.list("/").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names[0], "a_file.txt", "replacing keeps the entry's position");
    }

    #[test]
    fn test_put_into_missing_parent_fails() {
        let mut provider = sample();
        assert!(matches!(
            provider.put("nope/file.txt", vec![]).unwrap_err(),
            MockError::NotFound { .. }
        ));
    }

    #[test]
    fn test_put_over_directory_fails() {
        let mut provider = sample();
        assert!(provider.put("folder", vec![]).is_err());
    }

    #[test]
    fn test_create_file_truncates_only_when_asked() {
        let mut provider = sample();
        provider.create_file("a_file.txt", false).unwrap();
        assert_eq!(provider.read("a_file.txt").unwrap(), b"content");
        provider.create_file("a_file.txt", true).unwrap();
        assert!(provider.read("a_file.txt").unwrap().is_empty());
        provider.create_file("fresh.txt", false).unwrap();
        assert!(provider.exists("fresh.txt"));
    }

    #[test]
    fn test_write_at_overwrites_and_extends() {
        let mut provider = sample();
        provider.write_at("a_file.txt", 0, b"CON").unwrap();
        assert_eq!(provider.read("a_file.txt").unwrap(), b"CONtent");
        provider.write_at("a_file.txt", 9, b"!").unwrap();
        assert_eq!(provider.read("a_file.txt").unwrap(), b"CONtent\0\0!");
    }

    #[test]
    fn test_write_at_integer_content() {
        let mut provider = sample();
        provider.write_at("count", 1, b"0").unwrap();
        assert_eq!(provider.read("count").unwrap(), b"30");
    }

    #[test]
    fn test_truncate() {
        let mut provider = sample();
        provider.truncate("a_file.txt", 3).unwrap();
        assert_eq!(provider.read("a_file.txt").unwrap(), b"con");
        provider.truncate("a_file.txt", 5).unwrap();
        assert_eq!(provider.read("a_file.txt").unwrap(), b"con\0\0");
    }

    #[test]
    fn test_write_at_overflowing_offset_is_an_error() {
        let mut provider = sample();
        let err = provider.write_at("a_file.txt", u64::MAX - 1, b"xyz").unwrap_err();
        assert!(matches!(err, MockError::Content { .. }));
        assert_eq!(provider.read("a_file.txt").unwrap(), b"content");
    }

    #[test]
    fn test_write_at_past_size_limit_is_an_error() {
        let mut provider = sample();
        assert!(provider.write_at("a_file.txt", MAX_FILE_LEN, b"x").is_err());
        assert_eq!(provider.size("a_file.txt").unwrap(), 7);
    }

    #[test]
    fn test_truncate_past_size_limit_is_an_error() {
        let mut provider = sample();
        let err = provider.truncate("a_file.txt", MAX_FILE_LEN + 1).unwrap_err();
        assert!(format!("{err}").contains("size out of range"));
        assert!(provider.truncate("a_file.txt", u64::MAX).is_err());
        assert_eq!(provider.read("a_file.txt").unwrap(), b"content");
    }

    #[test]
    fn test_mkdir_and_rmdir() {
        let mut provider = sample();
        provider.mkdir("/folder/sub").unwrap();
        assert!(provider.is_dir("folder/sub"));
        assert!(provider.mkdir("folder/sub").is_err());
        provider.rmdir("folder/sub").unwrap();
        assert!(!provider.exists("folder/sub"));
    }

    #[test]
    fn test_rmdir_non_empty_fails() {
        let mut provider = sample();
        let err = provider.rmdir("folder").unwrap_err();
        assert!(format!("{err}").contains("not empty"));
    }

    #[test]
    fn test_rmdir_root_fails() {
        let mut provider = sample();
        assert!(provider.rmdir("/").is_err());
    }

    #[test]
    fn test_remove_keeps_sibling_order() {
        let mut provider = sample();
        provider.remove("count").unwrap();
        let names: Vec<String> = provider.list("/").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a_file.txt", "folder"]);
    }

    #[test]
    fn test_remove_directory_fails() {
        let mut provider = sample();
        assert!(provider.remove("folder").is_err());
        assert!(matches!(
            provider.remove("missing").unwrap_err(),
            MockError::NotFound { .. }
        ));
    }

    #[test]
    fn test_rename_file_across_directories() {
        let mut provider = sample();
        provider.rename("a_file.txt", "folder/moved.txt").unwrap();
        assert!(!provider.exists("a_file.txt"));
        assert_eq!(provider.read("folder/moved.txt").unwrap(), b"content");
    }

    #[test]
    fn test_rename_onto_existing_fails() {
        let mut provider = sample();
        assert!(provider.rename("a_file.txt", "count").is_err());
        assert_eq!(provider.read("a_file.txt").unwrap(), b"content");
    }

    #[test]
    fn test_rename_into_itself_fails() {
        let mut provider = sample();
        assert!(provider.rename("folder", "folder/empty/inner").is_err());
        assert!(provider.is_dir("folder"));
    }

    #[test]
    fn test_rename_missing_source_fails() {
        let mut provider = sample();
        assert!(matches!(
            provider.rename("ghost", "x").unwrap_err(),
            MockError::NotFound { .. }
        ));
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut provider = sample();
        let before = provider.snapshot();
        provider.remove("count").unwrap();
        assert!(before.contains_key("count"));
        assert!(!provider.snapshot().contains_key("count"));
    }
}
