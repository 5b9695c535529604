//! VMX file reading and writing.
//!
//! A VMX file is a flat list of `key = "value"` assignments describing the
//! virtual hardware of a VMware VM. This module loads it into an ordered
//! mapping and writes it back in the same line format.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Key that VMware expects on the first line of the file.
const ENCODING_KEY: &str = ".encoding";

/// Ordered key/value contents of a VMX file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmxData {
    entries: IndexMap<String, String>,
}

impl VmxData {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Insert or overwrite a value. Overwriting keeps the key's position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Keep only the entries for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &str) -> bool) {
        self.entries.retain(|k, v| keep(k.as_str(), v.as_str()));
    }

    /// Whether the key exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in the order they were read or inserted.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serialize to VMX text.
    ///
    /// `.encoding` is written first, every other key follows in sorted
    /// order so the output depends only on the mapping's contents.
    pub fn to_vmx_string(&self) -> String {
        let mut keys: Vec<&String> = self
            .entries
            .keys()
            .filter(|k| k.as_str() != ENCODING_KEY)
            .collect();
        keys.sort();

        let mut out = String::new();
        if let Some(encoding) = self.entries.get(ENCODING_KEY) {
            out.push_str(&format!("{} = \"{}\"\n", ENCODING_KEY, encoding));
        }
        for key in keys {
            out.push_str(&format!("{} = \"{}\"\n", key, self.entries[key]));
        }
        out
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VmxData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut data = VmxData::new();
        for (k, v) in iter {
            data.insert(k, v);
        }
        data
    }
}

/// Read and parse a VMX file.
///
/// # Errors
///
/// Returns an I/O error carrying the path if the file cannot be read.
pub fn read_vmx(path: &Path) -> Result<VmxData> {
    let content = fs::read_to_string(path).map_err(|e| Error::io(e, path))?;
    Ok(parse_vmx_content(&content))
}

/// Write a VMX mapping to `path`, replacing its contents.
///
/// The content goes to a temporary file in the same directory which is then
/// renamed over `path`, so a failed write leaves the old descriptor intact.
/// An existing file's permissions carry over.
///
/// # Arguments
///
/// * `path` - Descriptor to replace or create.
/// * `data` - Entries to serialize with [`VmxData::to_vmx_string`].
///
/// # Errors
///
/// Returns an I/O error carrying `path` if the temporary file cannot be
/// created or written, or the rename fails.
pub fn write_vmx(path: &Path, data: &VmxData) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(e, path))?;
    tmp.write_all(data.to_vmx_string().as_bytes())
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| Error::io(e, path))?;

    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(tmp.path(), meta.permissions()).map_err(|e| Error::io(e, path))?;
    }

    tmp.persist(path).map_err(|e| Error::io(e.error, path))?;
    Ok(())
}

/// Parse VMX content from a string.
///
/// Handles both quoted and unquoted values:
/// - `key = "value"` -> ("key", "value")
/// - `key = value` -> ("key", "value")
///
/// Blank lines, `#` comments and lines without `=` are skipped. A repeated
/// key keeps its first position and its last value.
pub fn parse_vmx_content(content: &str) -> VmxData {
    let mut data = VmxData::new();

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Split on the first '='
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim();

            if key.is_empty() {
                continue;
            }

            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);

            data.insert(key, value);
        }
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quoted_values() {
        let content = r#"
            displayName = "My VM"
            memsize = "2048"
        "#;
        let data = parse_vmx_content(content);
        assert_eq!(data.get("displayName"), Some("My VM"));
        assert_eq!(data.get("memsize"), Some("2048"));
    }

    #[test]
    fn test_parse_unquoted_values() {
        let content = "displayName = MyVM\nmemsize=2048\n";
        let data = parse_vmx_content(content);
        assert_eq!(data.get("displayName"), Some("MyVM"));
        assert_eq!(data.get("memsize"), Some("2048"));
    }

    #[test]
    fn test_parse_skips_comments_and_blank_lines() {
        let content = "# comment\n\ndisplayName = \"Test\"\nnot an assignment\n";
        let data = parse_vmx_content(content);
        assert_eq!(data.len(), 1);
        assert_eq!(data.get("displayName"), Some("Test"));
    }

    #[test]
    fn test_parse_keeps_equals_inside_value() {
        let data = parse_vmx_content("annotation = \"a=b\"\n");
        assert_eq!(data.get("annotation"), Some("a=b"));
    }

    #[test]
    fn test_parse_preserves_file_order() {
        let data = parse_vmx_content("b = \"1\"\na = \"2\"\nc = \"3\"\n");
        let keys: Vec<&str> = data.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_parse_empty_value() {
        let data = parse_vmx_content("annotation = \"\"\n");
        assert_eq!(data.get("annotation"), Some(""));
    }

    #[test]
    fn test_to_vmx_string_encoding_first_then_sorted() {
        let data: VmxData = [
            ("memsize", "1024"),
            (".encoding", "UTF-8"),
            ("displayName", "web"),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            data.to_vmx_string(),
            ".encoding = \"UTF-8\"\ndisplayName = \"web\"\nmemsize = \"1024\"\n"
        );
    }

    #[test]
    fn test_to_vmx_string_empty() {
        assert_eq!(VmxData::new().to_vmx_string(), "");
    }

    #[test]
    fn test_write_vmx_replaces_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine.vmx");
        fs::write(&path, "displayName = \"old\"\nfloppy0.present = \"TRUE\"\n").unwrap();

        let data: VmxData = [(".encoding", "UTF-8"), ("displayName", "new")]
            .into_iter()
            .collect();
        write_vmx(&path, &data).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            ".encoding = \"UTF-8\"\ndisplayName = \"new\"\n"
        );
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec!["machine.vmx"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_vmx_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine.vmx");
        fs::write(&path, "displayName = \"old\"\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        write_vmx(&path, &VmxData::new()).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[test]
    fn test_write_vmx_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone").join("machine.vmx");

        let err = write_vmx(&path, &VmxData::new()).unwrap_err();
        match err {
            Error::Io { path: Some(p), .. } => assert_eq!(p, path),
            other => panic!("expected I/O error with path, got {other:?}"),
        }
        assert!(!dir.path().join("gone").exists());
    }

    #[test]
    fn test_insert_overwrites_in_place() {
        let mut data: VmxData = [("a", "1"), ("b", "2")].into_iter().collect();
        data.insert("a", "3");
        let entries: Vec<(&str, &str)> = data.iter().collect();
        assert_eq!(entries, vec![("a", "3"), ("b", "2")]);
    }
}
