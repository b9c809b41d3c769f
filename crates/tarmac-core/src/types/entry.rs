//! Entries discovered while scanning a package archive.

use serde::Serialize;

/// File or directory record inside an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One file or directory discovered while scanning an archive stream.
///
/// Directory entries carry only `path` and `kind`; they are usually
/// synthesized because tarballs often omit explicit directory headers.
/// File content is retained only for the entry selected as the response,
/// and released as soon as an entry loses a priority contest.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntry {
    /// Archive-root-relative path with a leading slash, e.g. `/index.js`
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip)]
    pub content: Option<Vec<u8>>,
}

impl ArchiveEntry {
    /// A directory entry carrying no file metadata
    pub fn directory(path: String) -> Self {
        Self {
            path,
            kind: EntryKind::Directory,
            content_type: None,
            integrity: None,
            last_modified: None,
            size: None,
            content: None,
        }
    }

    /// A file entry; metadata is filled in after its bytes are buffered
    pub fn file(path: String) -> Self {
        Self {
            path,
            kind: EntryKind::File,
            content_type: None,
            integrity: None,
            last_modified: None,
            size: None,
            content: None,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Drop the buffered content, keeping the metadata.
    ///
    /// Called at supersession time so peak memory stays bounded by the
    /// single winning candidate.
    pub fn release_content(&mut self) {
        self.content = None;
    }
}
