//! Single-pass tarball scanning.
//!
//! One decompressed archive stream comes in, exactly one scan goes over
//! it, and an accumulator decides which entry wins for the requested
//! target. Non-matching file bytes are drained without buffering so the
//! shared stream keeps advancing; candidates that lose the priority
//! contest have their buffers released immediately.

use std::collections::BTreeMap;
use std::io::{self, Read};

use tar::Archive;

use tarmac_core::utils::{get_content_type, get_integrity};
use tarmac_core::{ArchiveEntry, EntryKind};

/// Result of scanning one archive for a target path.
#[derive(Debug)]
pub struct ScanOutcome {
    /// Key into `entries` of the winning entry, if any
    pub found: Option<String>,
    /// Every entry matching the target prefix, plus synthesized ancestors
    pub entries: BTreeMap<String, ArchiveEntry>,
}

impl ScanOutcome {
    pub fn found_entry(&self) -> Option<&ArchiveEntry> {
        self.entries.get(self.found.as_deref()?)
    }

    /// Take ownership of the winning entry, content included
    pub fn take_found(mut self) -> Option<ArchiveEntry> {
        self.entries.remove(self.found.as_deref()?)
    }
}

/// Search one archive stream for the entry answering `filename`.
///
/// Follows node's resolution rules: an exact path match wins over
/// `{filename}.js`, which wins over `{filename}.json`; a later
/// higher-priority match replaces an earlier lower-priority one and the
/// loser's buffer is dropped at supersession time. When no file matches,
/// a directory entry of the same name (if the archive implied one) is the
/// fallback so the caller can redirect to its index file.
pub fn search_entries<R: Read>(reader: R, filename: &str) -> io::Result<ScanOutcome> {
    let js_filename = format!("{filename}.js");
    let json_filename = format!("{filename}.json");

    let mut entries: BTreeMap<String, ArchiveEntry> = BTreeMap::new();
    let mut found: Option<String> = None;

    if filename == "/" {
        entries.insert("/".to_string(), ArchiveEntry::directory("/".to_string()));
        found = Some("/".to_string());
    }

    let mut archive = Archive::new(reader);
    for tar_entry in archive.entries()? {
        let mut tar_entry = tar_entry?;
        let path = root_relative(&String::from_utf8_lossy(&tar_entry.path_bytes()));
        let entry_type = tar_entry.header().entry_type();

        if entry_type.is_dir() {
            // Explicit directory headers are rare; record the ones under
            // the target, everything else comes from synthesis.
            let dir_path = normalize_dir(&path);
            if dir_path != "/" && dir_path.starts_with(filename) {
                entries
                    .entry(dir_path.clone())
                    .or_insert_with(|| ArchiveEntry::directory(dir_path));
            }
            continue;
        }

        // Skip non-files and files that don't match the target. The tar
        // reader drains their bytes when the iterator advances.
        if !entry_type.is_file() || !path.starts_with(filename) {
            continue;
        }

        entries.insert(path.clone(), ArchiveEntry::file(path.clone()));
        synthesize_ancestors(&mut entries, &path, |_| true);

        // Allow accessing e.g. `/index.js` or `/index.json` using
        // `/index` for compatibility with npm.
        if path == filename || path == js_filename || path == json_filename {
            match &found {
                None => found = Some(path.clone()),
                Some(current) => {
                    let replaces = current != filename
                        && (path == filename
                            || (path == js_filename && *current == json_filename));
                    if replaces {
                        if let Some(loser) = entries.get_mut(current.as_str()) {
                            loser.release_content();
                        }
                        found = Some(path.clone());
                    }
                }
            }
        }

        let mut content = Vec::with_capacity(tar_entry.size() as usize);
        tar_entry.read_to_end(&mut content)?;

        let keep_content = found.as_deref() == Some(path.as_str());
        if let Some(entry) = entries.get_mut(&path) {
            fill_file_metadata(entry, &content, tar_entry.header().mtime().ok());
            if keep_content {
                entry.content = Some(content);
            }
        }
    }

    // No file matched; fall back to a directory of the same name.
    if found.is_none() && entries.contains_key(filename) {
        found = Some(filename.to_string());
    }

    Ok(ScanOutcome { found, entries })
}

/// Collect metadata for every entry inside the directory `dirname`.
///
/// Used for directory listings: file contents are never retained, only
/// their metadata, and missing directory entries are synthesized for
/// every ancestor below the target.
pub fn list_entries<R: Read>(
    reader: R,
    dirname: &str,
) -> io::Result<BTreeMap<String, ArchiveEntry>> {
    let mut entries: BTreeMap<String, ArchiveEntry> = BTreeMap::new();
    entries.insert(
        dirname.to_string(),
        ArchiveEntry::directory(dirname.to_string()),
    );

    let mut archive = Archive::new(reader);
    for tar_entry in archive.entries()? {
        let mut tar_entry = tar_entry?;
        let path = root_relative(&String::from_utf8_lossy(&tar_entry.path_bytes()));
        let entry_type = tar_entry.header().entry_type();

        synthesize_ancestors(&mut entries, &path, |dir| dir.starts_with(dirname));

        if entry_type.is_dir() {
            let dir_path = normalize_dir(&path);
            if dir_path != "/" && dir_path.starts_with(dirname) {
                entries
                    .entry(dir_path.clone())
                    .or_insert_with(|| ArchiveEntry::directory(dir_path));
            }
            continue;
        }

        if !entry_type.is_file() || !path.starts_with(dirname) {
            continue;
        }

        let mut content = Vec::with_capacity(tar_entry.size() as usize);
        tar_entry.read_to_end(&mut content)?;

        let mut entry = ArchiveEntry::file(path.clone());
        fill_file_metadata(&mut entry, &content, tar_entry.header().mtime().ok());
        entries.insert(path, entry);
    }

    Ok(entries)
}

/// Strip the archive's single top-level directory component.
///
/// Most packages wrap their files in `package/`, but the prefix is not
/// guaranteed (e.g. firebase uses `firebase_npm/`), so the first
/// component is dropped whatever it is.
fn root_relative(header_name: &str) -> String {
    match header_name.split_once('/') {
        Some((_, rest)) => format!("/{rest}"),
        None => "/".to_string(),
    }
}

/// Trim a trailing slash from a directory header path
fn normalize_dir(path: &str) -> String {
    if path.len() > 1 && path.ends_with('/') {
        path[..path.len() - 1].to_string()
    } else {
        path.to_string()
    }
}

/// `/a/b/c.js` -> `/a/b` -> `/a` -> `/`
fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(index) => &path[..index],
    }
}

/// Create directory entries for the ancestors of `path` that the archive
/// never declared. Some tarballs omit directory headers entirely, so this
/// is the brute-force method.
fn synthesize_ancestors<F>(entries: &mut BTreeMap<String, ArchiveEntry>, path: &str, wanted: F)
where
    F: Fn(&str) -> bool,
{
    let mut dir = parent_dir(path);
    while dir != "/" {
        if !entries.contains_key(dir) && wanted(dir) {
            entries.insert(dir.to_string(), ArchiveEntry::directory(dir.to_string()));
        }
        dir = parent_dir(dir);
    }
}

fn fill_file_metadata(entry: &mut ArchiveEntry, content: &[u8], mtime: Option<u64>) {
    debug_assert_eq!(entry.kind, EntryKind::File);
    entry.content_type = Some(get_content_type(&entry.path));
    entry.integrity = Some(get_integrity(content));
    entry.last_modified = mtime.map(http_date);
    entry.size = Some(content.len() as u64);
}

/// HTTP-date rendering of a tar mtime (seconds since the epoch)
fn http_date(epoch_seconds: u64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(epoch_seconds as i64, 0)
        .unwrap_or_default()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}
