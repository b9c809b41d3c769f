//! Content-type detection for archive entries.

use once_cell::sync::Lazy;
use regex::Regex;

/// Dotfiles and lockfiles that should be served as plain text
static TEXT_FILES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\.[a-z]*rc|\.git[a-z]*|\.[a-z]*ignore|\.lock)$").unwrap());

/// Extensionless or unusual names that are still text
const TEXT_NAMES: &[&str] = &[
    "authors", "changes", "license", "licence", "makefile", "patents", "readme",
];

/// Extensions mime_guess maps elsewhere (or not at all) that we force to text
const TEXT_EXTENSIONS: &[&str] = &["ts", "flow", "lock"];

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Guess the content type of a file from its name.
///
/// Dotfiles like `.gitignore`/`.npmrc` and lockfiles override to
/// `text/plain` so browsers render them inline.
pub fn get_content_type(path: &str) -> String {
    let name = basename(path);

    if TEXT_FILES.is_match(name) {
        return "text/plain".to_string();
    }

    let stem = name.split('.').next().unwrap_or(name);
    if name.split('.').count() == 1 && TEXT_NAMES.contains(&stem.to_lowercase().as_str()) {
        return "text/plain".to_string();
    }

    if let Some(ext) = name.rsplit_once('.').map(|(_, e)| e) {
        if TEXT_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
            return "text/plain".to_string();
        }
    }

    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or("text/plain")
        .to_string()
}

/// The `Content-Type` header value, with an explicit charset for JavaScript.
pub fn content_type_header(content_type: &str) -> String {
    if content_type == "application/javascript" || content_type == "text/javascript" {
        format!("{content_type}; charset=utf-8")
    } else {
        content_type.to_string()
    }
}
