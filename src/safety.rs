//! Path safety for extraction.
//!
//! [`WindowsNameTransform`] turns a stored member name into a host path
//! under an extraction directory. It is the only place where `..` segments
//! are judged: a name whose resolved path would leave the base directory is
//! rejected with [`Error::InvalidName`] unless parent traversal is
//! explicitly allowed.
//!
//! # Security
//!
//! Path traversal attacks occur when an archive contains entries such as
//! `../../../etc/passwd` that could escape the intended extraction
//! directory. Keep `allow_parent_traversal` off for untrusted archives.
//!
//! # Examples
//!
//! ```rust
//! use std::path::Path;
//! use zipwright::safety::WindowsNameTransform;
//!
//! let t = WindowsNameTransform::with_base_directory("/extract");
//! assert_eq!(t.transform_file("dir/a.txt").unwrap(), Path::new("/extract/dir/a.txt"));
//! assert!(t.transform_file("../escape.txt").is_err());
//! ```

use std::path::{Path, PathBuf};

use crate::archive_path::{collapse_separators, strip_root};
use crate::{Error, Result};

/// Default maximum path length, matching Windows `MAX_PATH`.
pub const DEFAULT_MAX_PATH: usize = 260;

/// Windows reserved device names that cannot be used as filenames.
///
/// These are reserved case-insensitively, also when followed by an
/// extension (`CON.txt`). They are neutralised on all platforms so archives
/// extract the same way everywhere.
const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn is_windows_reserved(name: &str) -> bool {
    let base = match name.find('.') {
        Some(pos) => &name[..pos],
        None => name,
    };
    WINDOWS_RESERVED_NAMES
        .iter()
        .any(|reserved| base.eq_ignore_ascii_case(reserved))
}

fn is_invalid_file_char(c: char) -> bool {
    c.is_control() || matches!(c, '"' | '<' | '>' | '|' | ':' | '*' | '?')
}

/// Characters that may not be used as the replacement.
const FORBIDDEN_REPLACEMENTS: &[char] = &['*', '?', ':', '/', '\\'];

/// Maps member names to extraction paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowsNameTransform {
    base_directory: Option<PathBuf>,
    replacement: char,
    trim_incoming_paths: bool,
    max_path: usize,
    allow_parent_traversal: bool,
}

impl Default for WindowsNameTransform {
    fn default() -> Self {
        Self {
            base_directory: None,
            replacement: '_',
            trim_incoming_paths: false,
            max_path: DEFAULT_MAX_PATH,
            allow_parent_traversal: false,
        }
    }
}

impl WindowsNameTransform {
    /// Creates a transform without a base directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transform rooted at `base`.
    pub fn with_base_directory(base: impl Into<PathBuf>) -> Self {
        Self {
            base_directory: Some(base.into()),
            ..Self::default()
        }
    }

    /// Allows `..` segments to escape the base directory.
    pub fn allow_parent_traversal(mut self, allow: bool) -> Self {
        self.allow_parent_traversal = allow;
        self
    }

    /// Returns `true` if `..` segments may escape the base directory.
    pub fn is_parent_traversal_allowed(&self) -> bool {
        self.allow_parent_traversal
    }

    /// The base directory.
    pub fn base_directory(&self) -> Option<&Path> {
        self.base_directory.as_deref()
    }

    /// Sets or clears the base directory.
    pub fn set_base_directory(&mut self, base: Option<PathBuf>) {
        self.base_directory = base;
    }

    /// The character substituted for invalid characters.
    pub fn replacement(&self) -> char {
        self.replacement
    }

    /// Sets the replacement character.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for `* ? : / \` and for any other
    /// character that is itself invalid in a file name.
    pub fn set_replacement(&mut self, replacement: char) -> Result<()> {
        if FORBIDDEN_REPLACEMENTS.contains(&replacement) || is_invalid_file_char(replacement) {
            return Err(Error::InvalidArgument(format!(
                "'{replacement}' cannot be used as a replacement character"
            )));
        }
        self.replacement = replacement;
        Ok(())
    }

    /// Returns `true` if only the final name component is kept.
    pub fn trim_incoming_paths(&self) -> bool {
        self.trim_incoming_paths
    }

    /// Keep only the final name component of incoming names.
    pub fn set_trim_incoming_paths(&mut self, trim: bool) {
        self.trim_incoming_paths = trim;
    }

    /// Maximum length of a cleaned name.
    pub fn max_path(&self) -> usize {
        self.max_path
    }

    /// Sets the maximum length of a cleaned name.
    pub fn set_max_path(&mut self, max_path: usize) {
        self.max_path = max_path;
    }

    /// Transforms a file name into a host path.
    ///
    /// # Errors
    ///
    /// - [`Error::NameTooLong`] if the cleaned name exceeds `max_path`.
    /// - [`Error::InvalidName`] if the name resolves outside the base
    ///   directory and traversal is not allowed.
    pub fn transform_file(&self, name: &str) -> Result<PathBuf> {
        let segments = self.clean_segments(name)?;
        let resolved = self.resolve(name, segments)?;
        let mut path = self.base_directory.clone().unwrap_or_default();
        for segment in resolved {
            path.push(segment);
        }
        Ok(path)
    }

    /// Transforms a directory name into a host path.
    ///
    /// Trailing separators are ignored.
    pub fn transform_directory(&self, name: &str) -> Result<PathBuf> {
        let trimmed = name.trim_end_matches(['/', '\\']);
        self.transform_file(trimmed)
    }

    /// Cleans a name into `/`-separated form with invalid characters and
    /// reserved device names replaced.
    pub fn make_valid_name(&self, name: &str) -> Result<String> {
        Ok(self.clean_segments(name)?.join("/"))
    }

    /// Returns `true` if `name` is already a valid relative file name.
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty()
            && !name.starts_with(['/', '\\'])
            && !name.chars().any(is_invalid_file_char)
            && !name
                .split(['/', '\\'])
                .any(|segment| segment == ".." || is_windows_reserved(segment))
    }

    fn clean_segments(&self, name: &str) -> Result<Vec<String>> {
        let normalized = name.replace('\\', "/");
        let collapsed = collapse_separators(strip_root(&normalized));
        if collapsed.len() > self.max_path {
            return Err(Error::NameTooLong {
                length: collapsed.len(),
                max: self.max_path,
            });
        }
        let mut segments: Vec<String> = collapsed
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .map(|s| self.clean_segment(s))
            .collect();
        if self.trim_incoming_paths {
            let last = segments.pop();
            segments.clear();
            segments.extend(last);
        }
        Ok(segments)
    }

    fn clean_segment(&self, segment: &str) -> String {
        if segment == ".." {
            return segment.to_string();
        }
        let mut cleaned: String = segment
            .chars()
            .map(|c| {
                if is_invalid_file_char(c) {
                    self.replacement
                } else {
                    c
                }
            })
            .collect();
        if is_windows_reserved(&cleaned) {
            cleaned.insert(0, self.replacement);
        }
        cleaned
    }

    fn resolve(&self, name: &str, segments: Vec<String>) -> Result<Vec<String>> {
        if self.allow_parent_traversal {
            return Ok(segments);
        }
        let mut resolved: Vec<String> = Vec::with_capacity(segments.len());
        for segment in segments {
            if segment == ".." {
                if resolved.pop().is_none() {
                    return Err(Error::invalid_name(
                        name,
                        "resolves outside the extraction directory",
                    ));
                }
            } else {
                resolved.push(segment);
            }
        }
        Ok(resolved)
    }
}
