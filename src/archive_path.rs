//! Normalisation of member names stored in an archive.
//!
//! ZIP member names always use forward slashes and are relative. Names coming
//! from the host (file system paths, user input) are cleaned by
//! [`ZipNameTransform`] before they reach a header:
//!
//! - backslashes become `/`,
//! - an optional trim prefix is removed case-insensitively,
//! - drive letters (`C:`), UNC `//server/share/` prefixes and leading
//!   slashes are stripped,
//! - repeated slashes collapse,
//! - characters that are invalid in entry names become `_`.
//!
//! Relative segments such as `..` are kept; they are blocked when extracting
//! (see [`crate::safety::WindowsNameTransform`]).

use crate::{Error, Result};

/// Maximum length of a member name in bytes.
pub const MAX_NAME_LENGTH: usize = 0xFFFF;

/// Returns `true` for characters that may not appear in a stored name.
fn is_invalid_entry_char(c: char) -> bool {
    c.is_control() || matches!(c, '"' | '<' | '>' | '|' | ':' | '*' | '?')
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Removes the root of a slash-normalised path: a UNC `//server/share/`
/// prefix, a drive letter and any leading slashes.
pub(crate) fn strip_root(path: &str) -> &str {
    let mut rest = path;
    let unc = rest.len() > 2 && rest.starts_with("//") && !rest[2..].starts_with('/');
    if unc {
        let mut parts = rest[2..].splitn(3, '/');
        parts.next();
        parts.next();
        rest = parts.next().unwrap_or("");
    } else {
        let bytes = rest.as_bytes();
        if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            rest = &rest[2..];
        }
    }
    rest.trim_start_matches('/')
}

/// Collapses runs of `/` into a single separator.
pub(crate) fn collapse_separators(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut previous_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !previous_slash {
                out.push(c);
            }
            previous_slash = true;
        } else {
            out.push(c);
            previous_slash = false;
        }
    }
    out
}

/// Cleans host paths into valid ZIP member names.
///
/// # Examples
///
/// ```
/// use zipwright::ZipNameTransform;
///
/// let t = ZipNameTransform::new();
/// assert_eq!(t.transform_file("C:\\absolute\\file2").unwrap(), "absolute/file2");
/// assert_eq!(t.transform_directory("dir").unwrap(), "dir/");
///
/// let t = ZipNameTransform::with_trim_prefix("/Slippery");
/// assert_eq!(t.transform_file("/slippery/Pongo/File").unwrap(), "Pongo/File");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZipNameTransform {
    trim_prefix: Option<String>,
}

impl ZipNameTransform {
    /// Creates a transform without a trim prefix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transform that removes `prefix` from incoming names.
    pub fn with_trim_prefix(prefix: impl Into<String>) -> Self {
        let mut t = Self::default();
        t.set_trim_prefix(Some(prefix.into()));
        t
    }

    /// The trim prefix, slash-normalised.
    pub fn trim_prefix(&self) -> Option<&str> {
        self.trim_prefix.as_deref()
    }

    /// Sets or clears the trim prefix.
    pub fn set_trim_prefix(&mut self, prefix: Option<String>) {
        self.trim_prefix = prefix
            .map(|p| p.replace('\\', "/"))
            .filter(|p| !p.is_empty());
    }

    fn trimmed<'a>(&self, name: &'a str) -> &'a str {
        match &self.trim_prefix {
            Some(prefix) if starts_with_ignore_case(name, prefix) => {
                let rest = &name[prefix.len()..];
                if rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/') {
                    rest
                } else {
                    name
                }
            }
            _ => name,
        }
    }

    /// Transforms a file name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NameTooLong`] if the cleaned name exceeds 65535
    /// bytes.
    pub fn transform_file(&self, name: &str) -> Result<String> {
        let normalized = name.replace('\\', "/");
        Self::make_valid_name(self.trimmed(&normalized), '_')
    }

    /// Transforms a directory name, ensuring exactly one trailing `/`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NameTooLong`] if the cleaned name exceeds 65535
    /// bytes before the separator is appended, and
    /// [`Error::InvalidName`] if nothing is left after cleaning.
    pub fn transform_directory(&self, name: &str) -> Result<String> {
        let mut cleaned = self.transform_file(name)?;
        while cleaned.ends_with('/') {
            cleaned.pop();
        }
        if cleaned.is_empty() {
            return Err(Error::invalid_name(name, "empty directory name"));
        }
        cleaned.push('/');
        Ok(cleaned)
    }

    /// Strips the root, collapses separators and replaces invalid
    /// characters with `replacement`.
    pub fn make_valid_name(name: &str, replacement: char) -> Result<String> {
        let normalized = name.replace('\\', "/");
        let relative = strip_root(&normalized);
        if relative.len() > MAX_NAME_LENGTH {
            return Err(Error::NameTooLong {
                length: relative.len(),
                max: MAX_NAME_LENGTH,
            });
        }
        let cleaned: String = collapse_separators(relative)
            .chars()
            .map(|c| if is_invalid_entry_char(c) { replacement } else { c })
            .collect();
        if cleaned.len() > MAX_NAME_LENGTH {
            return Err(Error::NameTooLong {
                length: cleaned.len(),
                max: MAX_NAME_LENGTH,
            });
        }
        Ok(cleaned)
    }

    /// Returns `true` if `name` can be stored without transformation.
    ///
    /// Valid names contain no invalid characters or backslashes and do not
    /// start with `/`.
    pub fn is_valid_name(name: &str) -> bool {
        !name.starts_with('/') && !name.chars().any(|c| c == '\\' || is_invalid_entry_char(c))
    }

    /// Like [`is_valid_name`](Self::is_valid_name) but also accepts an
    /// absolute name.
    pub fn is_valid_name_relaxed(name: &str) -> bool {
        !name.chars().any(|c| c == '\\' || is_invalid_entry_char(c))
    }
}
