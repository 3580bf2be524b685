//! Filename and username rules.

use crate::protocol::{USERNAME_LEN, Status};

/// Longest accepted name. The storage server keeps `.{name}.meta.tmp` next
/// to each file, and that must still fit in a 255 byte directory entry.
pub const MAX_FILENAME_LEN: usize = 245;

/// Suffixes a storage server uses for its own bookkeeping files.
pub const META_SUFFIX: &str = ".meta";
pub const BACKUP_SUFFIX: &str = ".bak";

// ',' separates file names in SS_INIT.
const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '/', '\\', ','];
const RESERVED: &[&str] = &[".", "..", "CON", "PRN", "AUX", "NUL"];

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum NameError {
    #[error("name is empty")]
    Empty,
    #[error("name is too long ({0} bytes)")]
    TooLong(usize),
    #[error("name contains forbidden character '{0}'")]
    ForbiddenChar(char),
    #[error("name contains whitespace or control characters")]
    Whitespace,
    #[error("'{0}' is a reserved name")]
    Reserved(String),
}

pub fn validate_filename(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.len() > MAX_FILENAME_LEN {
        return Err(NameError::TooLong(name.len()));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(NameError::ForbiddenChar(c));
    }
    // Arguments are space separated on the wire.
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(NameError::Whitespace);
    }
    if RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
        || name.starts_with('.')
        || name.ends_with(META_SUFFIX)
        || name.ends_with(BACKUP_SUFFIX)
    {
        return Err(NameError::Reserved(name.to_string()));
    }
    Ok(())
}

pub fn validate_username(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.len() >= USERNAME_LEN {
        return Err(NameError::TooLong(name.len()));
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(NameError::Whitespace);
    }
    if let Some(c) = name.chars().find(|c| [':', ','].contains(c)) {
        return Err(NameError::ForbiddenChar(c));
    }
    Ok(())
}

/// Shorthand for handlers that answer a bad filename with a status.
pub fn check_filename(name: &str) -> Result<(), Status> {
    validate_filename(name).map_err(|_| Status::InvalidFilename)
}
