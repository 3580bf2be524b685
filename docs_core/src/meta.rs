//! The `.meta` sidecar kept next to every stored file.
//!
//! The sidecar is a list of `key=value` lines:
//!
//! ```text
//! owner=alice
//! created=1760000000
//! modified=1760000000
//! accessed=1760000000
//! accessed_by=alice
//! size=12
//! word_count=2
//! char_count=12
//! access_count=1
//! access_0=bob:R
//! ```
//!
//! Timestamps are unix seconds. Unknown keys are ignored so older and newer
//! storage servers can share a directory.

use std::fmt::Write as _;

use chrono::{DateTime, Local, Utc};

use crate::acl::{Acl, AclParseError, Permission};
use crate::text;

#[derive(thiserror::Error, Debug)]
pub enum MetaParseError {
    #[error("line {0} is not key=value")]
    Malformed(usize),
    #[error("bad value for {key}: '{value}'")]
    BadValue { key: String, value: String },
    #[error(transparent)]
    Acl(#[from] AclParseError),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileMeta {
    pub owner: String,
    pub created: i64,
    pub modified: i64,
    pub accessed: i64,
    pub accessed_by: String,
    pub size: u64,
    pub word_count: usize,
    pub char_count: usize,
    pub acl: Acl,
}

pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Local-time rendering used by INFO and LIST.
pub fn format_time(secs: i64) -> String {
    match DateTime::from_timestamp(secs, 0) {
        Some(t) => t
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => "-".to_string(),
    }
}

impl FileMeta {
    pub fn new(owner: &str) -> Self {
        let t = now();
        Self {
            owner: owner.to_string(),
            created: t,
            modified: t,
            accessed: t,
            accessed_by: owner.to_string(),
            ..Default::default()
        }
    }

    pub fn access(&self, user: &str) -> Permission {
        self.acl.access(&self.owner, user)
    }

    pub fn is_owner(&self, user: &str) -> bool {
        !self.owner.is_empty() && self.owner == user
    }

    /// Recomputes size and counts after the content changed.
    pub fn update_stats(&mut self, content: &str) {
        self.size = content.len() as u64;
        self.word_count = text::word_count(content);
        self.char_count = text::char_count(content);
    }

    pub fn touch(&mut self, user: &str) {
        self.accessed = now();
        self.accessed_by = user.to_string();
    }

    pub fn to_sidecar(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(out, "owner={}", self.owner);
        let _ = writeln!(out, "created={}", self.created);
        let _ = writeln!(out, "modified={}", self.modified);
        let _ = writeln!(out, "accessed={}", self.accessed);
        let _ = writeln!(out, "accessed_by={}", self.accessed_by);
        let _ = writeln!(out, "size={}", self.size);
        let _ = writeln!(out, "word_count={}", self.word_count);
        let _ = writeln!(out, "char_count={}", self.char_count);
        let _ = writeln!(out, "access_count={}", self.acl.len());
        for (i, entry) in self.acl.entries().iter().enumerate() {
            let _ = writeln!(out, "access_{i}={}:{}", entry.user, entry.perm.code());
        }
        out
    }

    pub fn parse(text: &str) -> Result<Self, MetaParseError> {
        let mut meta = FileMeta::default();
        let mut grants = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or(MetaParseError::Malformed(lineno + 1))?;
            match key {
                "owner" => meta.owner = value.to_string(),
                "created" => meta.created = number(key, value)?,
                "modified" => meta.modified = number(key, value)?,
                "accessed" => meta.accessed = number(key, value)?,
                "accessed_by" => meta.accessed_by = value.to_string(),
                "size" => meta.size = number(key, value)?,
                "word_count" => meta.word_count = number(key, value)?,
                "char_count" => meta.char_count = number(key, value)?,
                "access_count" => {}
                k if k.starts_with("access_") => grants.push(value),
                _ => {}
            }
        }
        for grant in grants {
            let acl = Acl::parse(grant)?;
            for entry in acl.entries() {
                if entry.user != meta.owner {
                    meta.acl.grant(&entry.user, entry.perm);
                }
            }
        }
        Ok(meta)
    }
}

fn number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, MetaParseError> {
    value.trim().parse().map_err(|_| MetaParseError::BadValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_round_trip_keeps_acl_order() {
        let mut meta = FileMeta::new("alice");
        meta.update_stats("Hello world. Bye!");
        meta.acl.grant("carol", Permission::WRITE);
        meta.acl.grant("bob", Permission::READ);
        let parsed = FileMeta::parse(&meta.to_sidecar()).unwrap();
        assert_eq!(parsed, meta);
        assert_eq!(parsed.word_count, 3);
        assert_eq!(parsed.acl.entries()[0].user, "carol");
    }

    #[test]
    fn owner_line_in_acl_is_dropped() {
        let text = "owner=alice\naccess_count=2\naccess_0=alice:RW\naccess_1=bob:R\n";
        let meta = FileMeta::parse(text).unwrap();
        assert_eq!(meta.acl.len(), 1);
        assert_eq!(meta.access("alice"), Permission::all());
        assert_eq!(meta.access("bob"), Permission::READ);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let meta = FileMeta::parse("owner=bob\nflavour=vanilla\n").unwrap();
        assert_eq!(meta.owner, "bob");
    }

    #[test]
    fn bad_numbers_are_rejected() {
        assert!(matches!(
            FileMeta::parse("size=big\n"),
            Err(MetaParseError::BadValue { .. })
        ));
        assert!(matches!(
            FileMeta::parse("nonsense\n"),
            Err(MetaParseError::Malformed(1))
        ));
    }
}
