//! Per-file access control lists.
//!
//! The owner of a file is never stored in its ACL; it implicitly holds
//! read and write access.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Permission: u8 {
        const READ = 0b01;
        const WRITE = 0b10;
    }
}

impl Permission {
    pub fn can_read(self) -> bool {
        self.contains(Permission::READ)
    }

    pub fn can_write(self) -> bool {
        self.contains(Permission::WRITE)
    }

    /// Wire form used in serialized ACLs. Write implies read, so a
    /// write-only entry is written as `RW`.
    pub fn code(self) -> &'static str {
        if self.can_write() {
            "RW"
        } else if self.can_read() {
            "R"
        } else {
            "-"
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "R" => Some(Permission::READ),
            "RW" | "W" => Some(Permission::READ | Permission::WRITE),
            "-" => Some(Permission::empty()),
            _ => None,
        }
    }

    /// Three-column form shown in listings, e.g. `RW-`.
    pub fn columns(self) -> String {
        format!(
            "{}{}-",
            if self.can_read() { 'R' } else { '-' },
            if self.can_write() { 'W' } else { '-' }
        )
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum AclParseError {
    #[error("malformed ACL entry '{0}', expected user:PERM")]
    Malformed(String),
    #[error("unknown permission '{perm}' for user '{user}'")]
    UnknownPermission { user: String, perm: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclEntry {
    pub user: String,
    pub perm: Permission,
}

/// Ordered list of grants, unique by username.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Acl {
    entries: Vec<AclEntry>,
}

impl Acl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[AclEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, user: &str) -> Option<Permission> {
        self.entries.iter().find(|e| e.user == user).map(|e| e.perm)
    }

    /// Effective permission of `user` on a file owned by `owner`.
    pub fn access(&self, owner: &str, user: &str) -> Permission {
        if !owner.is_empty() && owner == user {
            return Permission::all();
        }
        self.get(user).unwrap_or_default()
    }

    /// ORs `perm` into the user's entry, creating it if needed. Granting
    /// write also grants read; existing bits are never removed.
    pub fn grant(&mut self, user: &str, perm: Permission) {
        let perm = if perm.can_write() {
            perm | Permission::READ
        } else {
            perm
        };
        match self.entries.iter_mut().find(|e| e.user == user) {
            Some(entry) => entry.perm |= perm,
            None => self.entries.push(AclEntry {
                user: user.to_string(),
                perm,
            }),
        }
    }

    /// Removes the user's entry. Returns false if there was none.
    pub fn revoke(&mut self, user: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.user != user);
        self.entries.len() != before
    }

    /// Parses `user:PERM,user:PERM`. An empty string is an empty ACL and
    /// repeated users are merged.
    pub fn parse(s: &str) -> Result<Self, AclParseError> {
        let mut acl = Acl::new();
        for item in s.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            let (user, perm) = item
                .rsplit_once(':')
                .ok_or_else(|| AclParseError::Malformed(item.to_string()))?;
            if user.is_empty() {
                return Err(AclParseError::Malformed(item.to_string()));
            }
            let perm = Permission::from_code(perm).ok_or_else(|| {
                AclParseError::UnknownPermission {
                    user: user.to_string(),
                    perm: perm.to_string(),
                }
            })?;
            acl.grant(user, perm);
        }
        Ok(acl)
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}:{}", entry.user, entry.perm.code())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_never_downgrades() {
        let mut acl = Acl::new();
        acl.grant("bob", Permission::WRITE);
        acl.grant("bob", Permission::READ);
        assert_eq!(acl.get("bob"), Some(Permission::READ | Permission::WRITE));
        assert_eq!(acl.len(), 1);
    }

    #[test]
    fn owner_has_full_access_without_entry() {
        let acl = Acl::new();
        assert_eq!(acl.access("alice", "alice"), Permission::all());
        assert!(acl.access("alice", "bob").is_empty());
        assert!(acl.access("", "").is_empty());
    }

    #[test]
    fn serialized_form() {
        let mut acl = Acl::new();
        acl.grant("bob", Permission::READ);
        acl.grant("carol", Permission::WRITE);
        acl.grant("dave", Permission::empty());
        let text = acl.to_string();
        assert_eq!(text, "bob:R,carol:RW,dave:-");
        assert_eq!(Acl::parse(&text).unwrap(), acl);
        assert_eq!(Acl::parse("").unwrap(), Acl::new());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            Acl::parse("bob"),
            Err(AclParseError::Malformed(_))
        ));
        assert!(matches!(
            Acl::parse("bob:X"),
            Err(AclParseError::UnknownPermission { .. })
        ));
    }

    #[test]
    fn revoke_reports_missing_user() {
        let mut acl = Acl::parse("bob:R").unwrap();
        assert!(!acl.revoke("carol"));
        assert!(acl.revoke("bob"));
        assert!(acl.is_empty());
    }

    #[test]
    fn columns() {
        assert_eq!((Permission::READ | Permission::WRITE).columns(), "RW-");
        assert_eq!(Permission::READ.columns(), "R--");
        assert_eq!(Permission::empty().columns(), "---");
    }
}
