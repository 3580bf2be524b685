//! Text rendered for VIEW, LIST and INFO.

use std::fmt::Write as _;

use docs_core::meta::format_time;

use crate::directory::{FileDirectory, FileRecord};
use crate::registry::ClientRegistry;

#[derive(Debug, Default, PartialEq, Eq)]
struct ViewFlags {
    all: bool,
    long: bool,
}

fn view_flags(args: &str) -> ViewFlags {
    let mut flags = ViewFlags::default();
    for token in args.split_whitespace().filter(|t| t.starts_with('-')) {
        flags.all |= token.contains('a');
        flags.long |= token.contains('l');
    }
    flags
}

/// VIEW: files `user` can read, or every file with `-a`. `-l` adds the
/// user's permission, owner and counts; counts of unreadable files are
/// shown as `-`.
pub(super) fn view(directory: &FileDirectory, user: &str, args: &str) -> String {
    let flags = view_flags(args);
    let records: Vec<_> = directory
        .records()
        .into_iter()
        .filter(|r| flags.all || r.meta.access(user).can_read())
        .collect();
    if records.is_empty() {
        return "No files available.\n".to_string();
    }

    let mut out = String::new();
    if flags.long {
        let _ = writeln!(
            out,
            "{:<12} {:<14} {:<30} {:>8} {:>8}",
            "Permissions", "Owner", "Filename", "Words", "Chars"
        );
        let _ = writeln!(out, "{}", "-".repeat(76));
        for record in records {
            let perm = record.meta.access(user);
            let (words, chars) = if perm.can_read() {
                (
                    record.meta.word_count.to_string(),
                    record.meta.char_count.to_string(),
                )
            } else {
                ("-".to_string(), "-".to_string())
            };
            let owner = if record.meta.owner.is_empty() {
                "?"
            } else {
                record.meta.owner.as_str()
            };
            let _ = writeln!(
                out,
                "{:<12} {:<14} {:<30} {:>8} {:>8}",
                perm.columns(),
                owner,
                record.name,
                words,
                chars
            );
        }
    } else {
        out.push_str("Files:\n");
        for record in records {
            let _ = writeln!(out, "  {}", record.name);
        }
    }
    out
}

/// LIST: users with an open connection.
pub(super) fn users(clients: &ClientRegistry) -> String {
    let active = clients.active();
    if active.is_empty() {
        return "No users currently connected.\n".to_string();
    }
    let mut out = String::new();
    for (i, client) in active.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} (connected from {} at {})",
            i + 1,
            client.username,
            client.address,
            format_time(client.connected_at)
        );
    }
    out
}

pub(super) fn info(record: &FileRecord) -> String {
    let meta = &record.meta;
    let mut out = String::from("File Information:\n");
    let _ = writeln!(out, "  Name: {}", record.name);
    let _ = writeln!(out, "  Owner: {}", meta.owner);
    let _ = writeln!(out, "  Size: {} bytes", meta.size);
    let _ = writeln!(out, "  Word Count: {}", meta.word_count);
    let _ = writeln!(out, "  Character Count: {}", meta.char_count);
    let _ = writeln!(out, "  Created: {}", format_time(meta.created));
    let _ = writeln!(out, "  Last Modified: {}", format_time(meta.modified));
    let _ = writeln!(
        out,
        "  Last Accessed: {} by {}",
        format_time(meta.accessed),
        meta.accessed_by
    );
    out.push_str("  Access Control:\n");
    if !meta.owner.is_empty() {
        let _ = writeln!(out, "    {}: RW- (owner)", meta.owner);
    }
    for entry in meta.acl.entries() {
        let _ = writeln!(out, "    {}: {}", entry.user, entry.perm.columns());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use docs_core::FileMeta;
    use docs_core::acl::Permission;

    fn directory() -> FileDirectory {
        let mut dir = FileDirectory::new();
        let mut shared = FileMeta::new("alice");
        shared.acl.grant("bob", Permission::READ);
        shared.word_count = 3;
        dir.insert(FileRecord {
            name: "shared.txt".into(),
            node: 1,
            meta: shared,
        });
        dir.insert(FileRecord {
            name: "private.txt".into(),
            node: 1,
            meta: FileMeta::new("alice"),
        });
        dir
    }

    #[test]
    fn flags_combine() {
        assert_eq!(view_flags("-al"), ViewFlags { all: true, long: true });
        assert_eq!(view_flags("-a -l"), ViewFlags { all: true, long: true });
        assert_eq!(view_flags(""), ViewFlags::default());
    }

    #[test]
    fn view_hides_unreadable_files_without_all() {
        let dir = directory();
        assert_eq!(view(&dir, "bob", ""), "Files:\n  shared.txt\n");
        assert_eq!(
            view(&dir, "bob", "-a"),
            "Files:\n  private.txt\n  shared.txt\n"
        );
        assert_eq!(view(&dir, "carol", ""), "No files available.\n");
    }

    #[test]
    fn long_view_masks_counts() {
        let dir = directory();
        let out = view(&dir, "bob", "-al");
        let private = out.lines().find(|l| l.contains("private.txt")).unwrap();
        let shared = out.lines().find(|l| l.contains("shared.txt")).unwrap();
        assert!(private.starts_with("---"));
        assert!(private.trim_end().ends_with('-'));
        assert!(shared.starts_with("R--"));
        assert!(shared.contains(" 3 "));
    }

    #[test]
    fn empty_user_list() {
        assert_eq!(
            users(&ClientRegistry::new()),
            "No users currently connected.\n"
        );
    }

    #[test]
    fn info_lists_owner_and_grants() {
        let dir = directory();
        let record = dir.lookup("shared.txt").unwrap();
        let out = info(&record);
        assert!(out.contains("  Owner: alice\n"));
        assert!(out.contains("    alice: RW- (owner)\n"));
        assert!(out.contains("    bob: R--\n"));
    }
}
