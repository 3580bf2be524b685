//! Per-connection WRITE session.
//!
//! A connection starts without a session. `WRITE <file> <sentence>` checks
//! write access, locks the sentence and loads the file into a buffer.
//! Further `WRITE <word-index> <word>` frames edit the locked sentence in the
//! buffer, and `ETIRW` commits it and ends the connection. The lock is owned
//! by the session, so it is released however the session ends, including a
//! dropped connection.

use std::sync::Arc;

use docs_core::protocol::{Response, Status};
use docs_core::text::{self, Document, EditError};
use tracing::{debug, info};

use crate::locks::{SentenceGuard, SentenceLocks};
use crate::store::DocStore;

#[derive(Debug)]
struct OpenWrite {
    guard: SentenceGuard,
    buffer: Document,
}

#[derive(Debug)]
pub struct WriteSession {
    store: Arc<DocStore>,
    locks: Arc<SentenceLocks>,
    open: Option<OpenWrite>,
}

impl WriteSession {
    pub fn new(store: Arc<DocStore>, locks: Arc<SentenceLocks>) -> Self {
        Self {
            store,
            locks,
            open: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Handles a WRITE frame in either phase.
    pub async fn write(&mut self, user: &str, args: &str) -> Response {
        let mut parts = args.trim().splitn(2, ' ');
        let first = parts.next().unwrap_or("");
        let rest = parts.next().unwrap_or("").trim();

        if let Some(open) = self.open.as_mut() {
            return match first.parse::<usize>() {
                Ok(word_index) => edit(open, word_index, rest),
                Err(_) => Response::new(
                    Status::ConcurrentWrite,
                    format!(
                        "A write session is already open on sentence {} of '{}'",
                        open.guard.index(),
                        open.guard.file()
                    ),
                ),
            };
        }
        match rest.parse::<usize>() {
            Ok(sentence) if !first.is_empty() => self.begin(user, first, sentence).await,
            _ => Response::new(Status::InvalidArgs, "Usage: WRITE <filename> <sentence>"),
        }
    }

    async fn begin(&mut self, user: &str, file: &str, sentence: usize) -> Response {
        let meta = match self.store.meta(file).await {
            Ok(meta) => meta,
            Err(err) => return Response::new(err.status(), err.to_string()),
        };
        if !meta.access(user).can_write() {
            return Response::error(Status::WritePermission);
        }
        let buffer = match self.store.read(file).await {
            Ok(content) => Document::parse(&content),
            Err(err) => return Response::new(err.status(), err.to_string()),
        };
        if let Err(err) = buffer.check_sentence(sentence) {
            return edit_error(err);
        }
        let guard = match self.locks.lock(file, sentence, user) {
            Ok(guard) => guard,
            Err(err) => return Response::new(Status::Locked, err.to_string()),
        };

        info!("{user} opened write session on sentence {sentence} of {file}");
        let current = buffer.sentence(sentence).unwrap_or("").to_string();
        self.open = Some(OpenWrite { guard, buffer });
        Response::ok(format!("Sentence {sentence} locked: {current}"))
    }

    /// Commits the session (ETIRW). The sentence lock is released on every
    /// path out of here.
    pub async fn finish(&mut self, user: &str) -> Response {
        let Some(open) = self.open.take() else {
            return Response::new(Status::InvalidOperation, "No write session open");
        };
        let index = open.guard.index();
        let edited = open.buffer.sentence(index).unwrap_or("").to_string();
        let file = open.guard.file().to_string();

        // Other sentences may have been committed by parallel sessions since
        // this one loaded the file, so only the locked sentence is spliced
        // into the current content.
        let result = self
            .store
            .commit(&file, user, |current| {
                if edited.is_empty() {
                    current.to_string()
                } else {
                    text::splice_sentence(current, index, &edited)
                }
            })
            .await;
        drop(open);

        match result {
            Ok(meta) => {
                info!("{user} committed sentence {index} of {file}");
                Response::ok(format!(
                    "Write successful ({} words, {} chars)",
                    meta.word_count, meta.char_count
                ))
            }
            Err(err) => {
                debug!("commit of {file} failed: {err}");
                Response::new(err.status(), err.to_string())
            }
        }
    }
}

fn edit(open: &mut OpenWrite, word_index: usize, word: &str) -> Response {
    if word.is_empty() {
        return Response::new(Status::InvalidArgs, "Usage: WRITE <word-index> <word>");
    }
    let index = open.guard.index();
    match open.buffer.edit_word(index, word_index, word) {
        Ok(()) => Response::ok(open.buffer.sentence(index).unwrap_or("").to_string()),
        Err(err) => edit_error(err),
    }
}

fn edit_error(err: EditError) -> Response {
    let status = match err {
        EditError::SentenceOutOfRange { .. } => Status::SentenceOutOfRange,
        EditError::WordOutOfRange { .. } => Status::WordOutOfRange,
    };
    Response::new(status, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docs_core::acl::{Acl, Permission};

    async fn setup(content: &str) -> (tempfile::TempDir, Arc<DocStore>, Arc<SentenceLocks>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DocStore::new(dir.path()));
        store.create("r.txt", "alice").await.unwrap();
        let content = content.to_string();
        store.commit("r.txt", "alice", |_| content).await.unwrap();
        (dir, store, SentenceLocks::new())
    }

    #[tokio::test]
    async fn edit_and_commit() {
        let (_dir, store, locks) = setup("Hello world. Bye now.").await;
        let mut session = WriteSession::new(store.clone(), locks.clone());
        assert!(session.write("alice", "r.txt 1").await.is_ok());
        assert_eq!(locks.holder("r.txt", 1).as_deref(), Some("alice"));

        let resp = session.write("alice", "0 Goodbye").await;
        assert_eq!(resp.data, "Goodbye now.");
        assert!(session.write("alice", "2 friend.").await.is_ok());
        assert_eq!(
            session.write("alice", "9 x").await.status,
            Status::WordOutOfRange
        );

        assert!(session.finish("alice").await.is_ok());
        assert!(!session.is_open());
        assert!(locks.holder("r.txt", 1).is_none());
        assert_eq!(
            store.read("r.txt").await.unwrap(),
            "Hello world. Goodbye now. friend."
        );
    }

    #[tokio::test]
    async fn parallel_sessions_on_different_sentences_both_land() {
        let (_dir, store, locks) = setup("One. Two.").await;
        let mut a = WriteSession::new(store.clone(), locks.clone());
        let mut b = WriteSession::new(store.clone(), locks.clone());
        assert!(a.write("alice", "r.txt 0").await.is_ok());
        assert!(b.write("alice", "r.txt 1").await.is_ok());
        a.write("alice", "0 Uno.").await;
        b.write("alice", "0 Dos.").await;
        assert!(a.finish("alice").await.is_ok());
        assert!(b.finish("alice").await.is_ok());
        assert_eq!(store.read("r.txt").await.unwrap(), "Uno. Dos.");
    }

    #[tokio::test]
    async fn handshake_failures() {
        let (_dir, store, locks) = setup("Only one.").await;
        let mut session = WriteSession::new(store.clone(), locks.clone());
        assert_eq!(
            session.write("bob", "r.txt 0").await.status,
            Status::WritePermission
        );
        assert_eq!(
            session.write("alice", "r.txt 2").await.status,
            Status::SentenceOutOfRange
        );
        assert_eq!(
            session.write("alice", "nope.txt 0").await.status,
            Status::NotFound
        );
        assert_eq!(
            session.write("alice", "r.txt").await.status,
            Status::InvalidArgs
        );
        assert_eq!(
            session.finish("alice").await.status,
            Status::InvalidOperation
        );

        let mut acl = Acl::new();
        acl.grant("bob", Permission::WRITE);
        store.set_acl("r.txt", acl).await.unwrap();
        let mut other = WriteSession::new(store.clone(), locks.clone());
        assert!(other.write("bob", "r.txt 0").await.is_ok());
        assert_eq!(
            session.write("alice", "r.txt 0").await.status,
            Status::Locked
        );
        assert_eq!(
            other.write("bob", "r.txt 0").await.status,
            Status::ConcurrentWrite
        );
    }

    #[tokio::test]
    async fn commit_keeps_layout_of_other_sentences() {
        let (_dir, store, locks) = setup("Title line.\n\nSecond   para here.\n").await;
        let mut session = WriteSession::new(store.clone(), locks);
        assert!(session.write("alice", "r.txt 0").await.is_ok());
        session.write("alice", "0 Heading").await;
        assert!(session.finish("alice").await.is_ok());
        assert_eq!(
            store.read("r.txt").await.unwrap(),
            "Heading line.\n\nSecond   para here.\n"
        );
    }

    #[tokio::test]
    async fn failed_commit_keeps_content_and_releases_lock() {
        let (dir, store, locks) = setup("Keep me.").await;
        std::fs::remove_file(dir.path().join("r.txt.bak")).unwrap();
        let mut session = WriteSession::new(store.clone(), locks.clone());
        assert!(session.write("alice", "r.txt 0").await.is_ok());
        session.write("alice", "0 Lose").await;

        // A directory where the backup goes makes the backup rename fail.
        std::fs::create_dir(dir.path().join("r.txt.bak")).unwrap();
        let resp = session.finish("alice").await;
        assert_eq!(resp.status, Status::Internal);
        assert!(!session.is_open());
        assert!(locks.holder("r.txt", 0).is_none());
        assert_eq!(store.read("r.txt").await.unwrap(), "Keep me.");
    }

    #[tokio::test]
    async fn dropped_session_releases_lock() {
        let (_dir, store, locks) = setup("Only one.").await;
        let mut session = WriteSession::new(store, locks.clone());
        assert!(session.write("alice", "r.txt 1").await.is_ok());
        assert!(locks.holder("r.txt", 1).is_some());
        drop(session);
        assert!(locks.holder("r.txt", 1).is_none());
    }
}
