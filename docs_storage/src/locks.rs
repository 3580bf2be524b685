//! Sentence-granular write locks shared by all client connections of one
//! storage server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum LockError {
    #[error("Sentence {index} of '{file}' is locked by {holder}")]
    Held {
        file: String,
        index: usize,
        holder: String,
    },
}

type LockKey = (String, usize);

/// At most one holder per (file, sentence). Locks never expire; they are
/// released by their session, either explicitly or when its guard drops.
#[derive(Debug, Default)]
pub struct SentenceLocks {
    held: Mutex<HashMap<LockKey, String>>,
}

impl SentenceLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn held(&self) -> MutexGuard<'_, HashMap<LockKey, String>> {
        // The map stays consistent even if a holder panicked mid-call.
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Takes the lock for `user`. Re-acquiring a lock one already holds
    /// succeeds.
    pub fn acquire(&self, file: &str, index: usize, user: &str) -> Result<(), LockError> {
        let mut held = self.held();
        match held.get(&(file.to_string(), index)) {
            Some(holder) if holder == user => Ok(()),
            Some(holder) => Err(LockError::Held {
                file: file.to_string(),
                index,
                holder: holder.clone(),
            }),
            None => {
                held.insert((file.to_string(), index), user.to_string());
                debug!("{user} locked sentence {index} of {file}");
                Ok(())
            }
        }
    }

    /// Releases the lock if `user` holds it. Returns false when there was
    /// nothing to release.
    pub fn release(&self, file: &str, index: usize, user: &str) -> bool {
        let mut held = self.held();
        let key = (file.to_string(), index);
        if held.get(&key).is_some_and(|holder| holder == user) {
            held.remove(&key);
            debug!("{user} released sentence {index} of {file}");
            true
        } else {
            warn!("{user} released sentence {index} of {file} without holding it");
            false
        }
    }

    pub fn holder(&self, file: &str, index: usize) -> Option<String> {
        self.held().get(&(file.to_string(), index)).cloned()
    }

    /// Acquires a lock that is released when the returned guard drops.
    pub fn lock(
        self: &Arc<Self>,
        file: &str,
        index: usize,
        user: &str,
    ) -> Result<SentenceGuard, LockError> {
        self.acquire(file, index, user)?;
        Ok(SentenceGuard {
            locks: Arc::clone(self),
            file: file.to_string(),
            index,
            user: user.to_string(),
        })
    }
}

#[derive(Debug)]
pub struct SentenceGuard {
    locks: Arc<SentenceLocks>,
    file: String,
    index: usize,
    user: String,
}

impl SentenceGuard {
    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn user(&self) -> &str {
        &self.user
    }
}

impl Drop for SentenceGuard {
    fn drop(&mut self) {
        self.locks.release(&self.file, self.index, &self.user);
    }
}
