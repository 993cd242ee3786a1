//! Credential persistence.
//!
//! The manager persists a whole session record or nothing: partial pairs are
//! never written, and a partial or unreadable record reads back as absent.
//! Storage failures therefore degrade to "signed out", never to a broken
//! half-session.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::{CredentialPair, UserProfile};

/// One persisted session record.
///
/// The field names match the wire contract (`accessToken`, `refreshToken`,
/// `expiresAt`, `user`), so a stored document is readable next to server
/// traffic in a debugger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub user: UserProfile,
}

impl StoredSession {
    pub(crate) fn new(pair: &CredentialPair, profile: &UserProfile) -> Self {
        Self {
            access_token: pair.access_token.clone(),
            refresh_token: pair.refresh_token.clone(),
            expires_at: pair.expires_at,
            user: profile.clone(),
        }
    }

    /// Split back into the in-memory representation.
    #[must_use]
    pub fn into_parts(self) -> (CredentialPair, UserProfile) {
        (
            CredentialPair {
                access_token: self.access_token,
                refresh_token: self.refresh_token,
                expires_at: self.expires_at,
            },
            self.user,
        )
    }
}

/// Consumer-pluggable persistence for the current session.
///
/// All operations are synchronous and infallible from the caller's point of
/// view: a backend that cannot read or decode its record reports absence
/// instead of erroring, and `set` must be atomic with respect to readers
/// (a reader never observes a half-written record).
///
/// # Example
///
/// ```rust,ignore
/// impl CredentialStore for MyKeyring {
///     fn get(&self) -> Option<StoredSession> {
///         let raw = self.entry("finbank-session").read().ok()?;
///         serde_json::from_slice(&raw).ok()
///     }
///
///     fn set(&self, pair: &CredentialPair, profile: &UserProfile) {
///         let record = StoredSession::new(pair, profile);
///         // write the whole record in one operation
///     }
///
///     fn clear(&self) {
///         let _ = self.entry("finbank-session").delete();
///     }
/// }
/// ```
pub trait CredentialStore: Send + Sync + 'static {
    /// Current record, if one is fully present.
    fn get(&self) -> Option<StoredSession>;

    /// Atomically replace the record with the given pair and profile.
    fn set(&self, pair: &CredentialPair, profile: &UserProfile);

    /// Remove the record. Removing an absent record is a no-op.
    fn clear(&self);
}

/// Process-lifetime store; the default when no persistence is wanted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: parking_lot::Mutex<Option<StoredSession>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self) -> Option<StoredSession> {
        self.record.lock().clone()
    }

    fn set(&self, pair: &CredentialPair, profile: &UserProfile) {
        *self.record.lock() = Some(StoredSession::new(pair, profile));
    }

    fn clear(&self) {
        *self.record.lock() = None;
    }
}

/// File-backed store: one JSON document at a caller-supplied path.
///
/// Writes go to a sibling temp file which is renamed over the target, so a
/// reader (including a crashed-and-restarted process) never sees a torn
/// record. A corrupt or unreadable file reads back as absent.
#[cfg(feature = "file-store")]
pub use file::FileStore;

#[cfg(feature = "file-store")]
mod file {
    use std::path::PathBuf;

    use super::{CredentialStore, StoredSession};
    use crate::types::{CredentialPair, UserProfile};

    #[derive(Debug)]
    pub struct FileStore {
        path: PathBuf,
        lock: parking_lot::Mutex<()>,
    }

    impl FileStore {
        /// Store backed by the given file path. The file is created on the
        /// first `set`; parent directories must already exist.
        #[must_use]
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self {
                path: path.into(),
                lock: parking_lot::Mutex::new(()),
            }
        }

        fn read_record(&self) -> Option<StoredSession> {
            let bytes = std::fs::read(&self.path).ok()?;
            serde_json::from_slice(&bytes).ok()
        }

        fn write_record(&self, record: &StoredSession) {
            let Ok(bytes) = serde_json::to_vec_pretty(record) else {
                return;
            };
            let tmp = self.path.with_extension("tmp");
            if let Err(err) = std::fs::write(&tmp, bytes) {
                tracing::warn!(error = %err, path = %tmp.display(), "session record write failed");
                return;
            }
            if let Err(err) = std::fs::rename(&tmp, &self.path) {
                tracing::warn!(error = %err, path = %self.path.display(), "session record rename failed");
            }
        }
    }

    impl CredentialStore for FileStore {
        fn get(&self) -> Option<StoredSession> {
            let _guard = self.lock.lock();
            self.read_record()
        }

        fn set(&self, pair: &CredentialPair, profile: &UserProfile) {
            let _guard = self.lock.lock();
            self.write_record(&StoredSession::new(pair, profile));
        }

        fn clear(&self) {
            let _guard = self.lock.lock();
            if let Err(err) = std::fs::remove_file(&self.path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(error = %err, "session record removal failed");
                }
            }
        }
    }
}
