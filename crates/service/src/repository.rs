//! The persistent identity/hosting/relationship database is an external
//! collaborator: this crate only consumes a narrow repository interface —
//! lookup, insert/update, and a per-table advisory lock held across a unit
//! of work.
//!
//! A mixed sync/async trait object injected into the engine at
//! construction, rather than a concrete database client threaded through
//! every handler.

use std::time::SystemTime;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The underlying store could not be reached or the transaction failed;
    /// handlers map this to `Status::ErrorInternal`.
    Unavailable(String),
}

impl std::fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepositoryError::Unavailable(detail) => write!(f, "repository unavailable: {detail}"),
        }
    }
}

impl std::error::Error for RepositoryError {}

/// A hosted identity's row, as consumed by `HomeNodeRequest`, `UpdateProfile`,
/// the cancel-agreement handlers, and `GetIdentityInformation` /
/// `GetProfileInformation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostingRecord {
    pub identity_id: [u8; 32],
    pub public_key: Vec<u8>,
    pub profile_initialized: bool,
    /// `major.minor.patch` version literal last reported by `UpdateProfile`,
    /// absent until the first update that sets it.
    pub version: Option<(u8, u8, u8)>,
    pub name: String,
    pub extra_data: String,
    pub profile_image_id: Option<String>,
    pub thumbnail_image_id: Option<String>,
    pub application_services: Vec<String>,
    /// `None` while the hosting agreement is active. `Some(t)` once
    /// cancelled; `t <= now` means fully expired, `t > now` means the
    /// 14-day grace window from `CancelHostingAgreement` is still open.
    pub expiration_date: Option<SystemTime>,
    /// Present only when the agreement was cancelled with a redirect
    /// target (`CancelHomeNodeAgreement`/`CancelHostingAgreement`).
    pub redirect_target: Option<[u8; 32]>,
}

impl HostingRecord {
    /// A record is "moved" rather than hosted-here once it carries both an
    /// expiration and a redirect target (`GetIdentityInformation`).
    pub fn is_moved(&self) -> bool {
        self.expiration_date.is_some() && self.redirect_target.is_some()
    }
}

/// Fields an `UpdateProfile` request may change; absent fields are left
/// untouched (the request's `set*` bitmask gates which of these are
/// present).
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub version: Option<(u8, u8, u8)>,
    pub name: Option<String>,
    pub location: Option<[u8; 4]>,
    pub image_id: Option<String>,
    pub thumbnail_id: Option<String>,
    pub extra_data: Option<String>,
}

/// The outcome of `HostingGuard::insert_or_revive`
/// (`HomeNodeRequest`/`RegisterHosting`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Revived,
    /// Another hosting agreement for this identity is already active.
    AlreadyActive,
}

/// A unit-of-work against the hosting table, held under the table's
/// advisory lock from construction (`Repository::lock_hosting_table`) to
/// `commit`/`rollback`.
#[async_trait]
pub trait HostingGuard: Send {
    async fn count_hosted_identities(&mut self) -> Result<usize, RepositoryError>;

    async fn insert_or_revive(
        &mut self,
        identity_id: [u8; 32],
        public_key: Vec<u8>,
    ) -> Result<InsertOutcome, RepositoryError>;

    async fn set_expiration(
        &mut self,
        identity_id: [u8; 32],
        expiration_date: Option<SystemTime>,
        redirect_target: Option<[u8; 32]>,
    ) -> Result<(), RepositoryError>;

    /// Applies a profile update, swapping image identifiers atomically with
    /// the rest of the row. The image itself is written to the image store
    /// *before* this call; this only swaps the reference.
    async fn update_profile(
        &mut self,
        identity_id: [u8; 32],
        update: ProfileUpdate,
    ) -> Result<(), RepositoryError>;

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;

    fn rollback(self: Box<Self>);
}

/// The narrow interface the engine and handlers consume.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Acquires the per-table advisory lock and opens a transaction.
    /// Released by the returned guard's `commit`/`rollback`.
    async fn lock_hosting_table(&self) -> Result<Box<dyn HostingGuard>, RepositoryError>;

    async fn lookup_hosting(
        &self,
        identity_id: &[u8; 32],
    ) -> Result<Option<HostingRecord>, RepositoryError>;
}

/// An ephemeral, process-local `Repository`. Used by the test suite and, by
/// default, by the binary when no production-grade store is wired in —
/// storage backends are an external collaborator (module doc above), so
/// this is the "works out of the box, loses everything on restart" option
/// rather than a real database adapter.
pub mod memory {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Default)]
    pub struct InMemoryRepository {
        rows: Arc<Mutex<HashMap<[u8; 32], HostingRecord>>>,
    }

    impl InMemoryRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed(&self, record: HostingRecord) {
            self.rows.lock().insert(record.identity_id, record);
        }
    }

    struct InMemoryGuard {
        rows: Arc<Mutex<HashMap<[u8; 32], HostingRecord>>>,
    }

    #[async_trait]
    impl HostingGuard for InMemoryGuard {
        async fn count_hosted_identities(&mut self) -> Result<usize, RepositoryError> {
            Ok(self
                .rows
                .lock()
                .values()
                .filter(|r| r.expiration_date.is_none())
                .count())
        }

        async fn insert_or_revive(
            &mut self,
            identity_id: [u8; 32],
            public_key: Vec<u8>,
        ) -> Result<InsertOutcome, RepositoryError> {
            let mut rows = self.rows.lock();
            match rows.get(&identity_id) {
                Some(existing) if existing.expiration_date.is_none() => {
                    Ok(InsertOutcome::AlreadyActive)
                }
                Some(existing) => {
                    let mut revived = existing.clone();
                    revived.expiration_date = None;
                    revived.redirect_target = None;
                    rows.insert(identity_id, revived);
                    Ok(InsertOutcome::Revived)
                }
                None => {
                    rows.insert(
                        identity_id,
                        HostingRecord {
                            identity_id,
                            public_key,
                            profile_initialized: false,
                            version: None,
                            name: String::new(),
                            extra_data: String::new(),
                            profile_image_id: None,
                            thumbnail_image_id: None,
                            application_services: Vec::new(),
                            expiration_date: None,
                            redirect_target: None,
                        },
                    );
                    Ok(InsertOutcome::Inserted)
                }
            }
        }

        async fn set_expiration(
            &mut self,
            identity_id: [u8; 32],
            expiration_date: Option<SystemTime>,
            redirect_target: Option<[u8; 32]>,
        ) -> Result<(), RepositoryError> {
            let mut rows = self.rows.lock();
            let row = rows
                .get_mut(&identity_id)
                .ok_or_else(|| RepositoryError::Unavailable("no such identity".into()))?;
            row.expiration_date = expiration_date;
            row.redirect_target = redirect_target;
            Ok(())
        }

        async fn update_profile(
            &mut self,
            identity_id: [u8; 32],
            update: ProfileUpdate,
        ) -> Result<(), RepositoryError> {
            let mut rows = self.rows.lock();
            let row = rows
                .get_mut(&identity_id)
                .ok_or_else(|| RepositoryError::Unavailable("no such identity".into()))?;

            if let Some(version) = update.version {
                row.version = Some(version);
            }
            if let Some(name) = update.name {
                row.name = name;
            }
            if let Some(extra_data) = update.extra_data {
                row.extra_data = extra_data;
            }
            if let Some(image_id) = update.image_id {
                row.profile_image_id = Some(image_id);
            }
            if let Some(thumbnail_id) = update.thumbnail_id {
                row.thumbnail_image_id = Some(thumbnail_id);
            }
            row.profile_initialized = true;
            Ok(())
        }

        async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
            Ok(())
        }

        fn rollback(self: Box<Self>) {}
    }

    #[async_trait]
    impl Repository for InMemoryRepository {
        async fn lock_hosting_table(&self) -> Result<Box<dyn HostingGuard>, RepositoryError> {
            Ok(Box::new(InMemoryGuard {
                rows: self.rows.clone(),
            }))
        }

        async fn lookup_hosting(
            &self,
            identity_id: &[u8; 32],
        ) -> Result<Option<HostingRecord>, RepositoryError> {
            Ok(self.rows.lock().get(identity_id).cloned())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

    #[tokio::test]
    async fn insert_then_duplicate_is_already_active() {
        let repo = InMemoryRepository::new();
        let mut guard = repo.lock_hosting_table().await.unwrap();

        assert_eq!(
            guard.insert_or_revive([1; 32], vec![9; 32]).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            guard.insert_or_revive([1; 32], vec![9; 32]).await.unwrap(),
            InsertOutcome::AlreadyActive
        );
    }

    #[tokio::test]
    async fn revive_clears_expiration() {
        let repo = InMemoryRepository::new();
        repo.seed(HostingRecord {
            identity_id: [2; 32],
            public_key: vec![1; 32],
            profile_initialized: true,
            version: None,
            name: "old".into(),
            extra_data: String::new(),
            profile_image_id: None,
            thumbnail_image_id: None,
            application_services: Vec::new(),
            expiration_date: Some(std::time::SystemTime::now()),
            redirect_target: None,
        });

        let mut guard = repo.lock_hosting_table().await.unwrap();
        assert_eq!(
            guard.insert_or_revive([2; 32], vec![1; 32]).await.unwrap(),
            InsertOutcome::Revived
        );

        let row = repo.lookup_hosting(&[2; 32]).await.unwrap().unwrap();
        assert!(row.expiration_date.is_none());
    }
    }
}
