//! Numeric identifier allocation
//!
//! A candidate uid number is derived from the local store and then confirmed
//! free on the directory. A candidate taken remotely is skipped and the next
//! one tried, up to a bounded number of attempts.

use tracing::{debug, instrument, warn};

use dirsync_core::config::{ServerConfig, SyncSettings};
use dirsync_core::error::{SyncError, SyncResult};
use dirsync_core::mapping::AttributeMapper;
use dirsync_core::traits::{AccountStore, DirectoryConnection};

/// Allocates uid numbers unused both locally and remotely.
#[derive(Debug, Clone, Copy)]
pub struct IdentifierAllocator {
    floor: u32,
    max_attempts: u32,
}

impl Default for IdentifierAllocator {
    fn default() -> Self {
        Self::new(&SyncSettings::default())
    }
}

impl IdentifierAllocator {
    /// Create an allocator from sync settings.
    pub fn new(settings: &SyncSettings) -> Self {
        Self::with_limits(settings.uid_floor, settings.max_allocation_attempts)
    }

    /// Create an allocator with an explicit floor and attempt limit.
    ///
    /// An attempt limit of 1 fails on the first remote hit.
    pub fn with_limits(floor: u32, max_attempts: u32) -> Self {
        Self {
            floor,
            max_attempts: max_attempts.max(1),
        }
    }

    /// The first candidate: one past the local maximum, never below the floor.
    fn first_candidate(&self, local_max: Option<u32>) -> SyncResult<u32> {
        match local_max {
            None => Ok(self.floor),
            Some(max) => max
                .checked_add(1)
                .map(|candidate| candidate.max(self.floor))
                .ok_or(SyncError::IdentifierConflict {
                    uid_number: max,
                    attempts: 0,
                }),
        }
    }

    /// Find the next free uid number for a server.
    #[instrument(skip_all, fields(server = %server.name))]
    pub async fn next_id(
        &self,
        conn: &mut dyn DirectoryConnection,
        server: &ServerConfig,
        store: &dyn AccountStore,
    ) -> SyncResult<u32> {
        let local_max = store.max_numeric_id(server.id()).await?;
        let mut candidate = self.first_candidate(local_max)?;

        for attempt in 1..=self.max_attempts {
            debug!(candidate, attempt, "Checking uid number on the directory");

            let hits = conn
                .search(
                    &server.base_dn,
                    server.search_scope,
                    &AttributeMapper::uid_number_filter(candidate),
                    &["uidNumber"],
                )
                .await?;

            if hits.is_empty() {
                debug!(uid_number = candidate, "Allocated uid number");
                return Ok(candidate);
            }

            warn!(
                candidate,
                attempt,
                max_attempts = self.max_attempts,
                "uid number already taken on the directory"
            );

            if attempt == self.max_attempts {
                break;
            }
            candidate = candidate.checked_add(1).ok_or(SyncError::IdentifierConflict {
                uid_number: candidate,
                attempts: attempt,
            })?;
        }

        Err(SyncError::IdentifierConflict {
            uid_number: candidate,
            attempts: self.max_attempts,
        })
    }
}
