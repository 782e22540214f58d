use std::ops::{Deref, DerefMut};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{DbError, LockError};

/// One attempt to take the migration lock.
#[derive(Debug, Clone, Copy)]
pub struct LockRequest<'a> {
    pub name: &'a str,
    pub owner: &'a str,
    /// Locks not refreshed for longer than this may be reclaimed. Only
    /// meaningful for table-based locks; session locks end with their session.
    pub stale_after: Option<Duration>,
}

/// Exclusive, process-external lock serializing migration runs.
pub trait MigrationLock {
    /// Returns `false` if someone else holds the lock.
    fn try_acquire_lock(&mut self, request: &LockRequest<'_>) -> Result<bool, DbError>;
    fn release_lock(&mut self, name: &str, owner: &str) -> Result<(), DbError>;

    /// Marks a held lock as alive so it is not reclaimed as stale. Returns
    /// `false` if `owner` no longer holds it. Session-scoped locks cannot be
    /// taken over while their session lives and keep this default.
    fn refresh_lock(&mut self, _name: &str, _owner: &str) -> Result<bool, DbError> {
        Ok(true)
    }

    /// Releases the lock regardless of who holds it.
    fn force_release_lock(&mut self, name: &str) -> Result<(), DbError>;
}

/// What to do when the lock is already held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LockPolicy {
    #[default]
    FailFast,
    Wait {
        timeout: Duration,
        poll_interval: Duration,
    },
}

impl LockPolicy {
    pub fn wait(timeout: Duration) -> Self {
        LockPolicy::Wait {
            timeout,
            poll_interval: Duration::from_millis(250).min(timeout),
        }
    }
}

/// A held migration lock. Release it with [`LockGuard::release`]; dropping
/// the guard releases too, but swallows the error.
pub struct LockGuard<'a, D: MigrationLock> {
    db: &'a mut D,
    name: String,
    owner: String,
    released: bool,
}

impl<D: MigrationLock> LockGuard<'_, D> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Heartbeat for long runs. Fails with [`LockError::Lost`] once another
    /// holder has reclaimed the lock.
    pub fn refresh(&mut self) -> Result<(), LockError> {
        if self.db.refresh_lock(&self.name, &self.owner)? {
            Ok(())
        } else {
            Err(LockError::Lost {
                name: self.name.clone(),
            })
        }
    }

    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        self.db
            .release_lock(&self.name, &self.owner)
            .map_err(|source| LockError::Release {
                name: self.name.clone(),
                source,
            })?;
        tracing::debug!(lock = %self.name, "released migration lock");
        Ok(())
    }
}

impl<D: MigrationLock> Deref for LockGuard<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.db
    }
}

impl<D: MigrationLock> DerefMut for LockGuard<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        self.db
    }
}

impl<D: MigrationLock> Drop for LockGuard<'_, D> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.db.release_lock(&self.name, &self.owner) {
            tracing::warn!(lock = %self.name, error = %e, "failed to release migration lock");
        }
    }
}

/// Takes the lock, retrying according to `policy`.
pub fn acquire_lock<'a, D: MigrationLock>(
    db: &'a mut D,
    request: &LockRequest<'_>,
    policy: LockPolicy,
) -> Result<LockGuard<'a, D>, LockError> {
    let started = Instant::now();
    loop {
        if db.try_acquire_lock(request)? {
            tracing::debug!(lock = %request.name, owner = %request.owner, "acquired migration lock");
            return Ok(LockGuard {
                db,
                name: request.name.to_string(),
                owner: request.owner.to_string(),
                released: false,
            });
        }

        let waited = started.elapsed();
        match policy {
            LockPolicy::Wait {
                timeout,
                poll_interval,
            } if waited < timeout => {
                tracing::debug!(lock = %request.name, ?waited, "migration lock busy, waiting");
                thread::sleep(poll_interval.min(timeout - waited));
            }
            _ => {
                return Err(LockError::Held {
                    name: request.name.to_string(),
                    waited,
                })
            }
        }
    }
}
