// ABOUTME: Shift lock preventing concurrent shifts of the same service.
// ABOUTME: Compare-and-set record in the control plane; stale locks are broken with a warning.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use crate::control_plane::{LockAttempt, LockInfo, ServiceOps};
use crate::types::ServiceName;

use super::error::ShiftError;

/// A held shift lock. Call [`ShiftLock::release`] when done, or use
/// [`ShiftLock::with_lock`] which releases on every exit path.
pub struct ShiftLock<'a, P: ServiceOps + ?Sized> {
    plane: &'a P,
    service: ServiceName,
    info: LockInfo,
}

impl<P: ServiceOps + ?Sized> std::fmt::Debug for ShiftLock<'_, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShiftLock")
            .field("service", &self.service)
            .field("info", &self.info)
            .finish()
    }
}

impl<'a, P: ServiceOps + ?Sized> ShiftLock<'a, P> {
    /// Acquire the shift lock for `service`.
    ///
    /// A lock older than an hour is broken automatically; `force` breaks a
    /// live one.
    pub async fn acquire(
        plane: &'a P,
        service: &ServiceName,
        force: bool,
    ) -> Result<Self, ShiftError> {
        let info = LockInfo::new(service);

        match Self::try_acquire(plane, service, &info).await? {
            LockAttempt::Acquired => return Ok(Self::held(plane, service, info)),
            LockAttempt::Held(existing) => {
                if force {
                    tracing::warn!(
                        "Breaking lock held by {} (pid {}) since {}",
                        existing.holder,
                        existing.pid,
                        existing.started_at
                    );
                } else if existing.is_stale() {
                    tracing::warn!(
                        "Auto-breaking stale lock held by {} (pid {}) since {}",
                        existing.holder,
                        existing.pid,
                        existing.started_at
                    );
                } else {
                    return Err(ShiftError::LockHeld {
                        service: service.clone(),
                        holder: existing.holder,
                        pid: existing.pid,
                        started_at: existing.started_at,
                    });
                }
            }
        }

        plane
            .break_lock(service)
            .await
            .map_err(|e| ShiftError::Lock(format!("failed to break lock: {}", e)))?;

        match Self::try_acquire(plane, service, &info).await? {
            LockAttempt::Acquired => Ok(Self::held(plane, service, info)),
            LockAttempt::Held(_) => Err(ShiftError::Lock(
                "lock acquired by another process during break".to_string(),
            )),
        }
    }

    async fn try_acquire(
        plane: &P,
        service: &ServiceName,
        info: &LockInfo,
    ) -> Result<LockAttempt, ShiftError> {
        plane
            .try_acquire_lock(service, info)
            .await
            .map_err(|e| ShiftError::Lock(format!("failed to acquire lock: {}", e)))
    }

    fn held(plane: &'a P, service: &ServiceName, info: LockInfo) -> Self {
        tracing::debug!(%service, "shift lock acquired");
        Self {
            plane,
            service: service.clone(),
            info,
        }
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    pub async fn release(self) -> Result<(), ShiftError> {
        self.plane
            .release_lock(&self.service, &self.info)
            .await
            .map_err(|e| ShiftError::Lock(format!("failed to release lock: {}", e)))?;
        tracing::debug!(service = %self.service, "shift lock released");
        Ok(())
    }

    /// Run `work` while holding the lock. The lock is released whether `work`
    /// succeeds, fails or panics.
    pub async fn with_lock<T, E, F>(
        plane: &'a P,
        service: &ServiceName,
        force: bool,
        work: F,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<ShiftError>,
    {
        let lock = Self::acquire(plane, service, force).await?;

        let outcome = AssertUnwindSafe(work).catch_unwind().await;

        if let Err(e) = lock.release().await {
            tracing::warn!("{}", e);
        }

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
