//! Fixed-size pool of browser sessions for the image backfill.
//!
//! Sessions are created up front; `checkout` blocks until one is free, so
//! at most `size` sessions are ever in use no matter how many workers are
//! spawned. A free-list holds the idle sessions and a semaphore carries
//! exactly one permit per pooled session.

use tokio::sync::{Mutex, Semaphore};

use crate::driver::{Session, SessionFactory};
use crate::error::HarvestError;

pub struct SessionPool<S> {
    free: Mutex<Vec<S>>,
    permits: Semaphore,
}

impl<S: Session> SessionPool<S> {
    /// Creates `size` sessions eagerly.
    ///
    /// # Errors
    ///
    /// Fails if any session cannot be created; already-created sessions
    /// are closed before returning.
    pub async fn new<F>(factory: &F, size: usize) -> Result<Self, HarvestError>
    where
        F: SessionFactory<Sess = S>,
    {
        let mut free = Vec::with_capacity(size);
        for _ in 0..size {
            match factory.create().await {
                Ok(session) => free.push(session),
                Err(e) => {
                    for session in &free {
                        session.close().await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(Self {
            free: Mutex::new(free),
            permits: Semaphore::new(size),
        })
    }

    /// Takes a session out of the pool, waiting for one to be checked in
    /// when all are busy.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::PoolClosed`] if the pool was shut down
    /// while waiting.
    pub async fn checkout(&self) -> Result<S, HarvestError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| HarvestError::PoolClosed)?;
        // The permit guarantees the free list is non-empty: one permit
        // exists per pooled session and is only restored on check-in.
        permit.forget();
        self.free.lock().await.pop().ok_or(HarvestError::PoolClosed)
    }

    /// Returns a session to the pool and wakes one waiting checkout.
    pub async fn checkin(&self, session: S) {
        self.free.lock().await.push(session);
        self.permits.add_permits(1);
    }

    /// Closes every idle session. Callers must have checked everything
    /// back in first.
    pub async fn close(&self) {
        self.permits.close();
        let mut free = self.free.lock().await;
        for session in free.drain(..) {
            session.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{registry_with_empty_pages, FakeFactory};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn pool_bounds_concurrency_to_its_size() {
        let factory = FakeFactory::new(registry_with_empty_pages(1));
        let pool = Arc::new(SessionPool::new(&factory, 10).await.unwrap());

        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..37 {
            let pool = Arc::clone(&pool);
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            let done = Arc::clone(&done);
            tasks.push(tokio::spawn(async move {
                let session = pool.checkout().await.unwrap();
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                pool.checkin(session).await;
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(done.load(Ordering::SeqCst), 37);
        assert!(peak.load(Ordering::SeqCst) <= 10);
        pool.close().await;
    }

    #[tokio::test]
    async fn checkout_after_close_fails() {
        let factory = FakeFactory::new(registry_with_empty_pages(1));
        let pool = SessionPool::new(&factory, 1).await.unwrap();
        let session = pool.checkout().await.unwrap();
        pool.checkin(session).await;
        pool.close().await;
        assert!(matches!(
            pool.checkout().await,
            Err(HarvestError::PoolClosed)
        ));
    }
}
