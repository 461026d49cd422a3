//! Bounded-concurrency dispatch with completion-order draining.
//!
//! A fixed pool of request slots caps the number of outstanding requests. A
//! slot is taken by [`BoundedFetcher::submit`] and given back only when the
//! caller receives the result from a drain, so a producer can never run more
//! than `capacity` requests ahead of its consumer.

use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};

use crate::error::{FetchError, Result};
use crate::http::HttpClient;
use crate::task::{FetchResult, FetchTask};

struct Completion<T> {
    result: FetchResult<T>,
    _slot:  OwnedSemaphorePermit,
}

pub struct BoundedFetcher<C, T> {
    client:    Arc<C>,
    slots:     Arc<Semaphore>,
    capacity:  usize,
    in_flight: usize,
    tx:        mpsc::UnboundedSender<Completion<T>>,
    rx:        mpsc::UnboundedReceiver<Completion<T>>,
}

impl<C, T> BoundedFetcher<C, T>
where
    C: HttpClient + 'static,
    T: Send + 'static,
{
    pub fn new(client: Arc<C>, max_connections: NonZeroUsize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            client,
            slots: Arc::new(Semaphore::new(max_connections.get())),
            capacity: max_connections.get(),
            in_flight: 0,
            tx,
            rx,
        }
    }

    pub fn with_capacity(client: Arc<C>, max_connections: usize) -> Result<Self> {
        let max = NonZeroUsize::new(max_connections).ok_or(FetchError::ZeroCapacity)?;
        Ok(Self::new(client, max))
    }

    pub fn capacity(&self) -> usize { self.capacity }

    /// Submitted tasks whose results have not been drained yet.
    pub fn in_flight(&self) -> usize { self.in_flight }

    /// `true` when the next [`submit`](Self::submit) would wait for a slot.
    pub fn is_saturated(&self) -> bool { self.in_flight >= self.capacity }

    /// Hand `task` to the runtime, waiting for a free slot first.
    ///
    /// Slots are only released by draining. A caller that both submits and
    /// drains from one task must drain once [`is_saturated`](Self::is_saturated)
    /// reports `true`, otherwise this waits forever.
    pub async fn submit(&mut self, task: FetchTask<T>) -> Result<()> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| FetchError::PoolClosed)?;

        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = client.send(&task.url).await.map_err(|e| FetchError::Transport {
                url:     task.url.clone(),
                message: e.to_string(),
            });
            // The receiver lives as long as the fetcher; a send error means it
            // was dropped and nobody is waiting for this result.
            let _ = tx.send(Completion {
                result: FetchResult { task, outcome },
                _slot:  slot,
            });
        });

        self.in_flight += 1;
        Ok(())
    }

    /// Every result that is ready now, waiting for at least one if any
    /// request is outstanding. Returns an empty batch when idle.
    pub async fn drain_ready(&mut self) -> Vec<FetchResult<T>> {
        let mut ready = Vec::new();
        if self.in_flight == 0 {
            return ready;
        }

        if let Some(completion) = self.rx.recv().await {
            ready.push(self.release(completion));
        }
        while let Ok(completion) = self.rx.try_recv() {
            ready.push(self.release(completion));
        }

        tracing::trace!(drained = ready.len(), in_flight = self.in_flight, "drained ready results");
        ready
    }

    /// Wait for every outstanding request and return all of their results.
    pub async fn drain_all(&mut self) -> Vec<FetchResult<T>> {
        let mut all = Vec::with_capacity(self.in_flight);
        while self.in_flight > 0 {
            match self.rx.recv().await {
                Some(completion) => all.push(self.release(completion)),
                None => break,
            }
        }
        all
    }

    fn release(&mut self, completion: Completion<T>) -> FetchResult<T> {
        self.in_flight -= 1;
        completion.result
    }
}
