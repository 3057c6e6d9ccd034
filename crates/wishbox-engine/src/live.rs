use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::WatchStream;

use wishbox_store::StoreError;

use crate::changes::{ChangeBus, Table};
use crate::error::EngineError;

/// A read query that stays live: the underlying read is re-run and
/// re-emitted in full whenever a table it depends on changes, no matter
/// which mutation path caused the change.
///
/// Decoupled from any reactive runtime — the surface is a current
/// snapshot (`get`), an awaitable next emission (`next`), a callback
/// subscription (`subscribe`), and a stream adapter (`into_stream`).
pub struct LiveQuery<T> {
    rx: watch::Receiver<T>,
}

impl<T: Clone + Send + Sync + 'static> LiveQuery<T> {
    /// Run the read once for the initial value, then keep it fresh from a
    /// background task. The task exits when every handle to this query is
    /// gone or the bus shuts down. Must be called within a tokio runtime.
    pub(crate) fn spawn<F>(
        bus: &ChangeBus,
        tables: Vec<Table>,
        read: F,
    ) -> Result<Self, EngineError>
    where
        F: Fn() -> Result<T, StoreError> + Send + Sync + 'static,
    {
        // Subscribe before the initial read: a commit that lands while we
        // read is then buffered and triggers a refresh instead of being
        // lost. The extra recompute when that happens is harmless.
        let mut changes = bus.subscribe();
        let initial = read()?;
        let (tx, rx) = watch::channel(initial);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    recv = changes.recv() => match recv {
                        Ok(table) if tables.contains(&table) => refresh(&read, &tx),
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // Full recomputation makes missed notifications
                            // harmless as long as we recompute now.
                            tracing::warn!(skipped, "live query lagged, recomputing");
                            refresh(&read, &tx);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });

        Ok(Self { rx })
    }

    /// Current result snapshot.
    pub fn get(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Suspend until the next re-emission. None once the feed is gone.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Invoke the callback on every re-emission from now on. Dropping the
    /// returned Subscription unsubscribes.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(T) + Send + 'static,
    {
        let mut rx = self.rx.clone();
        let handle = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let value = rx.borrow_and_update().clone();
                callback(value);
            }
        });
        Subscription { handle }
    }

    /// Adapt to a Stream. Yields the current value first, then every
    /// re-emission.
    pub fn into_stream(self) -> WatchStream<T> {
        WatchStream::new(self.rx)
    }
}

fn refresh<T, F>(read: &F, tx: &watch::Sender<T>)
where
    F: Fn() -> Result<T, StoreError>,
{
    match read() {
        Ok(value) => {
            let _ = tx.send(value);
        }
        Err(e) => tracing::warn!(error = %e, "live query refresh failed"),
    }
}

/// Callback registration handle. Dropping it stops the callbacks.
pub struct Subscription {
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn counting_query(
        bus: &ChangeBus,
        tables: Vec<Table>,
    ) -> (LiveQuery<usize>, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let reads_in_closure = reads.clone();
        let query = LiveQuery::spawn(bus, tables, move || {
            Ok(reads_in_closure.fetch_add(1, Ordering::SeqCst))
        })
        .unwrap();
        (query, reads)
    }

    #[tokio::test]
    async fn initial_value_comes_from_first_read() {
        let bus = ChangeBus::new(8);
        let (query, reads) = counting_query(&bus, vec![Table::Items]);
        assert_eq!(query.get(), 0);
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn relevant_change_triggers_re_emission() {
        let bus = ChangeBus::new(8);
        let (mut query, _) = counting_query(&bus, vec![Table::Items]);

        bus.publish(Table::Items);
        let next = query.next().await.unwrap();
        assert_eq!(next, 1);
    }

    #[tokio::test]
    async fn commit_during_initial_read_is_observed() {
        let bus = ChangeBus::new(8);
        let bus_in_closure = bus.clone();
        let reads = Arc::new(AtomicUsize::new(0));
        let reads_in_closure = reads.clone();
        // The first read races with a commit, like a fire-and-forget
        // mutation landing while the query is being constructed.
        let mut query = LiveQuery::spawn(&bus, vec![Table::Items], move || {
            let n = reads_in_closure.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                bus_in_closure.publish(Table::Items);
            }
            Ok(n)
        })
        .unwrap();

        assert_eq!(query.next().await, Some(1));
    }

    #[tokio::test]
    async fn unrelated_change_does_not_re_run_read() {
        let bus = ChangeBus::new(8);
        let (query, reads) = counting_query(&bus, vec![Table::Items]);

        bus.publish(Table::Users);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert_eq!(query.get(), 0);
    }

    #[tokio::test]
    async fn subscription_callback_fires_until_dropped() {
        let bus = ChangeBus::new(8);
        let (query, _) = counting_query(&bus, vec![Table::Events]);

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_callback = seen.clone();
        let sub = query.subscribe(move |_| {
            seen_in_callback.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(Table::Events);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        drop(sub);
        bus.publish(Table::Events);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stream_yields_current_then_updates() {
        use tokio_stream::StreamExt;

        let bus = ChangeBus::new(8);
        let (query, _) = counting_query(&bus, vec![Table::Items]);
        let mut stream = query.into_stream();

        assert_eq!(stream.next().await, Some(0));
        bus.publish(Table::Items);
        assert_eq!(stream.next().await, Some(1));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_last_good_value() {
        let bus = ChangeBus::new(8);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_closure = calls.clone();
        let query = LiveQuery::spawn(&bus, vec![Table::Items], move || {
            match calls_in_closure.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(42usize),
                _ => Err(StoreError::Database("disk gone".into())),
            }
        })
        .unwrap();

        bus.publish(Table::Items);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(query.get(), 42);
    }

    #[tokio::test]
    async fn failing_initial_read_is_an_error() {
        let bus = ChangeBus::new(8);
        let result = LiveQuery::<usize>::spawn(&bus, vec![Table::Items], || {
            Err(StoreError::Database("no".into()))
        });
        assert!(result.is_err());
    }
}
