// Collection subscriptions
//
// The store's real-time listener is modeled as a poll loop that re-reads a
// collection and publishes the full current result set (never a diff) into
// a watch channel whenever it changes. Each subscription owns its poll
// task; dropping the guard aborts the task, so a view tearing down releases
// its listener without any explicit unsubscribe call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::{Message, RecentChatSummary};

use super::FirestoreService;

/// Default interval between snapshot polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// A live view of one collection. Holds the poll task; releases it on drop.
pub struct Subscription<T> {
    receiver: watch::Receiver<Vec<T>>,
    handle: JoinHandle<()>,
}

impl<T: Clone> Subscription<T> {
    /// Current snapshot.
    pub fn snapshot(&self) -> Vec<T> {
        self.receiver.borrow().clone()
    }

    /// A receiver for awaiting snapshot changes.
    pub fn receiver(&self) -> watch::Receiver<Vec<T>> {
        self.receiver.clone()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Fetch once to seed the channel, then spawn a poll loop around `fetch`
/// publishing each changed snapshot. Subscribers therefore never observe a
/// synthetic empty snapshot while the collection has data. Fetch failures
/// are logged and the previous snapshot stays current.
pub async fn watch_collection<T, F, Fut>(fetch: F, interval: Duration) -> Subscription<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<T>, Box<dyn std::error::Error + Send + Sync>>> + Send,
{
    let initial = match fetch().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!("Initial snapshot fetch failed: {}", e);
            Vec::new()
        }
    };
    let (sender, receiver) = watch::channel(initial);

    let handle = tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            if sender.is_closed() {
                break;
            }

            match fetch().await {
                Ok(snapshot) => {
                    sender.send_if_modified(|current| {
                        if *current != snapshot {
                            *current = snapshot;
                            true
                        } else {
                            false
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!("Snapshot poll failed: {}", e);
                }
            }
        }
    });

    Subscription { receiver, handle }
}

/// Live message list for a chat, timestamp ascending.
pub async fn watch_messages(
    firestore: Arc<FirestoreService>,
    chat_id: String,
    interval: Duration,
) -> Subscription<Message> {
    watch_collection(
        move || {
            let firestore = firestore.clone();
            let chat_id = chat_id.clone();
            async move { firestore.list_messages(&chat_id).await }
        },
        interval,
    )
    .await
}

/// Live recent-chat summaries, newest first.
pub async fn watch_recent_chats(
    firestore: Arc<FirestoreService>,
    limit: usize,
    interval: Duration,
) -> Subscription<RecentChatSummary> {
    watch_collection(
        move || {
            let firestore = firestore.clone();
            async move { firestore.list_recent_chats(limit).await }
        },
        interval,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_watch_collection_seeds_before_first_event() {
        let subscription = watch_collection(
            || async { Ok(vec![1usize, 2, 3]) },
            Duration::from_secs(60),
        )
        .await;

        // Current data available immediately; no empty snapshot first
        assert_eq!(subscription.snapshot(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_watch_collection_publishes_changed_snapshots() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let subscription = watch_collection(
            move || {
                let n = calls_clone.fetch_add(1, Ordering::SeqCst);
                async move { Ok((0..=n).collect::<Vec<usize>>()) }
            },
            Duration::from_millis(10),
        )
        .await;

        assert_eq!(subscription.snapshot(), vec![0]);

        let mut receiver = subscription.receiver();
        receiver.changed().await.unwrap();
        let second = receiver.borrow_and_update().clone();
        assert_eq!(second, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_subscription_drop_stops_polling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let subscription = watch_collection(
            move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async move { Ok(vec![1usize]) }
            },
            Duration::from_millis(5),
        )
        .await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(subscription);
        let after_drop = calls.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_drop);
    }

    #[tokio::test]
    async fn test_watch_collection_keeps_last_snapshot_on_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let subscription = watch_collection(
            move || {
                let n = calls_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Ok(vec![7usize])
                    } else {
                        Err("poll failed".into())
                    }
                }
            },
            Duration::from_millis(5),
        )
        .await;

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(subscription.snapshot(), vec![7]);
    }
}
