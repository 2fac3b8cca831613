//! Single-consumer FIFO queue with join semantics.
//!
//! Producers `put`, the worker `get`s and must call `task_done` exactly
//! once per item; `join` resolves once every item ever enqueued has
//! been marked done, which is what graceful shutdown waits on.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

struct QueueState<T> {
    queue: VecDeque<T>,
    unfinished: usize,
}

pub struct MessageQueue<T> {
    state: Mutex<QueueState<T>>,
    items: Notify,
    idle: Notify,
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MessageQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                unfinished: 0,
            }),
            items: Notify::new(),
            idle: Notify::new(),
        }
    }

    pub fn put(&self, item: T) {
        {
            let mut state = self.state.lock();
            state.queue.push_back(item);
            state.unfinished += 1;
        }
        self.items.notify_one();
    }

    /// Wait for and remove the next item.
    pub async fn get(&self) -> T {
        loop {
            if let Some(item) = self.state.lock().queue.pop_front() {
                return item;
            }
            self.items.notified().await;
        }
    }

    /// Mark one previously fetched item as fully processed.
    ///
    /// # Panics
    /// Panics if called more times than items were enqueued; that is an
    /// accounting bug in the consumer.
    pub fn task_done(&self) {
        let mut state = self.state.lock();
        assert!(
            state.unfinished > 0,
            "task_done() called more times than items were enqueued"
        );
        state.unfinished -= 1;
        if state.unfinished == 0 {
            self.idle.notify_waiters();
        }
    }

    /// Wait until every enqueued item has been marked done.
    pub async fn join(&self) {
        loop {
            // Register the waiter before re-checking the counter:
            // `notify_waiters` stores no permit, so a final `task_done`
            // landing between the check and the await would otherwise
            // be lost and park this forever.
            let idle = self.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();

            if self.state.lock().unfinished == 0 {
                return;
            }
            idle.await;
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn fifo_order() {
        let queue = MessageQueue::new();
        queue.put(1);
        queue.put(2);
        queue.put(3);
        assert_eq!(queue.get().await, 1);
        assert_eq!(queue.get().await, 2);
        assert_eq!(queue.get().await, 3);
    }

    #[tokio::test]
    async fn get_waits_for_put() {
        let queue = Arc::new(MessageQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.put(7u32);
        assert_eq!(waiter.await.expect("join"), 7);
    }

    #[tokio::test]
    async fn join_returns_once_every_item_is_done() {
        let queue = Arc::new(MessageQueue::new());
        queue.put(1);
        queue.put(2);

        let worker = {
            let queue = queue.clone();
            tokio::spawn(async move {
                for _ in 0..2 {
                    let _item = queue.get().await;
                    queue.task_done();
                }
            })
        };

        tokio::time::timeout(Duration::from_secs(1), queue.join())
            .await
            .expect("join must resolve in bounded time");
        worker.await.expect("worker");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn parked_join_is_woken_by_the_final_task_done() {
        let queue = Arc::new(MessageQueue::new());
        queue.put(1);
        let _item = queue.get().await;

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.join().await })
        };
        // Let the waiter run its check and park.
        tokio::task::yield_now().await;

        queue.task_done();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("join must resolve in bounded time")
            .expect("waiter");
    }

    #[tokio::test]
    async fn join_waits_for_in_flight_item() {
        let queue = Arc::new(MessageQueue::new());
        queue.put(1);
        let _item = queue.get().await;

        // Item fetched but not done yet: join must still block.
        let joined =
            tokio::time::timeout(Duration::from_millis(50), queue.join()).await;
        assert!(joined.is_err());

        queue.task_done();
        tokio::time::timeout(Duration::from_secs(1), queue.join())
            .await
            .expect("join after task_done");
    }

    #[tokio::test]
    #[should_panic(expected = "task_done")]
    async fn extra_task_done_panics() {
        let queue = MessageQueue::<u32>::new();
        queue.put(1);
        let _ = queue.get().await;
        queue.task_done();
        queue.task_done();
    }

    #[tokio::test]
    async fn requeued_item_goes_to_the_tail() {
        let queue = MessageQueue::new();
        queue.put("a");
        queue.put("b");
        let first = queue.get().await;
        // Flood-wait style requeue: same item back at the tail.
        queue.put(first);
        queue.task_done();
        assert_eq!(queue.get().await, "b");
        assert_eq!(queue.get().await, "a");
    }
}
