use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

use crate::error::{ArbiterError, Result};
use crate::models::direction::Direction;
use crate::models::request::Request;

#[derive(Debug, Default)]
struct Pending {
    items: VecDeque<Request>,
    closed: bool,
}

/// Unbounded FIFO of pending requests for one approach. Once closed it
/// refuses new requests.
#[derive(Debug)]
pub struct DirectionQueue {
    direction: Direction,
    pending: Mutex<Pending>,
    notify: Notify,
}

impl DirectionQueue {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            pending: Mutex::new(Pending::default()),
            notify: Notify::new(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends at the back and wakes the consumer. Fails with
    /// `EngineStopped` once the queue is closed.
    pub fn push(&self, request: Request) -> Result<()> {
        {
            let mut pending = self.pending();
            if pending.closed {
                return Err(ArbiterError::EngineStopped);
            }
            pending.items.push_back(request);
        }
        self.notify.notify_one();
        Ok(())
    }

    pub fn try_pop(&self) -> Option<Request> {
        self.pending().items.pop_front()
    }

    /// Waits up to `timeout` for the next request.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<Request> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(request) = self.try_pop() {
                return Some(request);
            }
            if timeout_at(deadline, self.notify.notified()).await.is_err() {
                return self.try_pop();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pending().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending().items.is_empty()
    }

    /// Removes everything still waiting.
    pub fn drain(&self) -> Vec<Request> {
        self.pending().items.drain(..).collect()
    }

    /// Refuses further pushes and hands back what was still waiting, in
    /// one locked step.
    pub fn close(&self) -> Vec<Request> {
        let mut pending = self.pending();
        pending.closed = true;
        pending.items.drain(..).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.pending().closed
    }
}

/// The four per-direction queues.
#[derive(Debug)]
pub struct DirectionQueues {
    queues: [DirectionQueue; 4],
}

impl DirectionQueues {
    pub fn new() -> Self {
        Self {
            queues: Direction::ALL.map(DirectionQueue::new),
        }
    }

    pub fn get(&self, direction: Direction) -> &DirectionQueue {
        &self.queues[direction.index()]
    }

    /// Routes a request onto the queue matching its origin.
    pub fn enqueue(&self, request: Request) -> Result<()> {
        self.get(request.origin).push(request)
    }

    /// Closes every queue. Returns how many requests were dropped.
    pub fn close_all(&self) -> usize {
        self.queues.iter().map(|q| q.close().len()).sum()
    }

    pub fn lengths(&self) -> BTreeMap<Direction, usize> {
        self.queues
            .iter()
            .map(|q| (q.direction(), q.len()))
            .collect()
    }

    pub fn total_len(&self) -> usize {
        self.queues.iter().map(DirectionQueue::len).sum()
    }
}

impl Default for DirectionQueues {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::request::Turn;
    use std::sync::Arc;

    fn request(id: &str, origin: Direction) -> Request {
        Request::new(id, origin, origin.opposite(), Turn::Straight)
    }

    #[test]
    fn enqueue_routes_by_origin_in_fifo_order() {
        let queues = DirectionQueues::new();
        queues.enqueue(request("a", Direction::East)).unwrap();
        queues.enqueue(request("b", Direction::North)).unwrap();
        queues.enqueue(request("c", Direction::East)).unwrap();

        let lengths = queues.lengths();
        assert_eq!(lengths[&Direction::East], 2);
        assert_eq!(lengths[&Direction::North], 1);
        assert_eq!(lengths[&Direction::West], 0);
        assert_eq!(queues.total_len(), 3);

        let east = queues.get(Direction::East);
        assert_eq!(east.try_pop().unwrap().id, "a");
        assert_eq!(east.try_pop().unwrap().id, "c");
        assert!(east.try_pop().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn pop_timeout_returns_none_when_idle() {
        let queue = DirectionQueue::new(Direction::South);
        let start = Instant::now();
        assert!(queue.pop_timeout(Duration::from_millis(500)).await.is_none());
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn pop_timeout_wakes_on_push() {
        let queue = Arc::new(DirectionQueue::new(Direction::West));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop_timeout(Duration::from_secs(10)).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        queue.push(request("late", Direction::West)).unwrap();
        let popped = consumer.await.unwrap();
        assert_eq!(popped.unwrap().id, "late");
    }

    #[test]
    fn drain_empties_the_queue() {
        let queue = DirectionQueue::new(Direction::North);
        queue.push(request("a", Direction::North)).unwrap();
        queue.push(request("b", Direction::North)).unwrap();
        assert_eq!(queue.drain().len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn closed_queue_refuses_new_requests() {
        let queues = DirectionQueues::new();
        queues.enqueue(request("a", Direction::South)).unwrap();
        queues.enqueue(request("b", Direction::West)).unwrap();

        assert_eq!(queues.close_all(), 2);
        assert!(queues.get(Direction::North).is_closed());
        assert!(matches!(
            queues.enqueue(request("late", Direction::South)),
            Err(ArbiterError::EngineStopped)
        ));
        assert_eq!(queues.total_len(), 0);
    }
}
