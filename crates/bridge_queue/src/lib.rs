//! Bounded single-producer/single-consumer queues.
//!
//! `std::sync::mpsc::sync_channel` already gives the shape needed
//! here: a fixed-capacity ring, FIFO delivery, and a non-blocking
//! `try_send` the producer can use to detect a full queue without ever
//! stalling. The consumer side is wrapped in a mutex purely so the
//! queue can live as a shared resource across the two owning threads —
//! only one thread ever calls `drain`.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Mutex;

use bridge_state::{CompletionToken, RenderCommand};

pub struct BoundedQueue<T> {
    sender: SyncSender<T>,
    receiver: Mutex<Receiver<T>>,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = sync_channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Non-blocking submit. Returns `false` if the queue is saturated;
    /// callers fold that into the command's own failure path
    /// rather than ever waiting for room to open up.
    pub fn try_submit(&self, item: T) -> bool {
        match self.sender.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Drain everything currently queued, in submission order.
    pub fn drain(&self) -> Vec<T> {
        let receiver = self.receiver.lock().unwrap();
        let mut out = Vec::new();
        while let Ok(item) = receiver.try_recv() {
            out.push(item);
        }
        out
    }
}

pub type RenderCommandQueue = BoundedQueue<RenderCommand>;
pub type CallbackQueue = BoundedQueue<CompletionToken>;

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_ids::EntityId;

    #[test]
    fn commands_drain_in_submission_order() {
        let queue = RenderCommandQueue::new(8);
        for i in 0..3 {
            queue.try_submit(RenderCommand::DestroyEntity {
                entity: EntityId::from_raw(i),
            });
        }
        let drained = queue.drain();
        let ids: Vec<u64> = drained
            .iter()
            .map(|c| match c {
                RenderCommand::DestroyEntity { entity } => entity.raw(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn submit_fails_once_saturated() {
        let queue = RenderCommandQueue::new(1);
        assert!(queue.try_submit(RenderCommand::DestroyEntity {
            entity: EntityId::from_raw(1)
        }));
        assert!(!queue.try_submit(RenderCommand::DestroyEntity {
            entity: EntityId::from_raw(2)
        }));
        assert_eq!(queue.drain().len(), 1);
    }

    #[test]
    fn drain_is_empty_when_nothing_submitted() {
        let queue = CallbackQueue::new(4);
        assert!(queue.drain().is_empty());
    }
}
