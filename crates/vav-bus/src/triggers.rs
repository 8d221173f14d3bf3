//! Envelope trigger events
//!
//! A bounded SPSC queue from the vision thread to the audio side. Pushes
//! drop when the queue is full; neither side ever blocks.

use rtrb::{Consumer, Producer, RingBuffer};

/// Which envelope fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Env1,
    Env2,
    Env3,
    /// Acceleration gate. Internal unless the `env4-dac` feature routes it
    /// to the CV bus.
    Env4,
}

/// One trigger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub kind: TriggerKind,
}

/// Producer half (vision thread).
pub struct TriggerTx {
    producer: Producer<Trigger>,
    dropped: u64,
}

impl TriggerTx {
    /// Push an event; silently drops when the consumer is behind.
    pub fn send(&mut self, kind: TriggerKind) {
        if self.producer.push(Trigger { kind }).is_err() {
            self.dropped += 1;
        }
    }

    /// Events discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Consumer half (audio thread).
pub struct TriggerRx {
    consumer: Consumer<Trigger>,
}

impl TriggerRx {
    /// Pop the next pending trigger, if any. Wait-free.
    #[inline]
    pub fn recv(&mut self) -> Option<Trigger> {
        self.consumer.pop().ok()
    }
}

/// Queue constructor.
pub struct TriggerQueue;

impl TriggerQueue {
    pub const CAPACITY: usize = 64;

    pub fn new() -> (TriggerTx, TriggerRx) {
        let (producer, consumer) = RingBuffer::new(Self::CAPACITY);
        (
            TriggerTx {
                producer,
                dropped: 0,
            },
            TriggerRx { consumer },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_recv_order() {
        let (mut tx, mut rx) = TriggerQueue::new();
        tx.send(TriggerKind::Env1);
        tx.send(TriggerKind::Env3);
        assert_eq!(rx.recv().unwrap().kind, TriggerKind::Env1);
        assert_eq!(rx.recv().unwrap().kind, TriggerKind::Env3);
        assert!(rx.recv().is_none());
    }

    #[test]
    fn full_queue_drops_not_blocks() {
        let (mut tx, mut rx) = TriggerQueue::new();
        for _ in 0..TriggerQueue::CAPACITY + 10 {
            tx.send(TriggerKind::Env2);
        }
        assert_eq!(tx.dropped(), 10);
        let mut drained = 0;
        while rx.recv().is_some() {
            drained += 1;
        }
        assert_eq!(drained, TriggerQueue::CAPACITY);
    }
}
