//! Frame acquisition on a producer thread.
//!
//! [`prefetch`] moves a frame source onto its own thread and hands frames
//! to the measuring thread through a bounded channel. Frames arrive in
//! source order, so record order and detector state handoff are the same
//! as a sequential run; only acquisition overlaps with measurement.
//!
//! Dropping the [`Prefetch`] iterator disconnects the channel, and the
//! producer exits at its next send.

use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use tracing::error;

/// Iterator over frames acquired by a producer thread.
#[derive(Debug)]
pub struct Prefetch<T> {
    frames: Receiver<T>,
    producer: Option<JoinHandle<()>>,
}

/// Acquire `frames` on a background thread, buffering up to `depth`
/// frames ahead of the consumer (at least one).
pub fn prefetch<I>(frames: I, depth: usize) -> Prefetch<I::Item>
where
    I: IntoIterator + Send + 'static,
    I::Item: Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(depth.max(1));
    let producer = thread::spawn(move || {
        for frame in frames {
            if tx.send(frame).is_err() {
                break;
            }
        }
    });
    Prefetch {
        frames: rx,
        producer: Some(producer),
    }
}

impl<T> Iterator for Prefetch<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if let Ok(frame) = self.frames.recv() {
            return Some(frame);
        }
        // Channel closed: the source is exhausted or the producer died.
        if let Some(producer) = self.producer.take()
            && producer.join().is_err()
        {
            error!("frame producer thread panicked; treating as end of input");
        }
        None
    }
}
