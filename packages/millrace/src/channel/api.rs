// exposed API of the channel.

use super::{
    core,
    error::SendError,
};


/// Create an unbounded channel, returning a handle to it
///
/// Equivalent to [`Channel::new`].
pub fn channel<T>() -> Channel<T> {
    Channel::new()
}

/// Unbounded multi-producer multi-consumer FIFO channel
///
/// Any number of threads may send, receive, and close through any handle
/// concurrently; cloning a handle yields another handle to the same channel. Values
/// are delivered oldest-first: buffered values drain in the order they were sent, and
/// a value sent while receivers are parked goes directly to the receiver that has
/// waited longest.
///
/// Sending never blocks and never fails for lack of capacity; the buffer grows
/// without bound if receivers fall behind. Receiving blocks the calling thread while
/// the channel is open and empty, without spinning, and a parked receiver cannot be
/// retracted: there is no timeout or cancellation. Layer deadlines outside this type
/// if they are needed.
pub struct Channel<T> {
    inner: core::Channel<T>,
}

impl<T> Channel<T> {
    /// Construct an empty, open channel
    pub fn new() -> Self {
        Channel { inner: core::Channel::new() }
    }

    /// Append a value to the logical end of the channel
    ///
    /// If a receiver is currently parked, the value is instead handed directly to the
    /// one that has waited longest, waking it. Never blocks. Fails only if the
    /// channel has been closed, handing the value back in the error.
    pub fn send(&self, value: T) -> Result<(), SendError<T>> {
        self.inner.send(value).map_err(|value| SendError { value })
    }

    /// Remove and return the oldest value in the channel
    ///
    /// Blocks the calling thread while the channel is open and empty. Returns `None`
    /// only once the channel is closed and every value sent before the close has been
    /// received — never spuriously.
    pub fn recv(&self) -> Option<T> {
        self.inner.recv()
    }

    /// Close the channel
    ///
    /// Every currently parked receiver wakes and observes `None`. Values sent before
    /// the close remain receivable; once they are drained, every further call to
    /// [`recv`](Self::recv) returns `None` immediately. Any further call to
    /// [`send`](Self::send) fails. Idempotent: closing an already closed channel has
    /// no additional effect.
    pub fn close(&self) {
        self.inner.close()
    }

    /// Number of values currently buffered
    ///
    /// Values delivered by direct handoff never appear in this count.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no values are currently buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this channel has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Channel { inner: self.inner.clone() }
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Channel::new()
    }
}
