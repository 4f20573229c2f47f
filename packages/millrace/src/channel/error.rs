// channel error types.

use thiserror::Error;


/// Error for trying to send into a channel that has been closed
///
/// Carries the rejected value back to the caller. Sending into a channel the caller
/// knows is closed is a contract violation; the channel never retries internally, and
/// callers should treat this as a programming error to abort on or propagate.
///
/// The closed-and-drained outcome of a receive is not an error; it is reported as
/// `None`.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
#[error("send on closed channel")]
pub struct SendError<T> {
    /// The value that could not be sent
    pub value: T,
}

impl<T> SendError<T> {
    /// Recover the value that could not be sent
    pub fn into_value(self) -> T {
        self.value
    }
}
