//! Unbounded multi-producer multi-consumer FIFO channel.
//!
//! The channel never rejects a send for lack of capacity: values accumulate in a
//! chunked linked buffer that grows without bulk copies. A receiver that finds the
//! channel empty parks on its own private signal instead of spin-polling, and a
//! later send hands its value directly into the parked receiver's slot without
//! touching the buffer.
//!
//! ```
//! use millrace::Channel;
//!
//! let ch = Channel::new();
//! ch.send(1).unwrap();
//! ch.send(2).unwrap();
//! assert_eq!(ch.recv(), Some(1));
//!
//! // a receive on an empty channel blocks until a send arrives
//! let sender = {
//!     let ch = ch.clone();
//!     std::thread::spawn(move || ch.send(3).unwrap())
//! };
//! assert_eq!(ch.recv(), Some(2));
//! assert_eq!(ch.recv(), Some(3));
//! sender.join().unwrap();
//!
//! ch.close();
//! assert_eq!(ch.recv(), None);
//! ```

#[macro_use]
extern crate tracing;

mod channel;

pub use crate::channel::api::*;

/// Error types
pub mod error {
    pub use crate::channel::error::*;
}
