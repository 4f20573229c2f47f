// implementation of the millrace channel.
//
// the basic architecture is as such:
//
// channel handles wrap around Arc<shared state>
//                                      |
//          /---------------------------/
//          v
//       shared state = one Mutex<lockable state> + an atomic mirror of the closed flag
//          |
//          |------ the lockable state contains a chunk_queue::ChunkQueue<T>, an
//          |       externally-safe, not-itself-concurrent chunked buffer holding the
//          |       elements that no receiver was parked for
//          |
//          \------ it also contains a wait_queue::WaitQueue<T>:
//
//                  a linked FIFO list of nodes, each corresponding to one receiver
//                  currently parked on an empty channel. a node lives on its
//                  receiver's stack and owns a private one-shot signal. a sender
//                  that finds the list non-empty unlinks the oldest node and delivers
//                  its value directly into the node's slot, bypassing the buffer;
//                  close unlinks every node and releases them empty-handed.
//
// the single mutex is the only point of serialization. critical sections under it are
// all O(1) pointer and index mutation; the only place a thread ever blocks is on its
// own node's signal, strictly after releasing the mutex, so one parked receiver can
// never stall other senders or receivers.
//
// the organization of these modules is as such:
//
//      These are used like
//      library utilities:
//    /---------------------\
//
//      chunk_queue<------------core: owns the locking protocol. everything unsafe
//                    |         ^     about node lifetimes is resolved here.
//      wait_queue<---/         |
//                              |
//                             api: thin, documented public wrapper around core. the
//                                  crate re-exports this publically.
//
// there is also the error module, which contains the relevant error types, which is
// also re-exported publically.

pub(crate) mod error;
pub(crate) mod api;

mod chunk_queue;
mod wait_queue;
mod core;
