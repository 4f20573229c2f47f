// locked core of the channel. the exposed API is a thin wrapper around this.

use super::{
    chunk_queue::ChunkQueue,
    wait_queue::{WaitNode, WaitQueue},
};
use std::{
    ptr::NonNull,
    sync::{
        atomic::{AtomicBool, Ordering::Relaxed},
        Arc,
        Mutex,
    },
};


// handle to a channel.
pub(crate) struct Channel<T>(Arc<Shared<T>>);

// channel shared state.
struct Shared<T> {
    // mutex around lockable state. every critical section under it is O(1) pointer
    // and index mutation; nothing blocks while holding it.
    lockable: Mutex<Lockable<T>>,

    // mirror of Lockable.closed for checking without locking. transitions false to
    // true exactly once, under the lock. the lockable copy is authoritative.
    closed: AtomicBool,
}

// channel lockable state.
struct Lockable<T> {
    // buffered elements.
    elems: ChunkQueue<T>,
    // parked receivers, oldest first.
    // invariant: non-empty only while elems is empty and the channel is open.
    waiters: WaitQueue<T>,
    // whether close has been called.
    closed: bool,
}

impl<T> Channel<T> {
    // construct empty and open.
    pub(crate) fn new() -> Self {
        Channel(Arc::new(Shared {
            lockable: Mutex::new(Lockable {
                elems: ChunkQueue::new(),
                waiters: WaitQueue::new(),
                closed: false,
            }),
            closed: AtomicBool::new(false),
        }))
    }

    // clone another handle to the channel.
    pub(crate) fn clone(&self) -> Self {
        Channel(Arc::clone(&self.0))
    }

    // whether close has been called.
    pub(crate) fn is_closed(&self) -> bool {
        self.0.closed.load(Relaxed)
    }

    // number of buffered elements.
    pub(crate) fn len(&self) -> usize {
        self.0.lockable.lock().unwrap().elems.len()
    }

    // enqueue a value, or hand it directly to the oldest parked receiver. gives the
    // value back if the channel is closed.
    pub(crate) fn send(&self, value: T) -> Result<(), T> {
        // check the closed mirror before locking; closing is one-way, so a set flag
        // can be trusted without the lock.
        if self.0.closed.load(Relaxed) {
            return Err(value);
        }

        let mut lock = self.0.lockable.lock().unwrap();
        if lock.closed {
            return Err(value);
        }

        // a parked receiver implies the buffer is empty. hand the value straight into
        // its slot rather than growing the buffer, so that no value can overtake
        // another across the two delivery paths.
        // safety: unlinking the node under the lock makes this call its single
        // resolver, and the parked receiver keeps the node alive until the signal
        // fires.
        if let Some(node) = unsafe { lock.waiters.pop() } {
            debug_assert_eq!(lock.elems.len(), 0);
            drop(lock);
            unsafe { WaitNode::fulfill(node, value); }
            return Ok(());
        }

        lock.elems.push(value);
        Ok(())
    }

    // dequeue the oldest value, parking the calling thread until one arrives.
    // returns none once the channel is closed and drained.
    pub(crate) fn recv(&self) -> Option<T> {
        let mut lock = self.0.lockable.lock().unwrap();

        if let Some(value) = lock.elems.pop() {
            return Some(value);
        }
        if lock.closed {
            return None;
        }

        // buffer empty, channel open: park. the emptiness check and the registration
        // happen under one lock acquisition, so a concurrent send cannot slip between
        // them unobserved.
        let node = WaitNode::new();
        // safety: we block on the node's signal before returning, so the node outlives
        // its registration however it gets resolved.
        unsafe { lock.waiters.push(NonNull::from(&node)); }
        drop(lock);
        node.block()
    }

    // close the channel, releasing every parked receiver empty-handed. idempotent:
    // the wait list is emptied on the first call, so no node can be resolved twice.
    pub(crate) fn close(&self) {
        let mut lock = self.0.lockable.lock().unwrap();
        if lock.closed {
            return;
        }
        lock.closed = true;
        self.0.closed.store(true, Relaxed);
        // safety: taking the whole list under the lock makes this call the single
        // resolver of every node in it.
        let drained = unsafe { lock.waiters.take_all() };
        debug_assert!(lock.waiters.is_empty());
        drop(lock);

        let mut released = 0usize;
        for node in drained {
            unsafe { WaitNode::abandon(node); }
            released += 1;
        }
        trace!(released, "channel closed");
    }
}
