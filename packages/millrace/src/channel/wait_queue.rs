// wait list part of the channel.
//
// a receiver that finds the buffer empty parks itself on a `WaitNode` placed on its
// own stack. the node is linked into the channel's `WaitQueue` while the channel lock
// is held, and the receiver then blocks on the node's private signal with the lock
// released. whichever send or close call unlinks the node becomes its single
// resolver: it writes the slot (send only) and fires the signal, both outside the
// channel lock.
//
// stack placement is sound because there is no way to cancel a pending receive: the
// owning recv call cannot return before the signal fires, and the resolver never
// touches the node after firing it, so every pointer to the node dies before the
// node does.

use std::{
    cell::UnsafeCell,
    ptr::NonNull,
    sync::{Condvar, Mutex},
};


// one-shot blocking signal, armed at construction.
pub(crate) struct Signal {
    notified: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    // construct armed.
    pub(crate) fn new() -> Self {
        Signal {
            notified: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    // block the calling thread until `notify` is called. if it already was, return
    // immediately.
    pub(crate) fn wait(&self) {
        let mut lock = self.notified.lock().unwrap();
        while !*lock {
            lock = self.cond.wait(lock).unwrap();
        }
    }

    // release the waiting thread. must be called at most once per signal.
    pub(crate) fn notify(&self) {
        let mut lock = self.notified.lock().unwrap();
        debug_assert!(!*lock);
        *lock = true;
        self.cond.notify_one();
    }
}

// node for one parked receiver.
pub(crate) struct WaitNode<T> {
    // slot for the delivered value. written at most once, by the node's resolver,
    // between unlinking the node and firing its signal. a populated slot doubles as
    // the "fulfilled" flag: an abandoned node wakes with the slot still empty.
    slot: UnsafeCell<Option<T>>,
    // next node towards the back of the wait list. while the node is linked, mutated
    // only under the channel lock; after a bulk unlink, owned by the draining call.
    next: UnsafeCell<Option<NonNull<WaitNode<T>>>>,
    // fired exactly once, by the resolver.
    signal: Signal,
}

impl<T> WaitNode<T> {
    // construct unlinked, with the signal armed and the slot empty.
    pub(crate) fn new() -> Self {
        WaitNode {
            slot: UnsafeCell::new(None),
            next: UnsafeCell::new(None),
            signal: Signal::new(),
        }
    }

    // block until resolved, then take the outcome: the delivered value, or none if
    // the node was abandoned by a close.
    pub(crate) fn block(&self) -> Option<T> {
        self.signal.wait();
        // safety: the signal has fired, so the resolver is done with this node and no
        // pointer to it will be dereferenced again.
        unsafe { (*self.slot.get()).take() }
    }

    // resolve the node with a value and release its parked receiver.
    //
    // UB if the caller is not the resolver that unlinked the node, or if called more
    // than once on a node.
    pub(crate) unsafe fn fulfill(node: NonNull<Self>, value: T) {
        *node.as_ref().slot.get() = Some(value);
        node.as_ref().signal.notify();
    }

    // release the node's parked receiver without a value, so it observes a close.
    //
    // UB if the caller is not the resolver that unlinked the node, or if called more
    // than once on a node.
    pub(crate) unsafe fn abandon(node: NonNull<Self>) {
        node.as_ref().signal.notify();
    }
}

// singly linked FIFO list of parked receivers, oldest at the front.
pub(crate) struct WaitQueue<T> {
    // front and back of the list, unless the list is empty.
    front_back: Option<(NonNull<WaitNode<T>>, NonNull<WaitNode<T>>)>,
}

impl<T> WaitQueue<T> {
    // construct empty.
    pub(crate) fn new() -> Self {
        WaitQueue { front_back: None }
    }

    // whether the list is empty.
    pub(crate) fn is_empty(&self) -> bool {
        self.front_back.is_none()
    }

    // link the node at the back of the list.
    //
    // UB if:
    //
    // - the node is already linked.
    // - the node dies before a resolver unlinks it and fires its signal.
    pub(crate) unsafe fn push(&mut self, node: NonNull<WaitNode<T>>) {
        debug_assert!((*node.as_ref().next.get()).is_none(), "UB");
        if let Some((_, ref mut back)) = self.front_back {
            *back.as_ref().next.get() = Some(node);
            *back = node;
        } else {
            self.front_back = Some((node, node));
        }
    }

    // unlink and return the oldest node, making the caller its resolver. the caller
    // must fulfill or abandon the node, exactly once.
    pub(crate) unsafe fn pop(&mut self) -> Option<NonNull<WaitNode<T>>> {
        let (front, back) = self.front_back?;
        self.front_back = (*front.as_ref().next.get()).take().map(|next| (next, back));
        Some(front)
    }

    // unlink every node, yielding them oldest first, making the caller their
    // resolver. the caller must fulfill or abandon each yielded node, exactly once.
    pub(crate) unsafe fn take_all(&mut self) -> Drained<T> {
        Drained { next: self.front_back.take().map(|(front, _)| front) }
    }
}

// nodes unlinked in bulk by `take_all`, still chained through their link fields.
pub(crate) struct Drained<T> {
    next: Option<NonNull<WaitNode<T>>>,
}

impl<T> Iterator for Drained<T> {
    type Item = NonNull<WaitNode<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        // safety: the link must be read before the yielded node is resolved; once its
        // signal fires the receiver may destroy it at any time. reading it here, before
        // returning the node to the caller, guarantees that order.
        self.next = unsafe { (*node.as_ref().next.get()).take() };
        Some(node)
    }
}

// safety: a WaitNode transfers a T by value from the resolving thread to the parked
// thread, and the linking protocol above never hands out overlapping access to the
// unsafe cells.
unsafe impl<T: Send> Send for WaitNode<T> {}
unsafe impl<T: Send> Sync for WaitNode<T> {}

unsafe impl<T: Send> Send for WaitQueue<T> {}
unsafe impl<T: Send> Sync for WaitQueue<T> {}

unsafe impl<T: Send> Send for Drained<T> {}


#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        thread,
        time::{Duration, Instant},
    };

    #[test]
    fn signal_notify_then_wait() {
        let signal = Signal::new();
        signal.notify();
        signal.wait();
    }

    #[test]
    fn signal_wakes_waiting_thread() {
        let signal = Signal::new();
        thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(50));
                signal.notify();
            });
            let start = Instant::now();
            signal.wait();
            assert!(start.elapsed() >= Duration::from_millis(40));
        });
    }

    #[test]
    fn unlinks_oldest_first() {
        let a = WaitNode::<u32>::new();
        let b = WaitNode::<u32>::new();
        let c = WaitNode::<u32>::new();
        let mut queue = WaitQueue::new();
        unsafe {
            queue.push(NonNull::from(&a));
            queue.push(NonNull::from(&b));
            queue.push(NonNull::from(&c));
            for value in 1..=3 {
                let node = queue.pop().unwrap();
                WaitNode::fulfill(node, value);
            }
            assert!(queue.pop().is_none());
        }
        assert!(queue.is_empty());
        assert_eq!(a.block(), Some(1));
        assert_eq!(b.block(), Some(2));
        assert_eq!(c.block(), Some(3));
    }

    #[test]
    fn take_all_abandons_in_order() {
        let a = WaitNode::<u32>::new();
        let b = WaitNode::<u32>::new();
        let mut queue = WaitQueue::new();
        unsafe {
            queue.push(NonNull::from(&a));
            queue.push(NonNull::from(&b));
            let drained: Vec<_> = queue.take_all().collect();
            assert_eq!(drained.len(), 2);
            assert_eq!(drained[0].as_ptr().cast_const(), &a as *const WaitNode<u32>);
            assert_eq!(drained[1].as_ptr().cast_const(), &b as *const WaitNode<u32>);
            for node in drained {
                WaitNode::abandon(node);
            }
        }
        assert!(queue.is_empty());
        assert_eq!(a.block(), None);
        assert_eq!(b.block(), None);
    }
}
