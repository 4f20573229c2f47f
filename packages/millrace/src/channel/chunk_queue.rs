// chunked buffer part of the channel.

use std::{
    mem::{self, size_of},
    ptr::{NonNull, drop_in_place},
    marker::PhantomData,
    alloc::{Layout, alloc, dealloc, handle_alloc_error},
};


// compute chunk capacity in elems.
pub(crate) const fn cap<T>() -> usize {
    elem_size_to_cap(size_of::<T>())
}

// compute chunk capacity in elems, given the byte size of an elem.
const fn elem_size_to_cap(elem_size: usize) -> usize {
    // "target" byte capacity of a chunk
    const IDEAL_CAP_BYTES: usize = 1024;

    if elem_size == 0 {
        // edge case: ZST
        //
        // `ChunkQueue` never allocates chunks for ZSTs, so this value is never used as a
        // real capacity. choose a value that would make any accidental use blow up at
        // runtime rather than silently work.
        usize::MAX
    } else {
        let n = IDEAL_CAP_BYTES / elem_size;
        if n < 1 {
            // edge case: elem larger than ideal chunk capacity
            1
        } else {
            n
        }
    }
}

// compute chunk layout and offset of elem array within chunk.
fn chunk_layout<T>() -> (Layout, usize) {
    let layout_meta = Layout::new::<ChunkMeta<T>>();
    let layout_elems = Layout::array::<T>(cap::<T>()).unwrap();
    layout_meta.extend(layout_elems).unwrap()
}

// non-null pointer to a heap allocated chunk.
//
// the layout of the heap allocation is basically that of a struct containing:
//
// - `ChunkMeta<T>`
// - `MaybeUninit<[T; cap::<T>()]>`
//
// due to current limitations of const expressions, we need to use this wrapper.
struct ChunkPtr<T>(NonNull<u8>, PhantomData<T>);

// content of a chunk other than the elements.
struct ChunkMeta<T> {
    // next chunk towards the tail. absent for the tail chunk. chunks are linked
    // strictly forward; which slots of a chunk are live is tracked by the queue's
    // consume and fill indices, not by the chunk itself.
    next: Option<ChunkPtr<T>>,
}

impl<T> ChunkPtr<T> {
    /// allocate on the heap and initialize as unlinked
    unsafe fn alloc() -> Self {
        let (layout, _) = chunk_layout::<T>();
        let Some(ptr) = NonNull::new(alloc(layout)) else { handle_alloc_error(layout) };
        (ptr.as_ptr() as *mut ChunkMeta<T>).write(ChunkMeta { next: None });
        ChunkPtr(ptr, PhantomData)
    }

    /// get mutable reference to chunk's ptr to the next chunk
    unsafe fn next(&self) -> &mut Option<ChunkPtr<T>> {
        &mut (&mut *(self.0.as_ptr() as *mut ChunkMeta<T>)).next
    }

    /// write elem into the slot at idx. assumes the slot is dead, or UB occurs.
    unsafe fn write(self, idx: usize, t: T) {
        debug_assert!(idx < cap::<T>());
        let (_, offset) = chunk_layout::<T>();
        (self.0.as_ptr().add(offset) as *mut T).add(idx).write(t);
    }

    /// move elem out of the slot at idx. assumes the slot is live, or UB occurs.
    unsafe fn read(self, idx: usize) -> T {
        debug_assert!(idx < cap::<T>());
        let (_, offset) = chunk_layout::<T>();
        (self.0.as_ptr().add(offset) as *const T).add(idx).read()
    }

    /// drop the elems in slots [live_start, live_end), then deallocate the chunk
    unsafe fn dealloc(self, live_start: usize, live_end: usize) {
        let (layout, offset) = chunk_layout::<T>();
        for idx in live_start..live_end {
            drop_in_place((self.0.as_ptr().add(offset) as *mut T).add(idx));
        }
        dealloc(self.0.as_ptr(), layout);
    }
}

impl<T> Clone for ChunkPtr<T> {
    fn clone(&self) -> Self {
        ChunkPtr(self.0, self.1)
    }
}

impl<T> Copy for ChunkPtr<T> {}

/// Chunked FIFO buffer of `T`.
///
/// Not itself concurrent; the channel guards it with its central mutex.
pub(crate) struct ChunkQueue<T> {
    /// total buffered elements. emptiness is tracked here, never inferred from the
    /// indices, which rest in ambiguous positions at exact chunk boundaries.
    len: usize,
    /// head and tail chunks, unless no chunks are linked yet.
    /// invariant: every linked chunk except the tail is filled through cap::<T>()
    head_tail: Option<(ChunkPtr<T>, ChunkPtr<T>)>,
    /// next slot of the head chunk to read. may rest at cap::<T>() after the head is
    /// consumed through its end; the next pop advances past the exhausted chunk.
    consume: usize,
    /// next slot of the tail chunk to write.
    fill: usize,
    /// a retired chunk kept to be relinked instead of allocating, at most one. keeps a
    /// queue whose length oscillates within one chunk from hitting the allocator on
    /// every crossing.
    spare: Option<ChunkPtr<T>>,
}

impl<T> ChunkQueue<T> {
    /// Construct empty
    pub(crate) fn new() -> Self {
        ChunkQueue { len: 0, head_tail: None, consume: 0, fill: 0, spare: None }
    }

    /// Elements in queue
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Push to tail
    pub(crate) fn push(&mut self, t: T) {
        unsafe {
            self.len += 1;
            if size_of::<T>() == 0 {
                // ZST special case: no chunk is ever allocated, t is dropped here, and
                // pop conjures replacement values out of thin air.
                return;
            }

            if let Some((_, tail)) = self.head_tail {
                if self.fill == cap::<T>() {
                    // tail has no free slot: link a fresh chunk as the new tail
                    let new_tail = self.spare.take().unwrap_or_else(|| ChunkPtr::alloc());
                    debug_assert!(new_tail.next().is_none());
                    *tail.next() = Some(new_tail);
                    self.head_tail.as_mut().unwrap().1 = new_tail;
                    new_tail.write(0, t);
                    self.fill = 1;
                } else {
                    tail.write(self.fill, t);
                    self.fill += 1;
                }
            } else {
                // first push links the initial chunk
                let chunk = self.spare.take().unwrap_or_else(|| ChunkPtr::alloc());
                debug_assert!(chunk.next().is_none());
                chunk.write(0, t);
                self.head_tail = Some((chunk, chunk));
                self.consume = 0;
                self.fill = 1;
            }
        }
    }

    /// Pop from head
    pub(crate) fn pop(&mut self) -> Option<T> {
        unsafe {
            if self.len == 0 { return None; }
            self.len -= 1;
            if size_of::<T>() == 0 {
                // ZST special case
                //
                // this is fine, because:
                //
                // - T is a ZST, so there are no bytes to fabricate; the value carries
                //   no data.
                //
                // - the length was greater than 0, so at some point an instance of T
                //   was passed to `push`, so T is not an uninhabited type and does have
                //   a possible value.
                return Some(mem::zeroed());
            }

            // a previous pop may have consumed the head chunk through its end before a
            // successor existed. advance past it now; len > 0 guarantees the remaining
            // elems live in a later chunk, so a successor has since been linked.
            if self.consume == cap::<T>() {
                let (head, _) = self.head_tail.unwrap();
                let next = head.next().take().unwrap();
                self.head_tail.as_mut().unwrap().0 = next;
                self.consume = 0;
                self.retire(head);
            }

            let (head, _) = self.head_tail.unwrap();
            let t = head.read(self.consume);
            self.consume += 1;
            Some(t)
        }
    }

    // stash a fully consumed, unlinked chunk for reuse, or free it if the spare slot
    // is already occupied.
    unsafe fn retire(&mut self, chunk: ChunkPtr<T>) {
        debug_assert!(chunk.next().is_none());
        if self.spare.is_none() {
            self.spare = Some(chunk);
        } else {
            chunk.dealloc(0, 0);
        }
    }
}

impl<T> Drop for ChunkQueue<T> {
    fn drop(&mut self) {
        unsafe {
            if let Some(spare) = self.spare {
                spare.dealloc(0, 0);
            }

            let mut next = self.head_tail.map(|(head, _)| head);
            let mut live_start = self.consume;
            while let Some(curr) = next {
                next = *curr.next();
                let live_end = if next.is_none() { self.fill } else { cap::<T>() };
                curr.dealloc(live_start, live_end);
                live_start = 0;
            }
        }
    }
}

unsafe impl<T: Send> Send for ChunkQueue<T> {}
unsafe impl<T: Sync> Sync for ChunkQueue<T> {}


#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::VecDeque,
        cmp::min,
        sync::{
            atomic::{AtomicUsize, Ordering::Relaxed},
            Arc,
        },
    };
    use rand::prelude::*;
    use rand_pcg::Pcg32;

    fn new_rng() -> impl Rng {
        Pcg32::from_seed(0x5eed5eed5eed5eed5eed5eed5eed5eedu128.to_le_bytes())
    }

    fn make_elem<const ELEM_SIZE: usize>(i: u32) -> [u8; ELEM_SIZE] {
        let mut elem = [0; ELEM_SIZE];
        let useable_len = min(ELEM_SIZE, 4);
        (&mut elem[..useable_len]).copy_from_slice(&i.to_ne_bytes()[..useable_len]);
        elem
    }

    fn elem_size_test<const ELEM_SIZE: usize>() {
        let mut rng = new_rng();

        for _ in 0..20 {
            let mut reference = VecDeque::<[u8; ELEM_SIZE]>::new();
            let mut queue = ChunkQueue::<[u8; ELEM_SIZE]>::new();
            for i in 0u32..5_000 {
                if rng.gen_ratio(52, 100) {
                    let elem = make_elem(i);
                    reference.push_back(elem);
                    queue.push(elem);
                } else {
                    assert_eq!(queue.pop(), reference.pop_front());
                }
                assert_eq!(queue.len(), reference.len());
            }
        }
    }

    macro_rules! equivalence_size_tests {
        ($($t:ident $n:expr,)*)=>{
            mod equivalence_size_tests {
                use super::*;

                $(
                    #[test]
                    fn $t() {
                        elem_size_test::<$n>();
                    }
                )*
            }
        };
    }

    equivalence_size_tests!(
        _0 0,
        _1 1,
        _3 3,
        _4 4,
        _8 8,
        _16 16,
        _100 100,
        _1024 1024,
        _2048 2048,
    );

    #[test]
    fn chunk_boundary_order() {
        let mut queue = ChunkQueue::<u64>::new();
        for i in 0..cap::<u64>() as u64 + 1 {
            queue.push(i);
        }
        for i in 0..cap::<u64>() as u64 + 1 {
            assert_eq!(queue.pop(), Some(i));
        }
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn exact_chunk_drain_then_refill() {
        let mut queue = ChunkQueue::<u64>::new();
        for i in 0..cap::<u64>() as u64 {
            queue.push(i);
        }
        for i in 0..cap::<u64>() as u64 {
            assert_eq!(queue.pop(), Some(i));
        }
        assert_eq!(queue.pop(), None);

        // the head chunk is now consumed through its end with no successor. pushing
        // must link a new chunk and popping must advance past the exhausted one.
        queue.push(7);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop(), Some(7));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn retires_into_spare() {
        let mut queue = ChunkQueue::<u64>::new();
        for i in 0..cap::<u64>() as u64 + 1 {
            queue.push(i);
        }
        for i in 0..cap::<u64>() as u64 + 1 {
            assert_eq!(queue.pop(), Some(i));
        }
        assert!(queue.spare.is_some());
    }

    struct DropTally(Arc<AtomicUsize>);

    impl Drop for DropTally {
        fn drop(&mut self) {
            self.0.fetch_add(1, Relaxed);
        }
    }

    #[test]
    fn drops_live_elems() {
        let tally = Arc::new(AtomicUsize::new(0));
        let mut queue = ChunkQueue::new();
        for _ in 0..300 {
            queue.push(DropTally(Arc::clone(&tally)));
        }
        for _ in 0..100 {
            queue.pop().unwrap();
        }
        assert_eq!(tally.load(Relaxed), 100);
        drop(queue);
        assert_eq!(tally.load(Relaxed), 300);
    }
}
