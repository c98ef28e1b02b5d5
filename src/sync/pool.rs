//! Growable object pools with stable addresses
//!
//! An [`ObjectPool`] hands out raw pointers to objects it owns. Backing
//! storage is a list of boxed chunks that is only ever appended to, so a
//! pointer stays valid for the life of the pool no matter how much the pool
//! grows. Capacity doubles on exhaustion.
//!
//! A pool is accessed by a single thread, but pointers may migrate: an object
//! popped from one thread's pool can be pushed into another's free list once
//! the object changes hands. Every object is still dropped exactly once, by
//! the chunk that owns it.

use std::cell::UnsafeCell;

/// Pool of reusable `T` slots
pub struct ObjectPool<T: Clone> {
    default: T,
    chunks: Vec<Box<[UnsafeCell<T>]>>,
    free: Vec<*mut T>,
    capacity: usize,
}

// Raw pointers suppress the auto trait; ownership semantics are those of
// `Vec<T>`, so sending the pool with its objects is sound.
unsafe impl<T: Clone + Send> Send for ObjectPool<T> {}

impl<T: Clone> ObjectPool<T> {
    /// A pool pre-filled with `initial_capacity` clones of `default`
    pub fn new(default: T, initial_capacity: usize) -> Self {
        let mut pool = Self {
            default,
            chunks: Vec::new(),
            free: Vec::new(),
            capacity: 0,
        };
        pool.grow(initial_capacity.max(1));
        pool
    }

    /// Total number of slots ever allocated
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently in the free list
    pub fn available(&self) -> usize {
        self.free.len()
    }

    fn grow(&mut self, count: usize) {
        let chunk: Box<[UnsafeCell<T>]> = (0..count)
            .map(|_| UnsafeCell::new(self.default.clone()))
            .collect();
        self.chunks.push(chunk);
        self.capacity += count;
        // Addresses into the boxed slice are stable; the chunks vector only
        // moves the box headers when it reallocates.
        let chunk = self.chunks.last().expect("chunk was just pushed");
        self.free.extend(chunk.iter().map(UnsafeCell::get));
    }

    /// Take a slot out of the pool, doubling the capacity when empty.
    ///
    /// The returned pointer is valid until the pool is dropped. The caller
    /// must return it through [`ObjectPool::push`] (on this pool or another
    /// pool of the same shutdown domain) before the pools are dropped, or
    /// simply leak it until shutdown; it must not be freed by hand.
    pub fn pop(&mut self) -> *mut T {
        if self.free.is_empty() {
            let current = self.capacity;
            self.grow(current);
        }
        self.free.pop().expect("free list was just refilled")
    }

    /// Return a slot to this pool's free list.
    ///
    /// The pointer must have originated from a pool whose backing storage is
    /// still alive, and must not be pushed while another holder can still
    /// reach it.
    pub fn push(&mut self, ptr: *mut T) {
        self.free.push(ptr);
    }
}
