//! Lock-free LIFO task stack
//!
//! A Treiber stack whose nodes come from per-thread [`ObjectPool`]s. Pushes
//! publish with release semantics, pops claim the head with acquire/release,
//! and every operation is a single compare-and-swap on the head pointer.
//! Nodes are never freed while the stack is alive, so a node address always
//! points at a valid `StackNode`.
//!
//! A sentinel node whose `prev` points at itself marks the empty stack:
//! popping the sentinel swaps it for itself and reports the stack empty.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicPtr, Ordering};

use super::ObjectPool;

/// One link in the stack. `value` is null only on the sentinel.
pub struct StackNode<T> {
    prev: *mut StackNode<T>,
    value: *mut T,
}

impl<T> Clone for StackNode<T> {
    fn clone(&self) -> Self {
        Self {
            prev: self.prev,
            value: self.value,
        }
    }
}

impl<T> Default for StackNode<T> {
    fn default() -> Self {
        Self {
            prev: std::ptr::null_mut(),
            value: std::ptr::null_mut(),
        }
    }
}

/// Lock-free stack of `*mut T` with per-thread node pools
pub struct ConcurrentStack<T> {
    top: AtomicPtr<StackNode<T>>,
    pools: Vec<UnsafeCell<ObjectPool<StackNode<T>>>>,
}

// Safety invariant: pool slot `i` is only touched through calls that pass
// `thread_num == i`, and each worker uses a unique thread number. The head
// pointer itself is atomic.
unsafe impl<T: Send> Sync for ConcurrentStack<T> {}
unsafe impl<T: Send> Send for ConcurrentStack<T> {}

const INITIAL_NODES_PER_THREAD: usize = 1024;

impl<T> ConcurrentStack<T> {
    /// A stack serving `num_threads` workers
    pub fn new(num_threads: usize) -> Self {
        let mut pools: Vec<UnsafeCell<ObjectPool<StackNode<T>>>> = (0..num_threads.max(1))
            .map(|_| {
                UnsafeCell::new(ObjectPool::new(
                    StackNode::default(),
                    INITIAL_NODES_PER_THREAD,
                ))
            })
            .collect();

        // Sentinel: value-less node that is its own predecessor
        let sentinel = pools[0].get_mut().pop();
        unsafe {
            (*sentinel).prev = sentinel;
            (*sentinel).value = std::ptr::null_mut();
        }
        Self {
            top: AtomicPtr::new(sentinel),
            pools,
        }
    }

    /// Number of worker slots this stack was built for
    pub fn num_threads(&self) -> usize {
        self.pools.len()
    }

    /// Push `value` using thread `thread_num`'s node pool.
    ///
    /// # Safety contract
    /// `thread_num` must be the caller's own unique worker index.
    pub fn push(&self, thread_num: usize, value: *mut T) {
        debug_assert!(!value.is_null());
        let node = unsafe { (*self.pools[thread_num].get()).pop() };
        unsafe {
            (*node).value = value;
            (*node).prev = self.top.load(Ordering::Relaxed);
        }
        loop {
            let prev = unsafe { (*node).prev };
            match self
                .top
                .compare_exchange_weak(prev, node, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(current) => unsafe { (*node).prev = current },
            }
        }
    }

    /// Pop the most recently pushed value, or `None` when the stack is empty.
    /// The freed node is recycled into thread `thread_num`'s pool.
    ///
    /// # Safety contract
    /// `thread_num` must be the caller's own unique worker index.
    pub fn pop(&self, thread_num: usize) -> Option<*mut T> {
        let mut old_top = self.top.load(Ordering::Acquire);
        loop {
            let prev = unsafe { (*old_top).prev };
            match self
                .top
                .compare_exchange_weak(old_top, prev, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(current) => old_top = current,
            }
        }
        let value = unsafe { (*old_top).value };
        if value.is_null() {
            // Sentinel: the swap re-installed it; the stack was empty
            None
        } else {
            unsafe { (*self.pools[thread_num].get()).push(old_top) };
            Some(value)
        }
    }

    /// Whether the stack currently holds no values. Racy by nature; used only
    /// for idle/termination checks.
    pub fn is_empty(&self) -> bool {
        let top = self.top.load(Ordering::Acquire);
        unsafe { (*top).value.is_null() }
    }
}
