//! Lock-free work distribution primitives
//!
//! The scheduler circulates raw pointers to pool-owned task objects through a
//! lock-free stack. The pools never release memory while a solve is running,
//! which keeps every handed-out pointer valid and rules out ABA reuse hazards
//! on the stack nodes.

pub mod pool;
pub mod stack;

pub use pool::ObjectPool;
pub use stack::ConcurrentStack;
