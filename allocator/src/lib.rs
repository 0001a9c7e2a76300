//! Allocate memory from fixed pools.
//!
//! Two allocators share this crate, tuned for opposite workloads:
//!
//! - [FragmentAllocator] hands out variably sized, relocatable regions of one pool under a
//!   single mutex. Regions are addressed through [MutablePointer] handles, so an explicit
//!   [FragmentFreeOperator] pass can compact the pool without invalidating them. Suited to
//!   comparatively rare, large allocations (staging memory, device-adjacent buffers).
//! - [ScalablePoolAllocator] hands out small chunks of fixed size classes to many threads.
//!   Each thread allocates from and frees into its own blocks without locking; frees from
//!   other threads go through narrow per-size-class mailboxes.
//!
//! Both run over memory they allocate themselves or over a region borrowed from the caller,
//! and both report exhaustion as an ordinary, recoverable outcome.

pub mod error;
pub mod fragment;
mod pool;
pub mod scalable;

pub use error::Error;
pub use fragment::{FragmentAllocator, FragmentFreeOperator, MutablePointer};
pub use scalable::ScalablePoolAllocator;
