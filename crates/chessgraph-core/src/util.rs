//! Small concurrency helpers.

pub mod sharded;
pub mod spinlock;
