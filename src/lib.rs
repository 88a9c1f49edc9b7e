//! rtsync - real-time task synchronization core
//!
//! Two cooperating participants coordinate through semaphore signaling to
//! alternate strictly, exchange a value through an unguarded shared cell,
//! and serialize access to a shared output sink, while a measurement
//! harness times the synchronization primitives themselves.

pub mod config;
pub mod cycles;
pub mod instrumentation;
pub mod protocol;
pub mod scheduler;
pub mod session;
pub mod sink;
pub mod utils;
