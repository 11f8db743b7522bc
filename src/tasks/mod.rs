//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Expired sweep: purges expired entries at a configured interval. Reads
//!   already treat expired entries as misses, so the sweep only reclaims space.

mod sweep;

pub use sweep::spawn_sweep_task;
