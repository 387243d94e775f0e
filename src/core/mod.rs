//! Core scheduler modules
//!
//! Contains kernel state, thread registration, preemption and time
//! accounting.

pub mod config;
pub mod critical;
pub mod error;
pub mod kernel;
pub mod types;
pub mod thread;
pub(crate) mod sched;
pub mod time;
pub mod cs_cell;
