//! Process-level I/O: the PID-file singleton, signal delivery and detaching.

pub mod background;
pub mod instance;
pub mod signals;
