//! Device core for the virtual instrument.
//!
//! This crate provides:
//! - [`RegisterBank`]: the 16-register common bank every device carries
//! - [`DeviceCore`]: the message dispatcher driving the bank from host frames
//! - [`InstrumentTimer`]: the 64-bit microsecond clock behind the timestamp
//!   registers, with a free-running implementation and a manual one for tests
//! - [`HostLink`]: the byte-stream seam between the dispatcher and a transport

pub mod dispatch;
pub mod link;
pub mod registers;
pub mod timer;

pub use dispatch::*;
pub use link::*;
pub use registers::*;
pub use timer::*;
