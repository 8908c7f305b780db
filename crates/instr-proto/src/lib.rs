//! Wire codec for the instrument register protocol.
//!
//! This crate provides:
//! - [`Message`] / [`Reply`] types with frame encode/decode
//! - [`MessageKind`] and [`ErrorCode`] wire enumerations
//! - [`BoundedBytes`] fixed-capacity payload container
//!
//! Requests and replies share one frame shape:
//!
//! ```text
//! [kind, address, length, payload[0..length], checksum]
//! ```
//!
//! where `checksum` is the wrapping byte sum of every preceding byte.

pub mod bounded;
pub mod message;

pub use bounded::*;
pub use message::*;
