//! The communication interface among a `medicare` device and its backend.
//!
//! This crate provides APIs to:
//!
//! - Describe the primitive types a device understands for its action
//!   parameters and reported fields.
//! - Encode the commands the backend publishes to a device and decode the
//!   results a device publishes back once a command has been executed.
//!   Each command carries a correlation token which a device must echo in its
//!   result, so that the backend can match an asynchronous reply to the
//!   request that caused it.
//! - Decode the telemetry values a device publishes on its own initiative.
//! - Build and parse the topics of the `medicare` publish/subscribe
//!   namespace. All topics are keyed by the device serial number, never by
//!   a database identifier.
//!
//! Data exchange between a device and the backend happens as `JSON` over a
//! publish/subscribe broker, so every payload is serializable and
//! deserializable.
//!
//! This crate can be compiled for both `std` and `no_std` environments.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![no_std]

extern crate alloc;

/// Commands sent to a device and the results it sends back.
pub mod command;
/// Error management.
pub mod error;
/// Topics of the publish/subscribe namespace.
pub mod topic;
/// Primitive value types.
pub mod value;
/// Telemetry values reported by a device.
pub mod values;

#[cfg(test)]
pub(crate) fn serialize<T: serde::Serialize>(value: T) -> serde_json::Value {
    serde_json::to_value(value).unwrap()
}

#[cfg(test)]
pub(crate) fn deserialize<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> T {
    serde_json::from_value(value).unwrap()
}
