//! The `medicare-backend` library crate provides the building blocks of a
//! backend which registers `medicare` devices, their types, fields,
//! actions and users, and which talks to the devices through a
//! publish/subscribe broker.
//!
//! Core functionalities of this crate include:
//!
//! - Describing, for each device type, the actions a device accepts and the
//!   fields it reports
//! - Building commands from a device-type-defined action and its typed
//!   parameters, and publishing them to the topic of a specific device
//! - Correlating the asynchronous results published by devices with the
//!   commands that caused them
//! - Relaying command results and live telemetry to every connected
//!   real-time client
//!
//! The HTTP request path and the broker path run concurrently on a `tokio`
//! multi-threaded runtime. The only state they share is the
//! [`correlation::CorrelationTable`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Command construction from a device type schema.
pub mod command;
/// Command line and environment configuration.
pub mod config;
/// Pending commands awaiting their results.
pub mod correlation;
/// Command dispatch towards devices.
pub mod dispatch;
/// Error management.
pub mod error;
/// Broadcast of events to real-time clients.
pub mod fanout;
/// HTTP surface.
pub mod http;
/// Entities and their input data.
pub mod model;
/// Rules deciding whether an action can be run on a device.
pub mod policy;
/// Read-only views over device type schemas.
pub mod registry;
/// Publish/subscribe transport adapter.
pub mod relay;
/// Entity storage.
pub mod store;
