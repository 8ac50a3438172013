//! feedbridge: bridge an AMQP topic exchange into WebSocket connections.
//!
//! A client connects to `/socket` and sends one text frame naming an
//! exchange and a list of topic patterns. The bridge declares the exchange,
//! creates an exclusive auto-delete queue bound to those patterns, sends a
//! fixed acknowledgment, and from then on forwards every delivery to the
//! client verbatim, in arrival order, until either side fails or closes.
//!
//! Each connection runs in its own task and owns its own broker session;
//! the only state shared across connections is an atomic count of live
//! connections. Faults on either endpoint end that connection and release
//! all of its broker resources. Nothing is retried; reconnection is the
//! client's job.

pub mod bridge;
pub mod broker;
pub mod cli;
pub mod config;
pub mod error;
pub mod registry;
pub mod server;
pub mod subscription;

pub use config::BridgeConfig;
pub use error::BridgeError;
pub use registry::ConnectionRegistry;
pub use subscription::SubscriptionDescriptor;
