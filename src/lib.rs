//! # Context Bridge - Cross-Context RPC
//!
//! Lets code in one isolated execution context call code in a privileged
//! context of the same host and get the result back asynchronously:
//! - Transport probing per call (privileged, restricted, unavailable)
//! - Direct calls over the host's native transport
//! - Proxied calls over a shared broadcast channel, matched by correlation id
//! - A relay that executes proxied calls on behalf of restricted contexts
//!
//! ## Architecture
//!
//! ```text
//!   restricted context             EventChannel            privileged context
//!  ┌───────────────────┐                                 ┌──────────────────┐
//!  │ Messenger         │ ── proxy-message ─────────────► │ RelayListener    │
//!  │   ProxyCaller     │                                 │   DirectCaller ──┼─► NativeTransport
//!  │   PendingCalls    │ ◄─ proxy-message-result ─────── │                  │
//!  └───────────────────┘                                 └──────────────────┘
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod caller;
pub mod channel;
pub mod client;
pub mod envelope;
pub mod message;
pub mod probe;
pub mod relay;
pub mod transport;
pub mod types;

// Internal utilities
pub mod observability;
pub mod validation;

pub use caller::{DirectCaller, ProxyCaller};
pub use channel::EventChannel;
pub use client::{CallOptions, Messenger, Route};
pub use message::{Message, RawMessage};
pub use probe::{EnvironmentProbe, HostEnvironment, TransportAvailability};
pub use relay::{RelayListener, RelayStats};
pub use transport::{LocalTransport, NativeTransport};
pub use types::{Config, Error, Result};
