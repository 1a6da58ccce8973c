//! Comanda core — types, inbound bus, timers, and configuration shared by
//! the gateway crates.
//!
//! - **bus**: `InboundMessage`, `Payload`, the inbound `MessageBus`, and the `MessageLog`
//! - **timer**: `TimerRegistry`, keyed cancellable delayed callbacks
//! - **config**: schema + loader (`~/.comanda/config.json` and env overrides)
//! - **utils**: paths and address helpers

pub mod bus;
pub mod config;
pub mod timer;
pub mod utils;

pub use timer::TimerRegistry;
