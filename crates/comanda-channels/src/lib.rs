//! Comanda Channels — the transport session and everything that moves
//! messages through it.
//!
//! - **transport**: `Transport` / `SessionHandle` traits and transport events
//! - **whatsapp**: WebSocket client for the Baileys bridge
//! - **credentials**: `CredentialStore` and the JSON file store
//! - **session**: `SessionManager` — connection lifecycle and reconnects
//! - **dispatcher**: `Dispatcher` — timeout-bounded outbound sends
//! - **coalescer**: `Coalescer` — per-sender quiet-period batching
//! - **formatting**: Markdown → WhatsApp markup

pub mod coalescer;
pub mod credentials;
pub mod dispatcher;
pub mod formatting;
pub mod session;
pub mod transport;
pub mod whatsapp;

pub use coalescer::Coalescer;
pub use credentials::{CredentialStore, FileCredentialStore};
pub use dispatcher::{DispatchError, Dispatcher, OutboundSink};
pub use session::{ActiveSession, ReconnectPolicy, SessionManager, SessionState};
pub use transport::{CloseReason, SessionHandle, Transport, TransportError, TransportEvent};
pub use whatsapp::BridgeTransport;
