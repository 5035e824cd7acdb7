// miele-api: Async Rust client for the Miele 3rd-party cloud API

pub mod auth;
pub mod client;
pub mod error;
pub mod events;
pub mod model;
pub mod transport;

pub use auth::{StaticTokenProvider, TokenProvider};
pub use client::MieleClient;
pub use error::Error;
pub use events::{EventHandlers, EventKind, ListenConfig, ListenerHandle};
pub use transport::{MIELE_API, TransportConfig};
