#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod gateway;
pub mod manager;
mod refresh;
pub mod session;
pub mod store;
pub mod types;
pub mod wire;

// Re-exports for convenient access
pub use config::Config;
pub use error::Error;
pub use gateway::{ApiRequest, Method, RequestGateway};
pub use manager::SessionManager;
pub use session::{Phase, Transition};
#[cfg(feature = "file-store")]
pub use store::FileStore;
pub use store::{CredentialStore, MemoryStore, StoredSession};
pub use types::{CredentialPair, UserId, UserProfile};
pub use wire::NewAccount;
