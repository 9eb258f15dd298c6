//! Authentication state: durable credentials and the in-memory session.
//!
//! This module provides:
//! - `CredentialStore`: async key-value storage for tokens and the user record,
//!   backed by the OS keyring (`KeyringStore`) or memory (`MemoryStore`)
//! - `SessionStore`: the observable logged-in state, kept in step with the
//!   client's refresh outcomes
//!
//! Tokens only ever live in the credential store and the client's default header.

pub mod credentials;
pub mod session;

pub use credentials::{
    CredentialStore, KeyringStore, MemoryStore, StoreError, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY,
    USER_KEY,
};
pub use session::{Session, SessionError, SessionStore};
