//! # Authentication Module
//!
//! Holds the signed-in session and hands out per-call credentials.
//!
//! ## Overview
//!
//! The host performs the provider's OAuth flow and passes the resulting
//! access token to [`AuthManager::sign_in`]. Every remote operation in the
//! core then asks the manager for a [`Credentials`](bridge_traits::Credentials)
//! snapshot and passes it explicitly down the call chain; nothing reads the
//! token from ambient state. When the provider rejects a token, callers
//! report it through [`AuthManager::invalidate`] so the UI can prompt for a
//! new sign-in.

pub mod error;
pub mod manager;
pub mod types;

pub use error::{AuthError, Result};
pub use manager::AuthManager;
pub use types::{AuthState, Session};
