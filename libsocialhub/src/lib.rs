//! Socialhub - platform adapters and reconciliation for social accounts
//!
//! This library connects accounts on Facebook, Instagram, Twitter,
//! LinkedIn, and YouTube behind one capability-based adapter surface,
//! manages their token lifecycles, and reconciles fetched pages into a
//! keyed local store.

pub mod config;
pub mod cursor;
pub mod error;
pub mod http;
pub mod logging;
pub mod platforms;
pub mod poll;
pub mod reconcile;
pub mod service;
pub mod store;
pub mod token;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use cursor::Cursor;
pub use error::{AdapterError, Result, RetryDecision, SocialError};
pub use platforms::{Capability, PlatformAdapter};
pub use reconcile::Reconciler;
pub use service::{SocialService, SyncPage};
pub use store::{MemoryStore, SqliteStore, Store};
pub use token::{TokenManager, TokenState};
pub use types::{Credential, Platform, PublishContent, SocialAccount};
