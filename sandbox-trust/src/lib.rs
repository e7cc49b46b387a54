//! Local SSH trust bootstrapping for ephemeral sandboxes.
//!
//! A self-hosted, two-sided certificate authority that lets the host
//! machine open password-less, TOFU-free SSH sessions into frequently
//! recreated sandboxes: a host authority signs each sandbox's host
//! certificate, a user authority signs the single user certificate, and
//! the client config / trust store wiring is kept idempotent under a
//! managed configuration root.

pub mod ca;
pub mod client_config;
pub mod config;
pub mod error;
pub mod issuer;
pub mod keygen;
pub mod known_hosts;
pub mod service;
pub mod store;

pub use ca::CertificateAuthority;
pub use client_config::{IncludeOutcome, PendingInclude};
pub use config::TrustConfig;
pub use error::{Result, TrustError};
pub use keygen::{KeyGenerator, OsKeyGenerator};
pub use service::{KeyBundle, LocalTrustService};
pub use store::{ConfigFileStore, DiskStore};

/// Default DNS suffix for sandbox hostnames.
pub const DEFAULT_SANDBOX_DOMAIN: &str = "test";
/// The fixed login principal inside every sandbox.
pub const SANDBOX_LOGIN_USER: &str = "root";
/// Default upper bound on the reachability probe.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
