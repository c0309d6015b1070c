//! Kata-Store: Filesystem Backend for the Practice Loop
//!
//! This crate provides the persistence layer for the kata training system.
//! All durable state lives in named JSON records under a single memory root,
//! written with a temp-file-plus-rename discipline so a crashed writer never
//! leaves a torn record behind.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: Atomic replacement, writer mutual exclusion, and corruption
//! detection.
//!
//! ## Key Components
//!
//! - `JsonStore`: Named JSON records with per-key write locking
//! - `CodeArchive`: Digest-addressed storage for generated program text
//! - `InstanceLock`: Pidfile guard keeping the memory root single-writer

mod archive;
mod error;
mod lock;
mod store;

pub use archive::CodeArchive;
pub use error::StoreError;
pub use lock::InstanceLock;
pub use store::JsonStore;

/// Result type for kata-store operations
pub type Result<T> = std::result::Result<T, StoreError>;
