//! nbstore - notebook storage on a flat object store.
//!
//! Notebooks are kept one object per notebook under a configurable key
//! prefix. A separate id → display-name index is rebuilt from object
//! metadata at startup. Hosts talk to the store through the
//! [`manager::StorageManager`] contract.
//!
//! # Modules
//!
//! - [`manager`] - Storage-manager contract and the object-store adapter
//! - [`index`] - Identity index (id → display name)
//! - [`notebook`] - Notebook documents and the JSON format
//! - [`storage`] - Object store trait and implementations
//! - [`commands`] - Operations shared by the CLI
//! - [`config`] - Configuration loading
//! - [`cli`] - Command-line interface definitions

pub mod cli;
pub mod commands;
pub mod config;
pub mod index;
pub mod manager;
pub mod notebook;
pub mod storage;
