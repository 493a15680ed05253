//! Electomart Core - Shared types and domain rules.
//!
//! This crate provides the types and pure business rules used across all
//! Electomart components:
//! - `api` - REST API serving the storefront client and admin back-office
//! - `cli` - Command-line tools for migrations, seeding and user management
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Everything here can be unit tested without a
//! running database.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, money, emails, and enums
//! - [`domain`] - Cart reconciliation, pricing, review aggregation, paging

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod domain;
pub mod types;

pub use types::*;
