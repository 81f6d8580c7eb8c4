//! addrsync Core - Domain types and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `ContactSource`, `Addressbook`, `ParsedContact`, `ContactSuggestion`
//! - **Port definitions** - Traits for adapters: `IContactStore`, `IContactProvider`,
//!   `ICredentialProvider`, `IContactSearcher`
//! - **Configuration** - YAML-backed `Config`
//! - **vCard** - Minimal reader shared by CardDAV sync and the on-disk vCard cache
//!
//! # Architecture
//!
//! The domain module contains pure data and validation with no I/O.
//! Ports define trait interfaces that adapter crates implement.

pub mod config;
pub mod domain;
pub mod ports;
pub mod vcard;
