//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the traits the sync engine depends on; adapter crates
//! implement them.
//!
//! ## Ports Overview
//!
//! - [`IContactStore`] - Persistent storage for sources, addressbooks and synced contacts
//! - [`IContactProvider`] / [`ICardDavProvider`] - Remote contact protocols
//! - [`IProviderFactory`] - Builds protocol clients from credentials
//! - [`ICredentialProvider`] - OAuth tokens and CardDAV passwords
//! - [`IContactSearcher`] / [`ILocalContactStore`] - Autocomplete backends

pub mod contact_provider;
pub mod contact_searcher;
pub mod contact_store;
pub mod credentials;

pub use contact_provider::{
    ICardDavProvider, IContactProvider, IProviderFactory, RemoteContactBatch,
};
pub use contact_searcher::{IContactSearcher, ILocalContactStore};
pub use contact_store::{BatchReport, IContactStore};
pub use credentials::ICredentialProvider;
