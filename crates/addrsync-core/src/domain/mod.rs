//! Domain entities
//!
//! - Newtypes for identifiers and validated email addresses
//! - Contact sources and their sync status
//! - Addressbooks, contact rows and autocomplete suggestions
//! - Domain-specific error types

pub mod contact;
pub mod errors;
pub mod newtypes;
pub mod source;

pub use contact::{
    Addressbook, ContactSuggestion, DiscoveredAddressbook, LocalContact, ParsedContact,
    SuggestionSource, SyncedContact, VIRTUAL_ADDRESSBOOK_PATH,
};
pub use errors::DomainError;
pub use newtypes::*;
pub use source::{ContactSource, SourceType};
