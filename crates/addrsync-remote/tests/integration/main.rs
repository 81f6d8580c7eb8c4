//! Integration tests for addrsync-remote
//!
//! Uses wiremock to simulate CardDAV servers, the Google People API and
//! Microsoft Graph, and checks the batches each client produces.

mod common;

mod test_carddav;
mod test_google;
mod test_microsoft;
