//! WebDAV request bodies and `207 Multi-Status` parsing
//!
//! Elements are matched by local name, so any namespace prefix a server
//! picks (`d:`, `D:`, `card:`, `C:`, none) is accepted. Properties are only
//! taken from `propstat` blocks whose status is 2xx (or absent).

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::RemoteError;

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// PROPFIND body asking for the authenticated principal
pub fn propfind_current_user_principal() -> String {
    format!(
        r#"{XML_HEADER}
<d:propfind xmlns:d="DAV:">
  <d:prop><d:current-user-principal/></d:prop>
</d:propfind>"#
    )
}

/// PROPFIND body asking a principal for its addressbook home set
pub fn propfind_addressbook_home_set() -> String {
    format!(
        r#"{XML_HEADER}
<d:propfind xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav">
  <d:prop><card:addressbook-home-set/></d:prop>
</d:propfind>"#
    )
}

/// PROPFIND body listing collections under a home set
pub fn propfind_collections() -> String {
    format!(
        r#"{XML_HEADER}
<d:propfind xmlns:d="DAV:">
  <d:prop><d:resourcetype/><d:displayname/></d:prop>
</d:propfind>"#
    )
}

/// `sync-collection` REPORT; an empty token requests the full state
pub fn sync_collection(sync_token: &str) -> String {
    let token = if sync_token.is_empty() {
        "<d:sync-token/>".to_string()
    } else {
        format!("<d:sync-token>{}</d:sync-token>", escape(sync_token))
    };
    format!(
        r#"{XML_HEADER}
<d:sync-collection xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav">
  {token}
  <d:sync-level>1</d:sync-level>
  <d:prop><d:getetag/><card:address-data/></d:prop>
</d:sync-collection>"#
    )
}

/// `addressbook-query` REPORT returning every card with its data
pub fn addressbook_query() -> String {
    format!(
        r#"{XML_HEADER}
<card:addressbook-query xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav">
  <d:prop><d:getetag/><card:address-data/></d:prop>
</card:addressbook-query>"#
    )
}

/// `addressbook-multiget` REPORT for the given hrefs
pub fn addressbook_multiget(hrefs: &[String]) -> String {
    let hrefs: String = hrefs
        .iter()
        .map(|h| format!("  <d:href>{}</d:href>\n", escape(h.as_str())))
        .collect();
    format!(
        r#"{XML_HEADER}
<card:addressbook-multiget xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav">
  <d:prop><d:getetag/><card:address-data/></d:prop>
{hrefs}</card:addressbook-multiget>"#
    )
}

/// One `<response>` element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DavResponse {
    pub href: String,
    /// Response-level status (sync-collection reports deletions as 404 here)
    pub status: Option<u16>,
    pub etag: Option<String>,
    pub address_data: Option<String>,
    pub display_name: Option<String>,
    pub is_addressbook: bool,
    pub is_collection: bool,
    pub current_user_principal: Option<String>,
    pub addressbook_home_sets: Vec<String>,
}

/// A parsed `<multistatus>` document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiStatus {
    pub responses: Vec<DavResponse>,
    pub sync_token: Option<String>,
}

/// Properties collected inside the current `propstat`
#[derive(Default)]
struct PendingProps {
    status: Option<u16>,
    etag: Option<String>,
    address_data: Option<String>,
    display_name: Option<String>,
    is_addressbook: bool,
    is_collection: bool,
    principal: Option<String>,
    home_sets: Vec<String>,
}

impl PendingProps {
    fn commit_into(self, response: &mut DavResponse) {
        if self.status.is_some_and(|s| !(200..300).contains(&s)) {
            return;
        }
        if self.etag.is_some() {
            response.etag = self.etag;
        }
        if self.address_data.is_some() {
            response.address_data = self.address_data;
        }
        if self.display_name.is_some() {
            response.display_name = self.display_name;
        }
        if self.principal.is_some() {
            response.current_user_principal = self.principal;
        }
        response.is_addressbook |= self.is_addressbook;
        response.is_collection |= self.is_collection;
        response.addressbook_home_sets.extend(self.home_sets);
    }
}

/// Extracts the numeric code from a status line such as `HTTP/1.1 404 Not Found`
pub fn parse_status_line(line: &str) -> Option<u16> {
    line.split_whitespace().nth(1)?.parse().ok()
}

/// Parses a multistatus body
pub fn parse_multistatus(body: &str) -> Result<MultiStatus, RemoteError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut result = MultiStatus::default();
    let mut stack: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut response: Option<DavResponse> = None;
    let mut props: Option<PendingProps> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match name.as_str() {
                    "response" => response = Some(DavResponse::default()),
                    "propstat" => props = Some(PendingProps::default()),
                    _ => {}
                }
                stack.push(name);
                text.clear();
            }
            Ok(Event::Empty(e)) => {
                let name = e.local_name();
                if stack.last().map(String::as_str) == Some("resourcetype") {
                    if let Some(p) = props.as_mut() {
                        match name.as_ref() {
                            b"addressbook" => p.is_addressbook = true,
                            b"collection" => p.is_collection = true,
                            _ => {}
                        }
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let value = t.unescape().map_err(|e| {
                    RemoteError::InvalidResponse(format!("Bad text in multistatus: {e}"))
                })?;
                text.push_str(&value);
            }
            Ok(Event::CData(c)) => {
                text.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Ok(Event::End(_)) => {
                let Some(name) = stack.pop() else {
                    continue;
                };
                let parent = stack.last().map(String::as_str).unwrap_or_default();
                let value = std::mem::take(&mut text).trim().to_string();

                match (name.as_str(), parent) {
                    ("href", "response") => {
                        if let Some(r) = response.as_mut() {
                            r.href = value;
                        }
                    }
                    ("href", "current-user-principal") => {
                        if let Some(p) = props.as_mut() {
                            p.principal = Some(value);
                        }
                    }
                    ("href", "addressbook-home-set") => {
                        if let Some(p) = props.as_mut() {
                            p.home_sets.push(value);
                        }
                    }
                    ("status", "response") => {
                        if let Some(r) = response.as_mut() {
                            r.status = parse_status_line(&value);
                        }
                    }
                    ("status", "propstat") => {
                        if let Some(p) = props.as_mut() {
                            p.status = parse_status_line(&value);
                        }
                    }
                    ("getetag", _) => {
                        if let Some(p) = props.as_mut() {
                            p.etag = Some(value);
                        }
                    }
                    ("address-data", _) => {
                        if let Some(p) = props.as_mut() {
                            p.address_data = Some(value);
                        }
                    }
                    ("displayname", _) => {
                        if let Some(p) = props.as_mut() {
                            p.display_name = Some(value);
                        }
                    }
                    ("sync-token", "multistatus") => result.sync_token = Some(value),
                    ("propstat", _) => {
                        if let (Some(p), Some(r)) = (props.take(), response.as_mut()) {
                            p.commit_into(r);
                        }
                    }
                    ("response", _) => {
                        if let Some(r) = response.take() {
                            result.responses.push(r);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(RemoteError::InvalidResponse(format!(
                    "Malformed multistatus at position {}: {e}",
                    reader.error_position()
                )))
            }
            _ => {}
        }
    }

    Ok(result)
}
