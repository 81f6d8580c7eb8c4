//! Minimal vCard reader
//!
//! Extracts what autocomplete needs from vCard 3.0/4.0 text: the formatted
//! name (`FN`, falling back to `N`) and every `EMAIL`. Handles line
//! unfolding, `itemN.` group prefixes, parameters (including quoted values)
//! and backslash escapes. Several cards may be concatenated in one text.

use crate::domain::{newtypes::normalize_email, ParsedContact};

/// The parts of a vCard relevant to contact rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VCard {
    pub uid: Option<String>,
    pub formatted_name: Option<String>,
    /// `N` rendered as "Prefix Given Additional Family Suffix"
    pub structured_name: Option<String>,
    /// Normalized, deduplicated addresses in document order
    pub emails: Vec<String>,
}

impl VCard {
    /// `FN` when present, else the rendered `N`, else empty
    pub fn display_name(&self) -> String {
        self.formatted_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.structured_name.as_deref())
            .unwrap_or_default()
            .to_string()
    }

    /// Expands the card into one row per email address
    pub fn into_contacts(self, href: &str, etag: &str) -> Vec<ParsedContact> {
        let name = self.display_name();
        self.emails
            .iter()
            .map(|email| ParsedContact::new(href, etag, email, name.clone()))
            .collect()
    }
}

/// Parses every `BEGIN:VCARD` ... `END:VCARD` block in `text`
///
/// Malformed lines are ignored; a block without `END` is still returned.
pub fn parse_vcards(text: &str) -> Vec<VCard> {
    let mut cards = Vec::new();
    let mut current: Option<VCard> = None;

    for line in unfold(text) {
        let Some((name, value)) = split_property(&line) else {
            continue;
        };

        match name.as_str() {
            "BEGIN" if value.eq_ignore_ascii_case("VCARD") => {
                if let Some(card) = current.take() {
                    cards.push(card);
                }
                current = Some(VCard::default());
            }
            "END" if value.eq_ignore_ascii_case("VCARD") => {
                if let Some(card) = current.take() {
                    cards.push(card);
                }
            }
            _ => {
                if let Some(card) = current.as_mut() {
                    apply_property(card, &name, value);
                }
            }
        }
    }

    if let Some(card) = current {
        cards.push(card);
    }
    cards
}

/// Parses `text` as a single resource and returns its rows
///
/// A CardDAV resource holds exactly one card; extra cards are merged so
/// no address is lost.
pub fn contacts_from_vcard(text: &str, href: &str, etag: &str) -> Vec<ParsedContact> {
    let mut rows: Vec<ParsedContact> = Vec::new();
    for card in parse_vcards(text) {
        for row in card.into_contacts(href, etag) {
            if !rows.iter().any(|r| r.email == row.email) {
                rows.push(row);
            }
        }
    }
    rows
}

/// Joins folded lines (CRLF or LF followed by a space or tab)
fn unfold(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in text.split('\n') {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if let Some(rest) = raw.strip_prefix([' ', '\t']) {
            if let Some(last) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        if !raw.trim().is_empty() {
            lines.push(raw.to_string());
        }
    }
    lines
}

/// Splits a content line into an uppercased property name and its raw value
///
/// Strips the group prefix and ignores parameters. The name/value separator
/// is the first `:` outside a quoted parameter value.
fn split_property(line: &str) -> Option<(String, &str)> {
    let mut in_quotes = false;
    let mut split_at = None;
    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ':' if !in_quotes => {
                split_at = Some(idx);
                break;
            }
            _ => {}
        }
    }
    let idx = split_at?;
    let (head, value) = (&line[..idx], &line[idx + 1..]);

    let name = head.split(';').next().unwrap_or(head);
    let name = name.rsplit('.').next().unwrap_or(name).trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_ascii_uppercase(), value.trim()))
}

fn apply_property(card: &mut VCard, name: &str, value: &str) {
    match name {
        "UID" => card.uid = Some(unescape(value)),
        "FN" => {
            let fn_value = unescape(value).trim().to_string();
            if !fn_value.is_empty() {
                card.formatted_name = Some(fn_value);
            }
        }
        "N" => {
            let parts = split_unescaped(value, ';');
            // N: Family;Given;Additional;Prefix;Suffix
            let order = [3, 1, 2, 0, 4];
            let rendered = order
                .iter()
                .filter_map(|&i| parts.get(i))
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if !rendered.is_empty() {
                card.structured_name = Some(rendered);
            }
        }
        "EMAIL" => {
            let email = normalize_email(&unescape(value));
            if email.contains('@') && !card.emails.contains(&email) {
                card.emails.push(email);
            }
        }
        _ => {}
    }
}

/// Resolves `\\`, `\,`, `\;` and `\n` escapes
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Splits on `sep` where it is not escaped, unescaping each component
fn split_unescaped(value: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for ch in value.chars() {
        if escaped {
            current.push('\\');
            current.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == sep {
            parts.push(unescape(&current));
            current.clear();
        } else {
            current.push(ch);
        }
    }
    if escaped {
        current.push('\\');
    }
    parts.push(unescape(&current));
    parts
}
