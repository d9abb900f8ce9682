#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Parsing, querying, and serialization for HTTP `Link` response headers.
//!
//! A raw header value such as `</users?page=2>; rel=next; title="Next page"`
//! parses into a [`LinkSet`] of [`LinkDefinition`]s that preserve header
//! order. Definitions can be queried by relation and serialized back to
//! their header-line form for diagnostics.

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum LinkHeaderParseError {
    #[error("expected '<' to start a link target at offset {0}")]
    MissingTarget(usize),
    #[error("unterminated link target starting at offset {0}")]
    UnterminatedTarget(usize),
    #[error("unterminated quoted string starting at offset {0}")]
    UnterminatedQuote(usize),
    #[error("invalid percent-encoding in link target at offset {0}")]
    InvalidTargetEncoding(usize),
}

/// One parsed link: target URI, relation, optional title, and any other
/// parameters carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDefinition {
    pub uri: String,
    pub rel: String,
    pub title: Option<String>,
    pub params: BTreeMap<String, String>,
}

impl LinkDefinition {
    #[must_use]
    pub fn new(uri: impl Into<String>, rel: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            rel: rel.into(),
            title: None,
            params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Whitespace-separated relation names. A `rel="next last"` attribute
    /// names two relations.
    pub fn rel_names(&self) -> impl Iterator<Item = &str> {
        self.rel.split_whitespace()
    }

    /// Whether any of this link's relation names matches `rel`
    /// (case-insensitively, per RFC 8288).
    #[must_use]
    pub fn has_rel(&self, rel: &str) -> bool {
        self.rel_names().any(|name| name.eq_ignore_ascii_case(rel))
    }

    /// Serialize back to header-line form. The target URI is
    /// percent-encoded; parameter values are quoted when they contain
    /// non-token characters.
    #[must_use]
    pub fn to_header(&self) -> String {
        let mut out = format!("<{}>", urlencoding::encode(&self.uri));
        out.push_str("; rel=");
        out.push_str(&format_param_value(&self.rel));
        if let Some(title) = &self.title {
            out.push_str("; title=");
            out.push_str(&format_param_value(title));
        }
        for (name, value) in &self.params {
            out.push_str("; ");
            out.push_str(name);
            out.push('=');
            out.push_str(&format_param_value(value));
        }
        out
    }
}

impl fmt::Display for LinkDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_header())
    }
}

/// An ordered collection of links parsed from one `Link` header value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSet {
    refs: Vec<LinkDefinition>,
}

impl LinkSet {
    /// Parse a raw `Link` header value.
    ///
    /// Quoted parameter values may contain commas and semicolons; the
    /// target URI is percent-decoded so that a serialized set parses back
    /// to its original targets.
    ///
    /// # Errors
    ///
    /// * [`LinkHeaderParseError::MissingTarget`] if a link does not start with `<`
    /// * [`LinkHeaderParseError::UnterminatedTarget`] if a `<` has no matching `>`
    /// * [`LinkHeaderParseError::UnterminatedQuote`] if a quoted value never closes
    /// * [`LinkHeaderParseError::InvalidTargetEncoding`] if the target decodes to invalid UTF-8
    pub fn parse(raw: &str) -> Result<Self, LinkHeaderParseError> {
        Parser::new(raw).parse_all()
    }

    #[must_use]
    pub fn refs(&self) -> &[LinkDefinition] {
        &self.refs
    }

    /// Links matching the given relation name, in header order.
    #[must_use]
    pub fn relations(&self, rel: &str) -> Vec<&LinkDefinition> {
        self.refs.iter().filter(|def| def.has_rel(rel)).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    #[must_use]
    pub fn to_header(&self) -> String {
        self.refs
            .iter()
            .map(LinkDefinition::to_header)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromIterator<LinkDefinition> for LinkSet {
    fn from_iter<T: IntoIterator<Item = LinkDefinition>>(iter: T) -> Self {
        Self {
            refs: iter.into_iter().collect(),
        }
    }
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-._~!#$%&'*+^`|".contains(c)
}

fn format_param_value(value: &str) -> String {
    if !value.is_empty() && value.chars().all(is_token_char) {
        value.to_string()
    } else {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    }
}

struct Parser<'a> {
    raw: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            raw,
            chars: raw.chars().collect(),
            pos: 0,
        }
    }

    fn parse_all(mut self) -> Result<LinkSet, LinkHeaderParseError> {
        let mut refs = vec![];
        loop {
            self.skip_separators();
            if self.pos >= self.chars.len() {
                break;
            }
            refs.push(self.parse_link()?);
        }
        log::trace!("parsed {count} links from {raw:?}", count = refs.len(), raw = self.raw);
        Ok(LinkSet { refs })
    }

    fn skip_separators(&mut self) {
        while self
            .chars
            .get(self.pos)
            .is_some_and(|c| c.is_whitespace() || *c == ',')
        {
            self.pos += 1;
        }
    }

    fn skip_whitespace(&mut self) {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn parse_link(&mut self) -> Result<LinkDefinition, LinkHeaderParseError> {
        let start = self.pos;
        if self.chars.get(self.pos) != Some(&'<') {
            return Err(LinkHeaderParseError::MissingTarget(self.pos));
        }
        self.pos += 1;
        let uri_start = self.pos;
        while self.chars.get(self.pos).is_some_and(|c| *c != '>') {
            self.pos += 1;
        }
        if self.pos >= self.chars.len() {
            return Err(LinkHeaderParseError::UnterminatedTarget(start));
        }
        let encoded: String = self.chars[uri_start..self.pos].iter().collect();
        let uri = urlencoding::decode(&encoded)
            .map_err(|_| LinkHeaderParseError::InvalidTargetEncoding(uri_start))?
            .into_owned();
        self.pos += 1;

        let mut def = LinkDefinition::new(uri, String::new());
        loop {
            self.skip_whitespace();
            if self.chars.get(self.pos) == Some(&';') {
                self.pos += 1;
                self.parse_param(&mut def)?;
            } else {
                break;
            }
        }
        Ok(def)
    }

    fn parse_param(&mut self, def: &mut LinkDefinition) -> Result<(), LinkHeaderParseError> {
        self.skip_whitespace();
        let name_start = self.pos;
        while self
            .chars
            .get(self.pos)
            .is_some_and(|c| *c != '=' && *c != ';' && *c != ',' && !c.is_whitespace())
        {
            self.pos += 1;
        }
        let name: String = self.chars[name_start..self.pos]
            .iter()
            .collect::<String>()
            .to_ascii_lowercase();
        self.skip_whitespace();

        let value = if self.chars.get(self.pos) == Some(&'=') {
            self.pos += 1;
            self.skip_whitespace();
            if self.chars.get(self.pos) == Some(&'"') {
                self.parse_quoted()?
            } else {
                let value_start = self.pos;
                while self
                    .chars
                    .get(self.pos)
                    .is_some_and(|c| *c != ';' && *c != ',' && !c.is_whitespace())
                {
                    self.pos += 1;
                }
                self.chars[value_start..self.pos].iter().collect()
            }
        } else {
            String::new()
        };

        if name.is_empty() {
            return Ok(());
        }

        // First occurrence of an attribute wins, per RFC 8288.
        match name.as_str() {
            "rel" => {
                if def.rel.is_empty() {
                    def.rel = value;
                }
            }
            "title" => {
                if def.title.is_none() {
                    def.title = Some(value);
                }
            }
            _ => {
                def.params.entry(name).or_insert(value);
            }
        }
        Ok(())
    }

    fn parse_quoted(&mut self) -> Result<String, LinkHeaderParseError> {
        let start = self.pos;
        self.pos += 1;
        let mut value = String::new();
        loop {
            match self.chars.get(self.pos) {
                None => return Err(LinkHeaderParseError::UnterminatedQuote(start)),
                Some(&'"') => {
                    self.pos += 1;
                    return Ok(value);
                }
                Some(&'\\') => {
                    self.pos += 1;
                    match self.chars.get(self.pos) {
                        None => return Err(LinkHeaderParseError::UnterminatedQuote(start)),
                        Some(c) => {
                            value.push(*c);
                            self.pos += 1;
                        }
                    }
                }
                Some(c) => {
                    value.push(*c);
                    self.pos += 1;
                }
            }
        }
    }
}
