#![forbid(unsafe_code)]

//! Paginated reads of registry collections.

use crate::error::{DecodeError, FetchError, PageError};
use fpr_core::{RecordError, RuleKind};
use reqwest::Url;
use reqwest::header::ACCEPT;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::time::Duration;

/// The HTTP boundary: one GET, returning the response body.
pub trait Transport {
    fn get(&self, url: &Url) -> Result<String, FetchError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, url: &Url) -> Result<String, FetchError> {
        (**self).get(url)
    }
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| FetchError::Transport {
                url: String::new(),
                reason: err.to_string(),
            })?;
        Ok(Self { http })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &Url) -> Result<String, FetchError> {
        let response = self
            .http
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|err| FetchError::Transport {
                url: url.to_string(),
                reason: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().map_err(|err| FetchError::Transport {
            url: url.to_string(),
            reason: err.to_string(),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageQuery {
    /// Page size hint; 0 asks the server for everything at once.
    pub limit: u32,
    pub modified_since: Option<String>,
}

/// Parses the registry base URL, forcing a trailing slash so collection paths join under it.
pub fn parse_base_url(raw: &str) -> Result<Url, FetchError> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&with_slash).map_err(|err| FetchError::InvalidUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })
}

pub fn collection_url(base: &Url, kind: RuleKind, query: &PageQuery) -> Result<Url, FetchError> {
    let path = format!("{}/", kind.as_str());
    let mut url = base.join(&path).map_err(|err| FetchError::InvalidUrl {
        url: format!("{base}{path}"),
        reason: err.to_string(),
    })?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("format", "json");
        pairs.append_pair("limit", &query.limit.to_string());
        if let Some(since) = query.modified_since.as_deref() {
            pairs.append_pair("modified_since", since);
        }
    }
    Ok(url)
}

/// Lazy sequence of the records of one kind, following `meta.next` links until exhausted.
///
/// A page is either a bare JSON array or `{"meta": {"next": ...}, "objects": [...]}`.
/// A `next` link back to any page already fetched in this pass is a decode error.
/// Iteration stops after the first error.
pub struct RecordPages<'a, T: Transport + ?Sized> {
    transport: &'a T,
    base: Url,
    kind: RuleKind,
    next: Option<Url>,
    visited: HashSet<Url>,
    buffered: std::vec::IntoIter<Value>,
    pages: usize,
    done: bool,
}

impl<'a, T: Transport + ?Sized> RecordPages<'a, T> {
    pub fn new(
        transport: &'a T,
        base: &Url,
        kind: RuleKind,
        query: &PageQuery,
    ) -> Result<Self, FetchError> {
        let first = collection_url(base, kind, query)?;
        Ok(Self {
            transport,
            base: base.clone(),
            kind,
            visited: HashSet::from([first.clone()]),
            next: Some(first),
            buffered: Vec::new().into_iter(),
            pages: 0,
            done: false,
        })
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    fn fetch_page(&mut self, url: Url) -> Result<(), PageError> {
        let body = self.transport.get(&url)?;
        let page = serde_json::from_str::<Value>(&body).map_err(|err| DecodeError::Json {
            url: url.to_string(),
            reason: err.to_string(),
        })?;

        let (objects, next) = match page {
            Value::Array(objects) => (objects, None),
            Value::Object(mut fields) => {
                let objects = match fields.remove("objects") {
                    Some(Value::Array(objects)) => objects,
                    _ => {
                        return Err(DecodeError::MissingObjects {
                            url: url.to_string(),
                        }
                        .into());
                    }
                };
                let next = fields
                    .get("meta")
                    .and_then(|meta| meta.get("next"))
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|next| !next.is_empty())
                    .map(str::to_string);
                (objects, next)
            }
            _ => {
                return Err(DecodeError::MissingObjects {
                    url: url.to_string(),
                }
                .into());
            }
        };

        let next = match next {
            Some(link) => {
                let resolved = self.base.join(&link).map_err(|_| DecodeError::InvalidNext {
                    url: url.to_string(),
                    next: link.clone(),
                })?;
                if !self.visited.insert(resolved.clone()) {
                    return Err(DecodeError::InvalidNext {
                        url: url.to_string(),
                        next: link,
                    }
                    .into());
                }
                Some(resolved)
            }
            None => None,
        };

        tracing::debug!(
            kind = %self.kind,
            url = %url,
            records = objects.len(),
            has_next = next.is_some(),
            "fetched page"
        );
        self.pages += 1;
        self.buffered = objects.into_iter();
        self.next = next;
        Ok(())
    }
}

impl<T: Transport + ?Sized> Iterator for RecordPages<'_, T> {
    type Item = Result<Map<String, Value>, PageError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some(record) = self.buffered.next() {
                return Some(match record {
                    Value::Object(fields) => Ok(fields),
                    _ => {
                        self.done = true;
                        Err(DecodeError::Record {
                            kind: self.kind,
                            source: RecordError::NotAnObject,
                        }
                        .into())
                    }
                });
            }
            let Some(url) = self.next.take() else {
                self.done = true;
                return None;
            };
            if let Err(err) = self.fetch_page(url) {
                self.done = true;
                return Some(Err(err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        let base = parse_base_url("http://localhost:9000/fpr/api/v2").unwrap();
        assert_eq!(base.as_str(), "http://localhost:9000/fpr/api/v2/");
        assert!(matches!(
            parse_base_url("not a url").unwrap_err(),
            FetchError::InvalidUrl { .. }
        ));
    }

    #[test]
    fn collection_url_carries_format_limit_and_filter() {
        let base = parse_base_url("http://localhost:9000/fpr/api/v2/").unwrap();
        let plain = collection_url(&base, RuleKind::IdCommand, &PageQuery::default()).unwrap();
        assert_eq!(
            plain.as_str(),
            "http://localhost:9000/fpr/api/v2/id-command/?format=json&limit=0"
        );

        let filtered = collection_url(
            &base,
            RuleKind::FormatVersion,
            &PageQuery {
                limit: 20,
                modified_since: Some("2011-09-18T18:31:29".to_string()),
            },
        )
        .unwrap();
        assert_eq!(
            filtered.as_str(),
            "http://localhost:9000/fpr/api/v2/format-version/?format=json&limit=20&modified_since=2011-09-18T18%3A31%3A29"
        );
    }
}
