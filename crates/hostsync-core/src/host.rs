//! Host and host change types
//!
//! A [`Host`] is a named endpoint tracked by providers and targets. Its `name`
//! (a DNS-style hostname) is the reconciliation key; `id` and `meta` belong to
//! the adapter that produced it and are carried through untouched.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named endpoint known to a provider or a target
///
/// `M` is adapter-specific bookkeeping (for example the upstream record id of
/// a DNS target). The core never inspects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host<M = ()> {
    /// Adapter-specific handle (record id, container id, router service)
    pub id: String,
    /// Hostname, unique within one source's host set
    pub name: String,
    /// Opaque adapter metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<M>,
}

impl<M> Host<M> {
    /// Create a host without metadata
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            meta: None,
        }
    }

    /// Attach metadata
    pub fn with_meta(mut self, meta: M) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Same host, different metadata type
    ///
    /// Used when a provider-side host becomes the subject of a change applied
    /// to a target: the target knows nothing about the provider's bookkeeping.
    pub fn without_meta<N>(&self) -> Host<N> {
        Host {
            id: self.id.clone(),
            name: self.name.clone(),
            meta: None,
        }
    }
}

/// Direction of a host change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// Host must be created in the target
    Add,
    /// Host must be removed from the target
    Remove,
}

impl ChangeType {
    /// Wire name (`"add"` / `"remove"`), also used in job metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Add => "add",
            ChangeType::Remove => "remove",
        }
    }

    /// The change that cancels this one out
    pub fn opposite(&self) -> Self {
        match self {
            ChangeType::Add => ChangeType::Remove,
            ChangeType::Remove => ChangeType::Add,
        }
    }

    /// Parse the wire name
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "add" => Some(ChangeType::Add),
            "remove" => Some(ChangeType::Remove),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proposed add or remove of one host
///
/// Produced by the diff step (or a provider notification) and consumed by
/// exactly one scheduled job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostChange<M = ()> {
    /// Add or remove
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    /// The host being changed
    pub host: Host<M>,
}

impl<M> HostChange<M> {
    /// Create an `add` change
    pub fn add(host: Host<M>) -> Self {
        Self {
            change_type: ChangeType::Add,
            host,
        }
    }

    /// Create a `remove` change
    pub fn remove(host: Host<M>) -> Self {
        Self {
            change_type: ChangeType::Remove,
            host,
        }
    }
}

impl<M> fmt::Display for HostChange<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.change_type, self.host.name)
    }
}
