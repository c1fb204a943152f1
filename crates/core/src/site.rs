// SPDX-License-Identifier: MIT

//! Storage endpoints (spec §3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Disk,
    Mss,
    Buffer,
    Unknown,
}

crate::simple_display! {
    StorageType {
        Disk => "disk",
        Mss => "mss",
        Buffer => "buffer",
        Unknown => "unknown",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    Ready,
    WaitRoom,
    Morgue,
    Unknown,
}

crate::simple_display! {
    SiteStatus {
        Ready => "ready",
        WaitRoom => "waitroom",
        Morgue => "morgue",
        Unknown => "unknown",
    }
}

/// A named storage endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub name: String,
    pub host: String,
    pub storage_type: StorageType,
    pub status: SiteStatus,
    pub backend: String,
    /// Optional x509 proxy credential path; not interpreted by the core.
    pub x509proxy: Option<String>,
}

impl Site {
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Site {
            name: name.into(),
            host: host.into(),
            storage_type: StorageType::Unknown,
            status: SiteStatus::Unknown,
            backend: String::new(),
            x509proxy: None,
        }
    }
}
