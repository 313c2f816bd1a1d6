use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How the request was issued. Only `Navigate` changes the fetch strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    Navigate,
    SameOrigin,
    NoCors,
    Cors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    /// Loading the app document: network-first.
    Navigation,
    /// Scripts, styles, images, fonts: cache-first.
    StaticAsset,
    /// Anything but GET: not intercepted.
    Passthrough,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: String,
    pub mode: RequestMode,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            mode: RequestMode::NoCors,
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn class(&self) -> RequestClass {
        if !self.method.eq_ignore_ascii_case("GET") {
            RequestClass::Passthrough
        } else if self.mode == RequestMode::Navigate {
            RequestClass::Navigation
        } else {
            RequestClass::StaticAsset
        }
    }
}

/// A response as served to the page and as stored in a cache generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body,
        }
    }

    /// Only a plain 200 is written into a cache generation.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200
    }
}
