//! Fetch collaborator
//!
//! Transport for operations: turns a query descriptor (plus optional uploads)
//! into a request, sends it, and resolves with the parsed JSON body. The
//! execution engine only ever sees the `Network` trait.

use crate::error::FetchError;
use crate::operation::QueryDescriptor;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

pub mod cache;
pub mod http;
pub mod request;

pub use cache::{CacheConfig, CachedNetwork};
pub use http::HttpNetwork;
pub use request::{build_request, FetchBody, FetchConfig, FetchRequest, FormPart};

/// A file or text value sent as its own multipart field
#[derive(Debug, Clone, PartialEq)]
pub enum Uploadable {
    Text(String),
    File {
        file_name: String,
        content_type: Option<String>,
        bytes: Vec<u8>,
    },
}

/// Uploadables keyed by form field name
pub type Uploadables = BTreeMap<String, Uploadable>;

/// Per-request cache configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Skip cached responses and always go to the network
    pub force: bool,
}

impl FetchOptions {
    pub fn forced() -> Self {
        Self { force: true }
    }
}

/// Sends operations and returns the parsed response body
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(
        &self,
        descriptor: &QueryDescriptor,
        options: FetchOptions,
        uploadables: Option<&Uploadables>,
    ) -> Result<Value, FetchError>;

    /// Short name for logging
    fn name(&self) -> &str;
}
