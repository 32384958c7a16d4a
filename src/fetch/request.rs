//! Transport-agnostic request construction.
//!
//! Kept separate from the HTTP client so the exact wire shape (headers, JSON
//! body, multipart fields) can be inspected without a server.

use crate::error::FetchError;
use crate::fetch::{Uploadable, Uploadables};
use crate::operation::QueryDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const DEFAULT_PATH: &str = "/graphql";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Fetch configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Scheme and authority, e.g. `http://localhost:4000`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_path")]
    pub path: String,

    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:4000".to_string()
}

fn default_path() -> String {
    DEFAULT_PATH.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            path: default_path(),
            headers: BTreeMap::new(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl FetchConfig {
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Full request URL
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.path)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.path.starts_with('/') {
            return Err(format!("path must start with '/': {}", self.path));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(format!(
                "base_url must be an http(s) URL: {}",
                self.base_url
            ));
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// One multipart form field
#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Text(String),
    File {
        file_name: String,
        content_type: Option<String>,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchBody {
    Json(Value),
    /// Fields in send order
    Multipart(Vec<(String, FormPart)>),
}

/// A fully built POST request
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub path: String,
    /// Headers in send order; later entries override earlier ones
    pub headers: Vec<(String, String)>,
    pub body: FetchBody,
}

impl FetchRequest {
    /// Look up a header, honoring override order and case-insensitive names
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Multipart field by name
    pub fn form_field(&self, name: &str) -> Option<&FormPart> {
        match &self.body {
            FetchBody::Multipart(parts) => parts.iter().find(|(k, _)| k == name).map(|(_, p)| p),
            FetchBody::Json(_) => None,
        }
    }
}

/// Build the request for an operation.
///
/// Without uploadables the body is JSON `{query, variables}` and the JSON
/// content type precedes the configured headers. With uploadables the body is
/// multipart (`query`, stringified `variables`, then each upload under its own
/// key) and only the configured headers are sent, so the transport can set
/// the multipart boundary itself.
pub fn build_request(
    config: &FetchConfig,
    descriptor: &QueryDescriptor,
    uploadables: Option<&Uploadables>,
) -> Result<FetchRequest, FetchError> {
    let variables = Value::Object(descriptor.variables.clone());

    match uploadables {
        Some(uploads) => {
            let variables_json = serde_json::to_string(&variables)
                .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;

            let mut parts = Vec::with_capacity(uploads.len() + 2);
            parts.push(("query".to_string(), FormPart::Text(descriptor.text.clone())));
            parts.push(("variables".to_string(), FormPart::Text(variables_json)));
            for (key, upload) in uploads {
                if key == "query" || key == "variables" {
                    return Err(FetchError::InvalidRequest(format!(
                        "uploadable key collides with reserved field: {}",
                        key
                    )));
                }
                let part = match upload {
                    Uploadable::Text(text) => FormPart::Text(text.clone()),
                    Uploadable::File {
                        file_name,
                        content_type,
                        bytes,
                    } => FormPart::File {
                        file_name: file_name.clone(),
                        content_type: content_type.clone(),
                        bytes: bytes.clone(),
                    },
                };
                parts.push((key.clone(), part));
            }

            Ok(FetchRequest {
                path: config.path.clone(),
                headers: config
                    .headers
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                body: FetchBody::Multipart(parts),
            })
        }
        None => {
            let mut headers = vec![("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string())];
            headers.extend(config.headers.iter().map(|(k, v)| (k.clone(), v.clone())));

            Ok(FetchRequest {
                path: config.path.clone(),
                headers,
                body: FetchBody::Json(json!({
                    "query": descriptor.text,
                    "variables": variables,
                })),
            })
        }
    }
}
