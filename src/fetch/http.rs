//! reqwest-backed network.

use crate::error::FetchError;
use crate::fetch::request::{build_request, FetchBody, FetchConfig, FetchRequest, FormPart};
use crate::fetch::{FetchOptions, Network, Uploadables};
use crate::operation::QueryDescriptor;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// POSTs operations to a GraphQL endpoint
pub struct HttpNetwork {
    client: Client,
    config: FetchConfig,
}

impl HttpNetwork {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn to_reqwest(&self, request: FetchRequest) -> Result<reqwest::RequestBuilder, FetchError> {
        let url = format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            request.path
        );
        let mut builder = self.client.post(&url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let builder = match request.body {
            FetchBody::Json(body) => builder.body(
                serde_json::to_vec(&body).map_err(|e| FetchError::InvalidRequest(e.to_string()))?,
            ),
            FetchBody::Multipart(parts) => {
                let mut form = Form::new();
                for (name, part) in parts {
                    form = match part {
                        FormPart::Text(text) => form.text(name, text),
                        FormPart::File {
                            file_name,
                            content_type,
                            bytes,
                        } => {
                            let mut file = Part::bytes(bytes).file_name(file_name);
                            if let Some(mime) = content_type {
                                file = file
                                    .mime_str(&mime)
                                    .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
                            }
                            form.part(name, file)
                        }
                    };
                }
                builder.multipart(form)
            }
        };
        Ok(builder)
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(
        &self,
        descriptor: &QueryDescriptor,
        _options: FetchOptions,
        uploadables: Option<&Uploadables>,
    ) -> Result<Value, FetchError> {
        let request = build_request(&self.config, descriptor, uploadables)?;
        debug!(
            operation = %descriptor.name,
            path = %request.path,
            multipart = uploadables.is_some(),
            "Sending operation"
        );

        let response = self.to_reqwest(request)?.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(FetchError::Status { status, body });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }

    fn name(&self) -> &str {
        "http"
    }
}
