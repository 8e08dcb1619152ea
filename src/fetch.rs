//! HTTP request helper shared by the table, storage and auth gateways

use log::{debug, trace};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client, Method, RequestBuilder, Response,
};
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

use crate::error::GatewayError;

/// Helper for building and executing HTTP requests
pub struct FetchBuilder<'a> {
    client: &'a Client,
    url: String,
    method: Method,
    headers: HeaderMap,
    query_pairs: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl<'a> FetchBuilder<'a> {
    /// Create a new FetchBuilder
    pub fn new(client: &'a Client, url: &str, method: Method) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        headers.insert(
            "X-Client-Info",
            HeaderValue::from_static(concat!("mkulima-expo/", env!("CARGO_PKG_VERSION"))),
        );

        Self {
            client,
            url: url.to_string(),
            method,
            headers,
            query_pairs: Vec::new(),
            body: None,
        }
    }

    /// Add a header to the request, replacing any previous value
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Add the project key and bearer token
    pub fn credentials(self, api_key: &str, token: &str) -> Self {
        self.header("apikey", api_key)
            .header("Authorization", &format!("Bearer {}", token))
    }

    /// Append query pairs; names may repeat
    pub fn query(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query_pairs.extend(pairs);
        self
    }

    /// Add a JSON body to the request
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, GatewayError> {
        self.body = Some(serde_json::to_vec(body)?);
        Ok(self)
    }

    /// Build the request
    fn build(&self) -> Result<RequestBuilder, GatewayError> {
        let mut url = Url::parse(&self.url)?;

        if !self.query_pairs.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query_pairs {
                pairs.append_pair(key, value);
            }
        }

        trace!("{} {}", self.method, url);

        let mut req = self
            .client
            .request(self.method.clone(), url.as_str())
            .headers(self.headers.clone());

        if let Some(body) = &self.body {
            req = req.body(body.clone());
        }

        Ok(req)
    }

    /// Execute the request, failing on a non-success status
    pub async fn send(&self) -> Result<Response, GatewayError> {
        let response = self.build()?.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await?;
            debug!("{} {} answered {}: {}", self.method, self.url, status, text);
            return Err(GatewayError::status(status, error_message(&text)));
        }

        Ok(response)
    }

    /// Execute the request and parse the response as JSON
    pub async fn execute<T: DeserializeOwned>(&self) -> Result<T, GatewayError> {
        let response = self.send().await?;
        let result = response.json::<T>().await?;
        Ok(result)
    }
}

/// Pull the human part out of a PostgREST, GoTrue or Storage error body
fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };

    ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

/// Helper for creating HTTP requests
pub struct Fetch;

impl Fetch {
    /// Create a GET request
    pub fn get<'a>(client: &'a Client, url: &str) -> FetchBuilder<'a> {
        FetchBuilder::new(client, url, Method::GET)
    }

    /// Create a POST request
    pub fn post<'a>(client: &'a Client, url: &str) -> FetchBuilder<'a> {
        FetchBuilder::new(client, url, Method::POST)
    }

    /// Create a PATCH request
    pub fn patch<'a>(client: &'a Client, url: &str) -> FetchBuilder<'a> {
        FetchBuilder::new(client, url, Method::PATCH)
    }

    /// Create a DELETE request
    pub fn delete<'a>(client: &'a Client, url: &str) -> FetchBuilder<'a> {
        FetchBuilder::new(client, url, Method::DELETE)
    }
}
