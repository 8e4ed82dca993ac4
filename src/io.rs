use crate::{http::Headers, http::Request, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A trait for the HTTP protocol. Implementors accept a `Request` that wraps
/// the method, headers, mode and an optional payload. Clients can do real HTTP
/// calls against a remote origin or mock the responses for testing purposes.
///
/// Implementors return `Ok` for every response the remote produced, whatever
/// its status. `Err` is reserved for transport failures where no response
/// exists at all.
pub trait HttpRunner {
    fn run(&self, request: &Request) -> Result<Response>;
}

impl<R: HttpRunner + ?Sized> HttpRunner for Arc<R> {
    fn run(&self, request: &Request) -> Result<Response> {
        self.as_ref().run(request)
    }
}

/// Origin classification of a response. Only `Basic` responses are eligible
/// for caching.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum ResponseType {
    /// Same-origin response.
    #[default]
    Basic,
    /// Cross-origin response whose contents should not be trusted.
    Opaque,
}

#[derive(Clone, Debug, Builder, PartialEq)]
pub struct Response {
    #[builder(default = "200")]
    pub status: u16,
    #[builder(setter(into), default)]
    pub status_text: String,
    #[builder(default)]
    pub headers: Headers,
    #[builder(setter(into), default)]
    pub body: Vec<u8>,
    #[builder(default)]
    pub response_type: ResponseType,
    /// Final URL after redirects. Empty for synthesized responses.
    #[builder(setter(into), default)]
    pub url: String,
}

pub const SERVICE_UNAVAILABLE_BODY: &str = "Network error occurred";

impl Response {
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder::default()
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(|s| s.as_str())
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Only complete same-origin responses end up in a generation.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.response_type == ResponseType::Basic
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Response handed back when the network is down and nothing in the
    /// cache can stand in for the request.
    pub fn service_unavailable() -> Self {
        let mut headers = Headers::new();
        headers.set("content-type", "text/plain");
        Response {
            status: 503,
            status_text: "Service Unavailable".to_string(),
            headers,
            body: SERVICE_UNAVAILABLE_BODY.as_bytes().to_vec(),
            response_type: ResponseType::Basic,
            url: String::new(),
        }
    }
}
