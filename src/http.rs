use crate::config::ConfigProperties;
use crate::error::SWError;
use crate::io::{HttpRunner, Response, ResponseType};
use crate::Result;
use crate::{log_debug, log_error};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{hash_map, HashMap};
use std::fmt::{self, Display, Formatter};
use std::io::Read;
use std::time::Duration;

/// Blocking HTTP client backed by `ureq`. Classifies responses as `Basic`
/// when they come back from the configured origin and `Opaque` otherwise.
pub struct Client<D> {
    config: D,
    agent: ureq::Agent,
}

impl<D: ConfigProperties> Client<D> {
    pub fn new(config: D) -> Self {
        let timeout: Duration = config.network_timeout().into();
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Client { config, agent }
    }

    fn response_type(&self, final_url: &str) -> ResponseType {
        match origin_of(final_url) {
            Some(origin) if origin == normalize_origin(self.config.origin()) => {
                ResponseType::Basic
            }
            _ => ResponseType::Opaque,
        }
    }

    fn adapt(&self, response: ureq::Response) -> Result<Response> {
        let status = response.status();
        let status_text = response.status_text().to_string();
        let final_url = response.get_url().to_string();
        // Grab headers, names are lower cased for lookups and cache storage.
        let headers = response
            .headers_names()
            .iter()
            .fold(Headers::new(), |mut headers, name| {
                if let Some(value) = response.header(name) {
                    headers.set(name.to_lowercase(), value);
                }
                headers
            });
        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|err| SWError::NetworkUnavailable(err.to_string()))?;
        let response = Response::builder()
            .status(status)
            .status_text(status_text)
            .headers(headers)
            .body(body)
            .response_type(self.response_type(&final_url))
            .url(final_url)
            .build()?;
        Ok(response)
    }
}

impl<D: ConfigProperties> HttpRunner for Client<D> {
    fn run(&self, request: &Request) -> Result<Response> {
        let url = absolute_url(self.config.origin(), request.url());
        log_debug!("Network {} {}", request.method, url);
        let ureq_req = self.agent.request(request.method.as_str(), &url);
        let ureq_req = request
            .headers()
            .iter()
            .fold(ureq_req, |req, (key, value)| req.set(key, value));
        let result = match &request.body {
            Some(body) => ureq_req.send_bytes(body),
            None => ureq_req.call(),
        };
        match result {
            Ok(response) => self.adapt(response),
            // ureq returns error on status codes >= 400. Those are still
            // valid responses for the caller.
            // https://docs.rs/ureq/latest/ureq/#error-handling
            Err(ureq::Error::Status(_, response)) => self.adapt(response),
            Err(ureq::Error::Transport(transport)) => {
                log_error!("Transport error for {}: {}", url, transport);
                Err(SWError::NetworkUnavailable(transport.to_string()).into())
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Method {
    #[default]
    GET,
    HEAD,
    POST,
    PUT,
    PATCH,
    DELETE,
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::PATCH => "PATCH",
            Method::DELETE => "DELETE",
        }
    }

    /// Safe methods are the only ones mediated by the cache.
    pub fn is_read(&self) -> bool {
        matches!(self, Method::GET | Method::HEAD)
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum RequestMode {
    /// Top-level page load.
    Navigate,
    #[default]
    Subresource,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Headers(HashMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Headers(HashMap::new())
    }

    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.0.get(key)
    }

    pub fn iter(&self) -> hash_map::Iter<String, String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Builder, Clone, Debug)]
#[builder(pattern = "owned")]
pub struct Request {
    #[builder(setter(into))]
    url: String,
    #[builder(default)]
    pub method: Method,
    #[builder(default)]
    headers: Headers,
    #[builder(default)]
    pub mode: RequestMode,
    #[builder(setter(into, strip_option), default)]
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    pub fn new(url: &str, method: Method) -> Self {
        Request {
            url: url.to_string(),
            method,
            headers: Headers::new(),
            mode: RequestMode::Subresource,
            body: None,
        }
    }

    pub fn navigate(url: &str) -> Self {
        Request {
            mode: RequestMode::Navigate,
            ..Request::new(url, Method::GET)
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn set_header(&mut self, key: &str, value: &str) {
        self.headers.set(key, value);
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Cache key for this request once its URL is resolved against `origin`.
    pub fn key(&self, origin: &str) -> RequestKey {
        RequestKey::new(self.method.clone(), &absolute_url(origin, &self.url))
    }
}

/// Identifies a cache entry: method plus absolute URL, query string included.
/// Fragments never reach the server and are not part of the key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: Method,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: Method, url: &str) -> Self {
        let url = match url.split_once('#') {
            Some((url, _fragment)) => url,
            None => url,
        };
        RequestKey {
            method,
            url: url.to_string(),
        }
    }
}

impl Display for RequestKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

lazy_static! {
    static ref RE_ORIGIN: Regex = Regex::new(r"^(?i)(https?)://([^/?#]+)").unwrap();
}

fn normalize_origin(origin: &str) -> String {
    origin.trim_end_matches('/').to_lowercase()
}

/// Extracts `scheme://host[:port]` from an absolute URL. Returns None for
/// relative URLs.
pub fn origin_of(url: &str) -> Option<String> {
    RE_ORIGIN
        .captures(url)
        .map(|cap| format!("{}://{}", &cap[1], &cap[2]).to_lowercase())
}

/// Resolves `url` against `origin`. Absolute URLs are returned untouched.
pub fn absolute_url(origin: &str, url: &str) -> String {
    if RE_ORIGIN.is_match(url) {
        return url.to_string();
    }
    let origin = origin.trim_end_matches('/');
    if let Some(rest) = url.strip_prefix("//") {
        let scheme = origin.split("://").next().unwrap_or("http");
        return format!("{scheme}://{rest}");
    }
    if url.starts_with('/') {
        format!("{origin}{url}")
    } else {
        format!("{origin}/{url}")
    }
}
