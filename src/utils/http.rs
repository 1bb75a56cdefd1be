// src/utils/http.rs

//! Shared HTTP client.
//!
//! One pooled client serves every source: browser-like default headers,
//! rustls with the bundled webpki roots, a process-wide cap on in-flight
//! connections and a small DNS cache. Each call performs exactly one attempt;
//! retrying is the caller's business.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use tokio::sync::Semaphore;

use crate::error::{AppError, Result};
use crate::models::ClientConfig;

/// HTTP verb of a fetch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Description of a single request against a source.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub json_body: Option<serde_json::Value>,
}

impl FetchRequest {
    /// A plain GET.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            json_body: None,
        }
    }

    /// A POST carrying a JSON body.
    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            json_body: Some(body),
        }
    }

    /// Add a request header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// One network attempt returning the response body.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<String>;
}

/// Map an HTTP status code onto the outcome taxonomy.
pub fn classify_status(code: u16) -> Result<()> {
    match code {
        200..=299 => Ok(()),
        429 | 503 => Err(AppError::high_traffic(format!(
            "Website experiencing high traffic. Status: {code}"
        ))),
        _ => Err(AppError::unavailable(format!(
            "Website unavailable. Status: {code}"
        ))),
    }
}

/// Connection-pooled client shared across all sources.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
}

impl HttpClient {
    /// Build the shared client from configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, header_value(&config.accept)?);
        headers.insert(ACCEPT_LANGUAGE, header_value(&config.accept_language)?);

        let resolver = CachingResolver::new(Duration::from_secs(config.dns_cache_ttl_secs));

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(config.max_connections)
            .pool_idle_timeout(Duration::from_secs(90))
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .dns_resolver(Arc::new(resolver))
            .build()?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_connections.max(1))),
        })
    }

    /// Perform exactly one request and return the body of a 2xx response.
    pub async fn execute(&self, request: &FetchRequest) -> Result<String> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| AppError::transport(e, false))?;

        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.json_body {
            builder = builder.json(body);
        }

        log::debug!("{:?} {}", request.method, request.url);
        let response = builder.send().await.map_err(transport_error)?;
        classify_status(response.status().as_u16())?;
        response.text().await.map_err(transport_error)
    }
}

#[async_trait]
impl Fetch for HttpClient {
    async fn fetch(&self, request: &FetchRequest) -> Result<String> {
        self.execute(request).await
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| AppError::config(format!("invalid header value '{value}': {e}")))
}

fn transport_error(error: reqwest::Error) -> AppError {
    if error.is_timeout() {
        AppError::transport("Request timed out", true)
    } else {
        AppError::transport(format!("Connection error: {error}"), false)
    }
}

// --- DNS ---

type CacheEntry = (Instant, Vec<SocketAddr>);

/// Resolver that keeps lookups for a fixed TTL.
#[derive(Clone, Default)]
pub struct CachingResolver {
    ttl: Duration,
    cache: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl CachingResolver {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn cached(&self, host: &str) -> Option<Vec<SocketAddr>> {
        let cache = self.cache.lock().ok()?;
        cache
            .get(host)
            .filter(|(stored, _)| stored.elapsed() < self.ttl)
            .map(|(_, addrs)| addrs.clone())
    }

    fn store(&self, host: String, addrs: Vec<SocketAddr>) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(host, (Instant::now(), addrs));
        }
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

impl Resolve for CachingResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(lookup(self.clone(), name.as_str().to_string()))
    }
}

async fn lookup(resolver: CachingResolver, host: String) -> std::result::Result<Addrs, BoxError> {
    if let Some(addrs) = resolver.cached(&host) {
        return Ok(Box::new(addrs.into_iter()));
    }

    let resolved: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
        .await?
        .collect();
    log::debug!("Resolved {} to {} address(es)", host, resolved.len());
    resolver.store(host, resolved.clone());

    Ok(Box::new(resolved.into_iter()))
}
