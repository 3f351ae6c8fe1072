//! Response resolvers
//!
//! A [`ResponseResolver`] performs a request against the origin and returns
//! whatever came back, statuses, redirects and error responses included. It
//! must not interpret caching headers; that is the engine's job. The
//! bundled [`UreqResolver`] does exactly that over a blocking `ureq` agent
//! with redirect following disabled.

use crate::header::{Headers, CONTENT_TYPE};
use crate::message::{HttpRequest, HttpResponse, Method, Status};
use crate::payload::BytesPayload;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;

/// Transport contract consumed by the engine.
pub trait ResponseResolver: Send + Sync {
  fn resolve(&self, request: &HttpRequest) -> io::Result<HttpResponse>;
}

impl<T: ResponseResolver + ?Sized> ResponseResolver for Arc<T> {
  fn resolve(&self, request: &HttpRequest) -> io::Result<HttpResponse> {
    (**self).resolve(request)
  }
}

/// Connection settings for the bundled resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
  timeout: Duration,
  user_agent: String,
  max_body_size: u64,
}

impl ResolverConfig {
  pub fn new() -> Self {
    ResolverConfig::default()
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
    self.user_agent = user_agent.into();
    self
  }

  /// Caps how many response body bytes will be read.
  pub fn with_max_body_size(mut self, max_body_size: u64) -> Self {
    self.max_body_size = max_body_size;
    self
  }
}

impl Default for ResolverConfig {
  fn default() -> Self {
    ResolverConfig {
      timeout: Duration::from_secs(30),
      user_agent: concat!("fetchcache/", env!("CARGO_PKG_VERSION")).to_string(),
      max_body_size: 50 * 1024 * 1024,
    }
  }
}

/// Blocking resolver over a `ureq` agent.
///
/// Redirects are not followed and HTTP error statuses are returned as
/// ordinary responses, so the engine sees exactly what the origin sent.
pub struct UreqResolver {
  agent: ureq::Agent,
  config: ResolverConfig,
}

impl UreqResolver {
  pub fn new() -> Self {
    UreqResolver::with_config(ResolverConfig::default())
  }

  pub fn with_config(config: ResolverConfig) -> Self {
    let agent_config = ureq::Agent::config_builder()
      .timeout_global(Some(config.timeout))
      .max_redirects(0)
      .http_status_as_error(false)
      .build();
    UreqResolver {
      agent: agent_config.into(),
      config,
    }
  }

  fn request_body(request: &HttpRequest) -> io::Result<Vec<u8>> {
    match request.payload() {
      Some(payload) if request.method().can_have_payload() => {
        let mut bytes = Vec::new();
        payload.reader()?.read_to_end(&mut bytes)?;
        Ok(bytes)
      }
      _ => Ok(Vec::new()),
    }
  }
}

impl Default for UreqResolver {
  fn default() -> Self {
    UreqResolver::new()
  }
}

impl ResponseResolver for UreqResolver {
  fn resolve(&self, request: &HttpRequest) -> io::Result<HttpResponse> {
    let url = request.uri().as_str();

    let mut response = match request.method() {
      Method::Get | Method::Head | Method::Delete => {
        let mut pending = match request.method() {
          Method::Get => self.agent.get(url),
          Method::Head => self.agent.head(url),
          _ => self.agent.delete(url),
        };
        pending = pending.header("User-Agent", &self.config.user_agent);
        for (name, value) in request.headers().iter() {
          pending = pending.header(name, value);
        }
        pending
          .call()
          .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?
      }
      Method::Post | Method::Put | Method::Patch => {
        let body = Self::request_body(request)?;
        let mut pending = match request.method() {
          Method::Post => self.agent.post(url),
          Method::Put => self.agent.put(url),
          _ => self.agent.patch(url),
        };
        pending = pending.header("User-Agent", &self.config.user_agent);
        if let Some(payload) = request.payload() {
          if let Some(media_type) = payload.media_type() {
            pending = pending.header(CONTENT_TYPE, media_type);
          }
        }
        for (name, value) in request.headers().iter() {
          pending = pending.header(name, value);
        }
        pending
          .send(&body[..])
          .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?
      }
      other => {
        return Err(io::Error::new(
          io::ErrorKind::Unsupported,
          format!("the bundled resolver does not send {} requests", other),
        ));
      }
    };

    let status = Status(response.status().as_u16());

    let mut headers = Headers::new();
    for (name, value) in response.headers() {
      if let Ok(value) = value.to_str() {
        headers = headers.add(name.as_str(), value);
      }
    }

    let bytes = response
      .body_mut()
      .with_config()
      .limit(self.config.max_body_size)
      .read_to_vec()
      .map_err(|e| e.into_io())?;

    let payload = if bytes.is_empty() {
      None
    } else {
      let media_type = headers.content_type().map(str::to_string);
      Some(Arc::new(BytesPayload::new(bytes, media_type)) as Arc<dyn crate::payload::Payload>)
    };

    Ok(HttpResponse::new(status, headers, payload))
  }
}
