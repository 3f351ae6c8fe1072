//! Request and response value types
//!
//! Requests and responses are caller-scoped values: cheap to clone, with
//! immutable headers and an optional shared payload handle. The method table
//! carries the two properties the engine branches on: safety (does the
//! method mutate origin state) and cacheability (may its response be
//! stored).

use crate::header::Headers;
use crate::payload::Payload;
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;
use url::Url;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
  Get,
  Head,
  Options,
  Trace,
  Post,
  Put,
  Delete,
  Patch,
}

impl Method {
  /// Safe methods do not mutate server state.
  pub fn is_safe(self) -> bool {
    matches!(self, Method::Get | Method::Head | Method::Options | Method::Trace)
  }

  /// Cacheable methods are eligible to have their responses stored.
  pub fn is_cacheable(self) -> bool {
    matches!(self, Method::Get | Method::Head)
  }

  pub fn can_have_payload(self) -> bool {
    matches!(self, Method::Post | Method::Put | Method::Patch)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Options => "OPTIONS",
      Method::Trace => "TRACE",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Delete => "DELETE",
      Method::Patch => "PATCH",
    }
  }

  /// Case-insensitive lookup; `None` for methods the cache does not model.
  pub fn from_name(name: &str) -> Option<Method> {
    let upper = name.trim().to_ascii_uppercase();
    match upper.as_str() {
      "GET" => Some(Method::Get),
      "HEAD" => Some(Method::Head),
      "OPTIONS" => Some(Method::Options),
      "TRACE" => Some(Method::Trace),
      "POST" => Some(Method::Post),
      "PUT" => Some(Method::Put),
      "DELETE" => Some(Method::Delete),
      "PATCH" => Some(Method::Patch),
      _ => None,
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Status(pub u16);

impl Status {
  pub const OK: Status = Status(200);
  pub const NO_CONTENT: Status = Status(204);
  pub const NOT_MODIFIED: Status = Status(304);
  pub const NOT_FOUND: Status = Status(404);

  pub fn code(self) -> u16 {
    self.0
  }

  pub fn is_success(self) -> bool {
    (200..300).contains(&self.0)
  }

  pub fn is_redirect(self) -> bool {
    (300..400).contains(&self.0)
  }
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// An outgoing request.
#[derive(Clone)]
pub struct HttpRequest {
  uri: Url,
  method: Method,
  headers: Headers,
  payload: Option<Arc<dyn Payload>>,
}

impl HttpRequest {
  pub fn new(uri: Url, method: Method) -> Self {
    HttpRequest {
      uri,
      method,
      headers: Headers::new(),
      payload: None,
    }
  }

  pub fn get(uri: Url) -> Self {
    HttpRequest::new(uri, Method::Get)
  }

  pub fn uri(&self) -> &Url {
    &self.uri
  }

  pub fn method(&self) -> Method {
    self.method
  }

  pub fn headers(&self) -> &Headers {
    &self.headers
  }

  pub fn with_headers(&self, headers: Headers) -> Self {
    let mut next = self.clone();
    next.headers = headers;
    next
  }

  /// Appends one header, value-semantics like everything else here.
  pub fn with_header(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.with_headers(self.headers.add(name, value))
  }

  pub fn payload(&self) -> Option<&Arc<dyn Payload>> {
    self.payload.as_ref()
  }

  pub fn with_payload(&self, payload: Arc<dyn Payload>) -> Self {
    let mut next = self.clone();
    next.payload = Some(payload);
    next
  }
}

impl fmt::Debug for HttpRequest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("HttpRequest")
      .field("uri", &self.uri.as_str())
      .field("method", &self.method)
      .field("headers", &self.headers.len())
      .field("has_payload", &self.payload.is_some())
      .finish()
  }
}

/// An origin or cached response.
#[derive(Clone)]
pub struct HttpResponse {
  status: Status,
  headers: Headers,
  payload: Option<Arc<dyn Payload>>,
}

impl HttpResponse {
  pub fn new(status: Status, headers: Headers, payload: Option<Arc<dyn Payload>>) -> Self {
    HttpResponse {
      status,
      headers,
      payload,
    }
  }

  pub fn status(&self) -> Status {
    self.status
  }

  pub fn headers(&self) -> &Headers {
    &self.headers
  }

  pub fn with_headers(&self, headers: Headers) -> Self {
    let mut next = self.clone();
    next.headers = headers;
    next
  }

  pub fn payload(&self) -> Option<&Arc<dyn Payload>> {
    self.payload.as_ref()
  }

  pub fn with_payload(&self, payload: Option<Arc<dyn Payload>>) -> Self {
    let mut next = self.clone();
    next.payload = payload;
    next
  }

  pub fn has_payload(&self) -> bool {
    self.payload.is_some()
  }

  /// Reads the whole body into memory; empty if there is no payload.
  pub fn body_bytes(&self) -> io::Result<Vec<u8>> {
    match &self.payload {
      Some(payload) => {
        let mut bytes = Vec::new();
        payload.reader()?.read_to_end(&mut bytes)?;
        Ok(bytes)
      }
      None => Ok(Vec::new()),
    }
  }
}

impl fmt::Debug for HttpResponse {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("HttpResponse")
      .field("status", &self.status)
      .field("headers", &self.headers.len())
      .field("has_payload", &self.payload.is_some())
      .finish()
  }
}
