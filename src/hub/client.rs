use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::UpstreamConfig;
use crate::error::UpstreamError;

/// Comparison used in a list filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
  Eq,
  Gte,
  Lt,
  /// Array-valued field contains the value
  Contains,
}

impl FilterOp {
  fn as_str(self) -> &'static str {
    match self {
      FilterOp::Eq => "eq",
      FilterOp::Gte => "gte",
      FilterOp::Lt => "lt",
      FilterOp::Contains => "contains",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Asc,
  Desc,
}

/// Filter, order and limit for a collection read
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
  filters: Vec<(String, FilterOp, String)>,
  order_by: Option<(String, Direction)>,
  limit: Option<u32>,
}

impl ListQuery {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn filter(mut self, field: &str, op: FilterOp, value: impl Into<String>) -> Self {
    self.filters.push((field.to_string(), op, value.into()));
    self
  }

  pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
    self.order_by = Some((field.to_string(), direction));
    self
  }

  pub fn limit(mut self, limit: u32) -> Self {
    self.limit = Some(limit);
    self
  }

  fn apply(&self, url: &mut Url) {
    let mut pairs = url.query_pairs_mut();
    for (field, op, value) in &self.filters {
      pairs.append_pair("where", &format!("{}:{}:{}", field, op.as_str(), value));
    }
    if let Some((field, direction)) = &self.order_by {
      let dir = match direction {
        Direction::Asc => "asc",
        Direction::Desc => "desc",
      };
      pairs.append_pair("orderBy", &format!("{}:{}", field, dir));
    }
    if let Some(limit) = self.limit {
      pairs.append_pair("limit", &limit.to_string());
    }
  }
}

#[derive(Deserialize)]
struct Created {
  id: String,
}

/// HTTP client for the upstream document store
#[derive(Clone)]
pub struct UpstreamClient {
  http: reqwest::Client,
  base: Url,
  token: Option<String>,
}

impl UpstreamClient {
  pub fn new(config: &UpstreamConfig, token: Option<String>) -> Result<Self, UpstreamError> {
    let base = Url::parse(&config.url).map_err(|e| UpstreamError::Url(e.to_string()))?;
    if base.cannot_be_a_base() {
      return Err(UpstreamError::Url(format!("{} cannot be a base url", config.url)));
    }

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| UpstreamError::Url(format!("failed to build http client: {}", e)))?;

    Ok(Self { http, base, token })
  }

  /// Read documents from a collection
  pub async fn list<T: DeserializeOwned>(
    &self,
    collection: &str,
    query: &ListQuery,
  ) -> Result<Vec<T>, UpstreamError> {
    let mut url = self.url(&[collection])?;
    query.apply(&mut url);
    let response = self.send(self.request(Method::GET, &url), &url, collection).await?;
    decode(response).await
  }

  /// Read one document
  pub async fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<T, UpstreamError> {
    let url = self.url(&[collection, id])?;
    let what = format!("{} {}", singular(collection), id);
    let response = self.send(self.request(Method::GET, &url), &url, &what).await?;
    decode(response).await
  }

  /// Create a document and return its id
  pub async fn create<T: Serialize>(&self, collection: &str, doc: &T) -> Result<String, UpstreamError> {
    let url = self.url(&[collection])?;
    let response = self
      .send(self.request(Method::POST, &url).json(doc), &url, collection)
      .await?;
    let created: Created = decode(response).await?;
    Ok(created.id)
  }

  /// Merge fields into an existing document
  pub async fn update<T: Serialize>(
    &self,
    collection: &str,
    id: &str,
    fields: &T,
  ) -> Result<(), UpstreamError> {
    let url = self.url(&[collection, id])?;
    let what = format!("{} {}", singular(collection), id);
    self
      .send(self.request(Method::PATCH, &url).json(fields), &url, &what)
      .await?;
    Ok(())
  }

  pub async fn delete(&self, collection: &str, id: &str) -> Result<(), UpstreamError> {
    let url = self.url(&[collection, id])?;
    let what = format!("{} {}", singular(collection), id);
    self.send(self.request(Method::DELETE, &url), &url, &what).await?;
    Ok(())
  }

  /// Add `value` to the set-valued `field`
  pub async fn array_union(
    &self,
    collection: &str,
    id: &str,
    field: &str,
    value: &str,
  ) -> Result<(), UpstreamError> {
    self.array_op("arrayUnion", collection, id, field, value).await
  }

  /// Remove `value` from the set-valued `field`
  pub async fn array_remove(
    &self,
    collection: &str,
    id: &str,
    field: &str,
    value: &str,
  ) -> Result<(), UpstreamError> {
    self.array_op("arrayRemove", collection, id, field, value).await
  }

  async fn array_op(
    &self,
    op: &str,
    collection: &str,
    id: &str,
    field: &str,
    value: &str,
  ) -> Result<(), UpstreamError> {
    let url = self.url(&[collection, id, op])?;
    let what = format!("{} {}", singular(collection), id);
    let body = json!({ "field": field, "value": value });
    self
      .send(self.request(Method::POST, &url).json(&body), &url, &what)
      .await?;
    Ok(())
  }

  fn url(&self, segments: &[&str]) -> Result<Url, UpstreamError> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| UpstreamError::Url(self.base.to_string()))?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  fn request(&self, method: Method, url: &Url) -> RequestBuilder {
    let request = self.http.request(method, url.clone());
    match &self.token {
      Some(token) => request.bearer_auth(token),
      None => request,
    }
  }

  async fn send(
    &self,
    request: RequestBuilder,
    url: &Url,
    what: &str,
  ) -> Result<reqwest::Response, UpstreamError> {
    debug!(url = %url, "upstream request");
    let response = request
      .send()
      .await
      .map_err(|e| UpstreamError::from_reqwest(url.as_str(), e))?;

    match response.status() {
      StatusCode::NOT_FOUND => Err(UpstreamError::NotFound(what.to_string())),
      status if !status.is_success() => Err(UpstreamError::Status {
        status: status.as_u16(),
        url: url.to_string(),
      }),
      _ => Ok(response),
    }
  }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, UpstreamError> {
  response
    .json::<T>()
    .await
    .map_err(|e| UpstreamError::Decode(e.to_string()))
}

/// "events" -> "event", for error messages
fn singular(collection: &str) -> &str {
  collection.strip_suffix('s').unwrap_or(collection)
}
