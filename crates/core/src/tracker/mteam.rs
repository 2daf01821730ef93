//! M-Team API client.

use std::time::Duration;

use async_trait::async_trait;
use chrono_tz::Tz;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{
    Credentials, ItemDetail, Profile, SearchPage, SearchRequest, TrackerClient, TrackerError,
    TrackerItem,
};
use crate::config::TrackerConfig;
use crate::promotion::{self, PromotionClass};

/// Tracker client speaking the M-Team JSON API.
pub struct MTeamClient {
    client: Client,
    api_url: String,
    timezone: Tz,
}

impl MTeamClient {
    pub fn new(config: &TrackerConfig) -> Result<Self, TrackerError> {
        let timezone: Tz = config.timezone.parse().map_err(|_| {
            TrackerError::Api(format!("unknown tracker timezone: {}", config.timezone))
        })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TrackerError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            api_url: format!("{}/api", config.base_url.trim_end_matches('/')),
            timezone,
        })
    }

    /// POST a JSON body and unwrap the `{code, message, data}` envelope.
    async fn call_json(
        &self,
        creds: &Credentials,
        endpoint: &str,
        body: &Value,
    ) -> Result<Value, TrackerError> {
        let response = self
            .client
            .post(format!("{}/{}", self.api_url, endpoint))
            .header("x-api-key", &creds.api_key)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(TrackerError::from_reqwest)?;
        Self::unwrap_envelope(endpoint, response).await
    }

    /// POST a form body and unwrap the envelope.
    async fn call_form(
        &self,
        creds: &Credentials,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<Value, TrackerError> {
        let response = self
            .client
            .post(format!("{}/{}", self.api_url, endpoint))
            .header("x-api-key", &creds.api_key)
            .header("Accept", "application/json")
            .form(params)
            .send()
            .await
            .map_err(TrackerError::from_reqwest)?;
        Self::unwrap_envelope(endpoint, response).await
    }

    async fn unwrap_envelope(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<Value, TrackerError> {
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(TrackerError::Unauthorized(format!(
                    "HTTP {} from {}",
                    response.status(),
                    endpoint
                )))
            }
            status if status.is_server_error() => {
                return Err(TrackerError::Unavailable(format!(
                    "HTTP {} from {}",
                    status, endpoint
                )))
            }
            _ => {}
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| TrackerError::MalformedResponse(e.to_string()))?;
        parse_envelope(envelope)
    }

    fn parse_item(&self, raw: &Value) -> Result<TrackerItem, TrackerError> {
        let id = raw
            .get("id")
            .and_then(as_string)
            .ok_or_else(|| TrackerError::MalformedResponse("item without id".to_string()))?;
        let status = raw.get("status").cloned().unwrap_or(Value::Null);
        let promotion = status
            .get("discount")
            .and_then(as_string)
            .map(PromotionClass::from)
            .unwrap_or(PromotionClass::Normal);
        let promotion_ends_at = status.get("discountEndTime").and_then(|v| match v {
            Value::Number(n) => n.as_i64().and_then(promotion::from_epoch),
            Value::String(s) => promotion::parse_promotion_end(s, self.timezone),
            _ => None,
        });

        Ok(TrackerItem {
            id,
            name: raw.get("name").and_then(as_string).unwrap_or_default(),
            description: raw.get("smallDescr").and_then(as_string),
            category: raw.get("category").and_then(as_string),
            size_bytes: raw.get("size").and_then(as_u64).unwrap_or(0),
            seeders: status.get("seeders").and_then(as_u64).unwrap_or(0) as u32,
            leechers: status.get("leechers").and_then(as_u64).unwrap_or(0) as u32,
            promotion,
            promotion_ends_at,
        })
    }
}

/// Convert the tracker envelope into a result. Code `"0"` is success.
fn parse_envelope(envelope: Value) -> Result<Value, TrackerError> {
    let code = envelope.get("code").and_then(as_string);
    match code.as_deref() {
        Some("0") => Ok(envelope.get("data").cloned().unwrap_or(Value::Null)),
        Some(_) => Err(TrackerError::Api(
            envelope
                .get("message")
                .and_then(as_string)
                .unwrap_or_else(|| "request failed".to_string()),
        )),
        None => Err(TrackerError::MalformedResponse(
            "response without code".to_string(),
        )),
    }
}

/// Accept strings and numbers; the API uses both for the same fields.
fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_profile(data: &Value) -> Profile {
    let counts = data.get("memberCount").cloned().unwrap_or(Value::Null);
    Profile {
        username: data.get("username").and_then(as_string),
        uploaded_bytes: counts.get("uploaded").and_then(as_u64).unwrap_or(0),
        downloaded_bytes: counts.get("downloaded").and_then(as_u64).unwrap_or(0),
        ratio: counts.get("shareRate").and_then(as_f64).unwrap_or(0.0),
        bonus: counts.get("bonus").and_then(as_f64).unwrap_or(0.0),
    }
}

fn search_body(request: &SearchRequest) -> Value {
    let mut body = json!({
        "pageNumber": request.page,
        "pageSize": request.page_size,
        "mode": request.mode.as_str(),
        "sortField": "CREATED_DATE",
        "sortDirection": "DESC",
    });
    if !request.categories.is_empty() {
        body["categories"] = json!(request.categories);
    }
    if let Some(ref keyword) = request.keyword {
        body["keyword"] = json!(keyword);
    }
    if let Some(promotion) = request.promotion {
        body["discount"] = json!(promotion.as_str());
    }
    body
}

#[async_trait]
impl TrackerClient for MTeamClient {
    async fn search(
        &self,
        creds: &Credentials,
        request: &SearchRequest,
    ) -> Result<SearchPage, TrackerError> {
        let data = self
            .call_json(creds, "torrent/search", &search_body(request))
            .await?;

        let mut items = Vec::new();
        for raw in data.get("data").and_then(Value::as_array).into_iter().flatten() {
            match self.parse_item(raw) {
                Ok(item) => items.push(item),
                Err(e) => warn!(error = %e, "skipping malformed search entry"),
            }
        }
        let total = data
            .get("total")
            .and_then(as_u64)
            .unwrap_or(items.len() as u64);

        debug!(mode = request.mode.as_str(), total, returned = items.len(), "tracker search");
        Ok(SearchPage { total, items })
    }

    async fn fetch_bytes(
        &self,
        creds: &Credentials,
        item_id: &str,
    ) -> Result<Vec<u8>, TrackerError> {
        let data = self
            .call_form(creds, "torrent/genDlToken", &[("id", item_id)])
            .await?;
        let url = data.as_str().ok_or_else(|| {
            TrackerError::MalformedResponse("download token is not a URL".to_string())
        })?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(TrackerError::from_reqwest)?;
        if !response.status().is_success() {
            return Err(TrackerError::Api(format!(
                "download returned HTTP {}",
                response.status()
            )));
        }

        let bytes = response.bytes().await.map_err(TrackerError::from_reqwest)?;
        if bytes.is_empty() {
            return Err(TrackerError::MalformedResponse(
                "empty torrent payload".to_string(),
            ));
        }
        Ok(bytes.to_vec())
    }

    async fn profile(&self, creds: &Credentials) -> Result<Profile, TrackerError> {
        let data = self
            .call_json(creds, "member/profile", &json!({}))
            .await?;
        Ok(parse_profile(&data))
    }

    async fn detail(
        &self,
        creds: &Credentials,
        item_id: &str,
    ) -> Result<ItemDetail, TrackerError> {
        let data = self
            .call_form(creds, "torrent/detail", &[("id", item_id)])
            .await?;
        let item = self.parse_item(&data)?;
        Ok(ItemDetail { item, raw: data })
    }
}
