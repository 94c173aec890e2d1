use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::errors::ApiError;
use crate::models::{Activity, Booking, FavoriteIds, ItemType};

/// The backend as seen from the client. It owns every record and enforces
/// capacity authoritatively.
#[async_trait]
pub trait Marketplace: Send + Sync {
    async fn fetch_activities(
        &self,
        upcoming_only: bool,
        search: Option<&str>,
    ) -> Result<Vec<Activity>, ApiError>;

    async fn fetch_activity(&self, id: i64) -> Result<Activity, ApiError>;

    async fn create_booking(
        &self,
        activity_id: i64,
        tickets_number: i64,
    ) -> Result<Booking, ApiError>;

    async fn cancel_booking(&self, booking_id: i64) -> Result<(), ApiError>;

    async fn fetch_my_bookings(&self) -> Result<Vec<Booking>, ApiError>;

    async fn add_favorite(&self, item_id: i64, item_type: ItemType) -> Result<(), ApiError>;

    async fn remove_favorite(&self, item_id: i64, item_type: ItemType) -> Result<(), ApiError>;

    /// `None` fetches both products and activities.
    async fn fetch_favorite_ids(&self, item_type: Option<ItemType>)
        -> Result<FavoriteIds, ApiError>;
}

pub struct HttpMarketplace {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpMarketplace {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.api_base_url.clone(), config.api_token.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = self.token.as_deref() {
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(v) => {
                    headers.insert(AUTHORIZATION, v);
                }
                Err(_) => warn!("marketplace_api: token is not a valid header value"),
            }
        }
        headers
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Option<Value>, ApiError> {
        let resp = request
            .headers(self.headers())
            .send()
            .await
            .map_err(|e| transport_failed(url, e))?;

        let status = resp.status();
        let bytes = resp.bytes().await.map_err(|e| transport_failed(url, e))?;
        let body: Option<Value> = if bytes.is_empty() {
            None
        } else {
            serde_json::from_slice(&bytes).ok()
        };

        if !status.is_success() {
            warn!(%url, status = status.as_u16(), body = ?body, "marketplace_api_request_failed");
            return Err(ApiError::from_response(status, body));
        }
        debug!(%url, status = status.as_u16(), "marketplace_api_ok");
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        url: &str,
    ) -> Result<T, ApiError> {
        let body = self.send(request, url).await?.unwrap_or(Value::Null);
        decode(url, body)
    }
}

fn transport_failed(url: &str, err: impl ToString) -> ApiError {
    ApiError::Transport {
        url: url.to_string(),
        detail: err.to_string(),
    }
}

fn decode<T: DeserializeOwned>(url: &str, body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|e| ApiError::Decode {
        url: url.to_string(),
        detail: e.to_string(),
    })
}

fn with_params(url: &str, params: &[(&str, String)]) -> Result<Url, ApiError> {
    let parsed = if params.is_empty() {
        Url::parse(url)
    } else {
        Url::parse_with_params(url, params)
    };
    parsed.map_err(|e| ApiError::Transport {
        url: url.to_string(),
        detail: e.to_string(),
    })
}

#[async_trait]
impl Marketplace for HttpMarketplace {
    async fn fetch_activities(
        &self,
        upcoming_only: bool,
        search: Option<&str>,
    ) -> Result<Vec<Activity>, ApiError> {
        let base = self.url("/api/activities");
        let mut params = vec![("upcoming", upcoming_only.to_string())];
        if let Some(q) = search.map(str::trim).filter(|q| !q.is_empty()) {
            params.push(("search", q.to_string()));
        }
        let url = with_params(&base, &params)?;
        self.send_json(self.client.get(url.clone()), url.as_str())
            .await
    }

    async fn fetch_activity(&self, id: i64) -> Result<Activity, ApiError> {
        let url = self.url(&format!("/api/activities/{}", id));
        self.send_json(self.client.get(&url), &url).await
    }

    async fn create_booking(
        &self,
        activity_id: i64,
        tickets_number: i64,
    ) -> Result<Booking, ApiError> {
        let url = self.url("/api/bookings");
        let request = self.client.post(&url).json(&serde_json::json!({
            "activity_id": activity_id,
            "tickets_number": tickets_number,
        }));
        self.send_json(request, &url).await
    }

    async fn cancel_booking(&self, booking_id: i64) -> Result<(), ApiError> {
        let url = self.url(&format!("/api/bookings/{}", booking_id));
        self.send(self.client.delete(&url), &url).await?;
        Ok(())
    }

    async fn fetch_my_bookings(&self) -> Result<Vec<Booking>, ApiError> {
        let url = self.url("/api/bookings/me");
        self.send_json(self.client.get(&url), &url).await
    }

    async fn add_favorite(&self, item_id: i64, item_type: ItemType) -> Result<(), ApiError> {
        let url = self.url("/api/favorites");
        let request = self.client.post(&url).json(&serde_json::json!({
            "item_id": item_id,
            "item_type": item_type,
        }));
        self.send(request, &url).await?;
        Ok(())
    }

    async fn remove_favorite(&self, item_id: i64, item_type: ItemType) -> Result<(), ApiError> {
        let url = self.url(&format!("/api/favorites/{}/{}", item_type.as_str(), item_id));
        self.send(self.client.delete(&url), &url).await?;
        Ok(())
    }

    async fn fetch_favorite_ids(
        &self,
        item_type: Option<ItemType>,
    ) -> Result<FavoriteIds, ApiError> {
        let base = self.url("/api/favorites/ids");
        let params: Vec<(&str, String)> = item_type
            .map(|t| vec![("item_type", t.as_str().to_string())])
            .unwrap_or_default();
        let url = with_params(&base, &params)?;
        self.send_json(self.client.get(url.clone()), url.as_str())
            .await
    }
}
