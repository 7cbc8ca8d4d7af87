//! HttpApi - the FlowChat REST API over reqwest.
//!
//! JSON bodies, bearer-token authentication, and status codes mapped onto
//! [`ApiError`] so callers never inspect raw responses.

use super::{ApiError, ChatApi};
use async_trait::async_trait;
use flowchat_types::{
    AuthResponse, ChatMessage, CreateMessage, ErrorBody, LoginRequest, MessageId, MessageList,
    RegisterRequest, Timestamp, UpdateMessage, UserInfo, UserList,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Configuration for HttpApi.
#[derive(Clone, Debug)]
pub struct HttpApiConfig {
    /// Whole-request timeout.
    pub request_timeout: Duration,
}

impl Default for HttpApiConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// HttpApi implements [`ChatApi`] against a FlowChat server.
///
/// # Example
///
/// ```ignore
/// let api = HttpApi::new("http://localhost:8000")?;
/// let auth = api.login(&request).await?;
/// let messages = api.fetch_messages(&auth.token, None).await?;
/// ```
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    /// Server origin without trailing slash, e.g. `http://localhost:8000`.
    base_url: String,
}

impl HttpApi {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_config(base_url, HttpApiConfig::default())
    }

    /// Create a client with custom configuration.
    pub fn with_config(base_url: impl Into<String>, config: HttpApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to create HTTP client: {e}")))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    /// Server origin requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn messages_request(&self, token: &str, since: Option<&Timestamp>) -> RequestBuilder {
        let request = self.client.get(self.url("/api/messages")).bearer_auth(token);
        match since {
            Some(ts) => request.query(&[("since", ts.as_str())]),
            None => request,
        }
    }

    fn message_url(&self, id: &MessageId) -> String {
        self.url(&format!("/api/messages/{}", id))
    }

    async fn send(request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await?;
        Self::check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ApiError> {
        let response = Self::send(request).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::Decode(format!("failed to parse response: {e}")))
    }

    /// Map a non-2xx response to the matching error.
    async fn check_status(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // Error bodies are best effort; a proxy may answer with HTML.
        let detail = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.detail)
            .unwrap_or_default();

        Err(match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
            StatusCode::FORBIDDEN => ApiError::Forbidden(detail),
            StatusCode::NOT_FOUND => ApiError::NotFound(detail),
            _ => ApiError::Status {
                status: status.as_u16(),
                detail,
            },
        })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl ChatApi for HttpApi {
    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        Self::send_json(self.client.post(self.url("/api/register")).json(request)).await
    }

    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError> {
        Self::send_json(self.client.post(self.url("/api/login")).json(request)).await
    }

    async fn me(&self, token: &str) -> Result<UserInfo, ApiError> {
        Self::send_json(self.client.get(self.url("/api/me")).bearer_auth(token)).await
    }

    async fn logout(&self, token: &str) -> Result<(), ApiError> {
        Self::send(self.client.post(self.url("/api/logout")).bearer_auth(token)).await?;
        Ok(())
    }

    async fn fetch_messages(
        &self,
        token: &str,
        since: Option<&Timestamp>,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let list: MessageList = Self::send_json(self.messages_request(token, since)).await?;
        Ok(list.messages)
    }

    async fn create_message(&self, token: &str, content: &str) -> Result<ChatMessage, ApiError> {
        let body = CreateMessage {
            content: content.to_string(),
        };
        Self::send_json(
            self.client
                .post(self.url("/api/messages"))
                .bearer_auth(token)
                .json(&body),
        )
        .await
    }

    async fn update_message(
        &self,
        token: &str,
        id: &MessageId,
        content: &str,
    ) -> Result<ChatMessage, ApiError> {
        let body = UpdateMessage {
            content: content.to_string(),
        };
        Self::send_json(self.client.put(self.message_url(id)).bearer_auth(token).json(&body)).await
    }

    async fn delete_message(&self, token: &str, id: &MessageId) -> Result<(), ApiError> {
        Self::send(self.client.delete(self.message_url(id)).bearer_auth(token)).await?;
        Ok(())
    }

    async fn list_users(&self, token: &str) -> Result<Vec<UserInfo>, ApiError> {
        let list: UserList =
            Self::send_json(self.client.get(self.url("/api/users")).bearer_auth(token)).await?;
        Ok(list.users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let api = HttpApi::new("http://localhost:8000/").unwrap();
        assert_eq!(api.base_url(), "http://localhost:8000");
        assert_eq!(api.url("/api/me"), "http://localhost:8000/api/me");
    }

    #[test]
    fn initial_fetch_has_no_since() {
        let api = HttpApi::new("http://localhost:8000").unwrap();
        let request = api.messages_request("tok", None).build().unwrap();

        assert_eq!(request.url().as_str(), "http://localhost:8000/api/messages");
        assert_eq!(request.headers()["authorization"], "Bearer tok");
    }

    #[test]
    fn incremental_fetch_encodes_since() {
        let api = HttpApi::new("http://localhost:8000").unwrap();
        let since = Timestamp::new("2024-05-01T10:00:00.123456+00:00");
        let request = api.messages_request("tok", Some(&since)).build().unwrap();

        let pairs: Vec<(String, String)> = request
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![("since".to_string(), since.as_str().to_string())]
        );
    }

    #[test]
    fn message_ids_land_in_the_path() {
        let api = HttpApi::new("http://localhost:8000").unwrap();
        assert_eq!(
            api.message_url(&MessageId::new("abc-123")),
            "http://localhost:8000/api/messages/abc-123"
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_error() {
        let api = HttpApi::with_config(
            "http://127.0.0.1:1",
            HttpApiConfig {
                request_timeout: Duration::from_secs(5),
            },
        )
        .unwrap();

        let err = api.me("tok").await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err:?}");
    }
}
