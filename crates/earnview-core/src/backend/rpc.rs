//! HTTP client for PostgREST-style remote procedures
//!
//! Every call is `POST {base}/rest/v1/rpc/{function}` with a JSON object of
//! `p_`-prefixed parameters.

use super::{ClaimRequest, ClaimResponse, RewardBackend};
use crate::{config::RpcConfig, Error, Result, UserId, VideoDescriptor};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};
use url::Url;

/// Reqwest-backed [`RewardBackend`]
pub struct RpcClient {
    client: Client,
    config: RpcConfig,
}

impl RpcClient {
    pub fn new(config: RpcConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { client, config })
    }

    pub fn with_client(client: Client, config: RpcConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// URL of a remote procedure
    pub fn endpoint(&self, function: &str) -> Result<Url> {
        self.config
            .base_url
            .join(&format!("rest/v1/rpc/{function}"))
            .map_err(|e| Error::InvalidConfig(format!("bad RPC endpoint for {function}: {e}")))
    }

    async fn call<T: DeserializeOwned>(&self, function: &str, params: serde_json::Value) -> Result<T> {
        let url = self.endpoint(function)?;
        let bearer = self
            .config
            .access_token
            .as_deref()
            .unwrap_or(&self.config.api_key);

        let response = self
            .client
            .post(url)
            .header("apikey", &self.config.api_key)
            .bearer_auth(bearer)
            .json(&params)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        debug!(function, status = status.as_u16(), "RPC call succeeded");
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl RewardBackend for RpcClient {
    #[instrument(skip(self), fields(video_id = %request.video_id))]
    async fn claim_reward(&self, request: &ClaimRequest) -> Result<ClaimResponse> {
        let reply: OneOrMany<ClaimResponse> = self
            .call(
                &self.config.functions.claim_reward,
                json!({
                    "p_user_id": request.user_id,
                    "p_video_id": request.video_id,
                    "p_watched_seconds": request.watched_seconds,
                    "p_is_auto_skip": request.is_auto_skip,
                }),
            )
            .await?;
        reply
            .into_first()
            .ok_or_else(|| Error::rejected("empty reply from claim procedure"))
    }

    #[instrument(skip(self))]
    async fn fetch_queue(&self, user_id: &UserId) -> Result<Vec<VideoDescriptor>> {
        self.call(
            &self.config.functions.fetch_queue,
            json!({ "p_user_id": user_id }),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn refresh_balance(&self, user_id: &UserId) -> Result<u64> {
        let reply: BalanceReply = self
            .call(
                &self.config.functions.refresh_balance,
                json!({ "p_user_id": user_id }),
            )
            .await?;
        reply
            .coins()
            .ok_or_else(|| Error::rejected("empty reply from balance procedure"))
    }
}

/// Set-returning functions reply with an array, scalar ones with an object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_first(self) -> Option<T> {
        match self {
            OneOrMany::One(value) => Some(value),
            OneOrMany::Many(values) => values.into_iter().next(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BalanceRow {
    coins: u64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BalanceReply {
    Plain(u64),
    Row(BalanceRow),
    Rows(Vec<BalanceRow>),
}

impl BalanceReply {
    fn coins(self) -> Option<u64> {
        match self {
            BalanceReply::Plain(coins) => Some(coins),
            BalanceReply::Row(row) => Some(row.coins),
            BalanceReply::Rows(rows) => rows.first().map(|row| row.coins),
        }
    }
}

/// PostgREST error body
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    code: Option<String>,
}

fn map_send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::ConnectionTimeout
    } else if e.is_connect() {
        Error::Network(e.to_string())
    } else {
        Error::Transport(e)
    }
}

/// Gateway failures mean the server was not reached; anything else is the
/// server answering no
fn status_error(status: StatusCode, body: &str) -> Error {
    if matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    ) {
        return Error::Network(format!("server unreachable ({status})"));
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => Error::Rejected {
            code: parsed.code,
            message: parsed.message.unwrap_or_else(|| status.to_string()),
        },
        Err(_) => {
            let trimmed = body.trim();
            Error::Rejected {
                code: Some(status.as_str().to_string()),
                message: if trimmed.is_empty() {
                    status.to_string()
                } else {
                    trimmed.to_string()
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RpcClient {
        let config = RpcConfig::new(Url::parse("https://api.example.com/").unwrap(), "anon");
        RpcClient::new(config).unwrap()
    }

    #[test]
    fn test_endpoint() {
        let url = client().endpoint("claim_video_reward").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/rest/v1/rpc/claim_video_reward");
    }

    #[test]
    fn test_gateway_errors_are_network_class() {
        let err = status_error(StatusCode::SERVICE_UNAVAILABLE, "");
        assert!(err.is_network());
    }

    #[test]
    fn test_postgrest_error_body() {
        let err = status_error(
            StatusCode::BAD_REQUEST,
            r#"{"code":"P0001","message":"Video already completed","details":null,"hint":null}"#,
        );
        assert!(!err.is_network());
        match err {
            Error::Rejected { code, message } => {
                assert_eq!(code.as_deref(), Some("P0001"));
                assert_eq!(message, "Video already completed");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_plain_text_error_body() {
        match status_error(StatusCode::FORBIDDEN, "  permission denied ") {
            Error::Rejected { code, message } => {
                assert_eq!(code.as_deref(), Some("403"));
                assert_eq!(message, "permission denied");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_reply_shapes() {
        let many: OneOrMany<ClaimResponse> =
            serde_json::from_str(r#"[{"success":true,"videoCompleted":false}]"#).unwrap();
        assert_eq!(many.into_first(), Some(ClaimResponse::accepted(false)));

        let one: OneOrMany<ClaimResponse> =
            serde_json::from_str(r#"{"success":true,"video_completed":true}"#).unwrap();
        assert_eq!(one.into_first(), Some(ClaimResponse::accepted(true)));

        let plain: BalanceReply = serde_json::from_str("120").unwrap();
        assert_eq!(plain.coins(), Some(120));
        let rows: BalanceReply = serde_json::from_str(r#"[{"coins":7}]"#).unwrap();
        assert_eq!(rows.coins(), Some(7));
        let empty: BalanceReply = serde_json::from_str("[]").unwrap();
        assert_eq!(empty.coins(), None);
    }
}
