//! Outbound adapter for the directory service.
//!
//! The directory owns identity, wallets, and table metadata. The game
//! server only ever reports intents to it: token verification at the
//! handshake, buy-in debits and payout credits, unseating, cleanup
//! checks, and best-effort hand-history records. In `test` mode every
//! call short-circuits locally so the core runs without the service.

pub mod errors;

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub use errors::{DirectoryError, DirectoryResult};

use crate::game::hand::HandSummary;

/// Bounded attempts for wallet operations; other calls fail fast.
const WALLET_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF_MS: u64 = 200;

/// Whether directory calls go over the wire or short-circuit locally.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServiceMode {
    Prod,
    Test,
}

impl FromStr for ServiceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prod" => Ok(Self::Prod),
            "test" => Ok(Self::Test),
            other => Err(format!("unknown mode '{other}', expected prod or test")),
        }
    }
}

/// Identity attached to a verified credential token.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct VerifiedUser {
    pub id: i64,
    pub username: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletReceipt {
    pub success: bool,
    pub new_balance: i64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupOutcome {
    pub deleted: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTableConfig {
    pub action_timeout_seconds: Option<u64>,
}

/// Claims carried by locally-verified test-mode tokens.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TokenClaims {
    pub user_id: i64,
    pub username: String,
    pub exp: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest<'a> {
    token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WalletRequest<'a> {
    user_id: i64,
    community_id: Option<&'a str>,
    amount: i64,
    memo: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UnseatRequest {
    user_id: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HandHistoryRequest<'a> {
    community_id: Option<&'a str>,
    table_id: &'a str,
    name: &'a str,
    hand_data: &'a HandSummary,
}

pub struct DirectoryClient {
    base_url: String,
    http: reqwest::Client,
    mode: ServiceMode,
    token_secret: Option<String>,
}

impl DirectoryClient {
    pub fn new(base_url: String, mode: ServiceMode, token_secret: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            base_url,
            http,
            mode,
            token_secret,
        }
    }

    pub fn mode(&self) -> ServiceMode {
        self.mode
    }

    /// Verify a bearer credential token. Prod asks the directory; test
    /// mode validates the signed claims locally.
    pub async fn verify_token(&self, token: &str) -> DirectoryResult<VerifiedUser> {
        if self.mode == ServiceMode::Test {
            let secret = self.token_secret.as_deref().ok_or_else(|| {
                DirectoryError::Authentication("test mode requires AUTH_TOKEN_SECRET".to_string())
            })?;
            let data = jsonwebtoken::decode::<TokenClaims>(
                token,
                &DecodingKey::from_secret(secret.as_bytes()),
                &Validation::default(),
            )
            .map_err(|e| DirectoryError::Authentication(e.to_string()))?;
            return Ok(VerifiedUser {
                id: data.claims.user_id,
                username: data.claims.username,
            });
        }

        let response = self
            .http
            .post(format!("{}/api/internal/auth/verify", self.base_url))
            .json(&VerifyRequest { token })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DirectoryError::Authentication(
                "invalid or expired token".to_string(),
            ));
        }
        response
            .json::<VerifiedUser>()
            .await
            .map_err(|e| DirectoryError::BadResponse(e.to_string()))
    }

    /// Mint a token that `verify_token` accepts in test mode.
    pub fn issue_test_token(&self, user_id: i64, username: &str) -> DirectoryResult<String> {
        let secret = self.token_secret.as_deref().ok_or_else(|| {
            DirectoryError::Authentication("test mode requires AUTH_TOKEN_SECRET".to_string())
        })?;
        let claims = TokenClaims {
            user_id,
            username: username.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3_600) as usize,
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| DirectoryError::BadResponse(e.to_string()))
    }

    /// Report a buy-in debit intent. Retried with bounded attempts.
    pub async fn debit_wallet(
        &self,
        user_id: i64,
        community_id: Option<&str>,
        amount: i64,
        memo: &str,
    ) -> DirectoryResult<WalletReceipt> {
        self.wallet_call("debit", user_id, community_id, amount, memo)
            .await
    }

    /// Report a payout credit intent. Retried with bounded attempts.
    pub async fn credit_wallet(
        &self,
        user_id: i64,
        community_id: Option<&str>,
        amount: i64,
        memo: &str,
    ) -> DirectoryResult<WalletReceipt> {
        self.wallet_call("credit", user_id, community_id, amount, memo)
            .await
    }

    async fn wallet_call(
        &self,
        op: &str,
        user_id: i64,
        community_id: Option<&str>,
        amount: i64,
        memo: &str,
    ) -> DirectoryResult<WalletReceipt> {
        if self.mode == ServiceMode::Test {
            return Ok(WalletReceipt {
                success: true,
                new_balance: 0,
            });
        }

        let url = format!("{}/api/internal/wallet/{op}", self.base_url);
        let body = WalletRequest {
            user_id,
            community_id,
            amount,
            memo,
        };
        let mut last_err = None;
        for attempt in 1..=WALLET_ATTEMPTS {
            match self.http.post(&url).json(&body).send().await {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<WalletReceipt>()
                        .await
                        .map_err(|e| DirectoryError::BadResponse(e.to_string()));
                }
                Ok(response) => {
                    // The directory saw the request and said no; retrying
                    // would double-report the intent.
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    return Err(DirectoryError::Rejected(format!("{status}: {text}")));
                }
                Err(e) => {
                    log::warn!("wallet {op} attempt {attempt}/{WALLET_ATTEMPTS} failed: {e}");
                    last_err = Some(e);
                    tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64))
                        .await;
                }
            }
        }
        Err(DirectoryError::Unavailable(
            last_err.expect("at least one attempt"),
        ))
    }

    pub async fn unseat_player(&self, table_id: &str, user_id: i64) -> DirectoryResult<()> {
        if self.mode == ServiceMode::Test {
            return Ok(());
        }
        let response = self
            .http
            .post(format!(
                "{}/api/internal/tables/{table_id}/unseat",
                self.base_url
            ))
            .json(&UnseatRequest { user_id })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DirectoryError::Rejected(response.status().to_string()));
        }
        Ok(())
    }

    /// Ask the directory whether an emptied table should be torn down.
    pub async fn check_cleanup(&self, table_id: &str) -> DirectoryResult<bool> {
        if self.mode == ServiceMode::Test {
            return Ok(true);
        }
        let response = self
            .http
            .post(format!(
                "{}/api/internal/tables/{table_id}/check-cleanup",
                self.base_url
            ))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DirectoryError::Rejected(response.status().to_string()));
        }
        response
            .json::<CleanupOutcome>()
            .await
            .map(|c| c.deleted)
            .map_err(|e| DirectoryError::BadResponse(e.to_string()))
    }

    /// Fetch directory-side table settings (action timeout and friends).
    pub async fn table_config(&self, table_id: &str) -> DirectoryResult<RemoteTableConfig> {
        if self.mode == ServiceMode::Test {
            return Ok(RemoteTableConfig {
                action_timeout_seconds: None,
            });
        }
        let response = self
            .http
            .get(format!(
                "{}/api/internal/tables/{table_id}/config",
                self.base_url
            ))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DirectoryError::Rejected(response.status().to_string()));
        }
        response
            .json::<RemoteTableConfig>()
            .await
            .map_err(|e| DirectoryError::BadResponse(e.to_string()))
    }

    /// Record a completed hand. Best-effort: callers log failures and
    /// move on.
    pub async fn record_hand_history(
        &self,
        community_id: Option<&str>,
        table_id: &str,
        name: &str,
        summary: &HandSummary,
    ) -> DirectoryResult<()> {
        if self.mode == ServiceMode::Test {
            return Ok(());
        }
        let response = self
            .http
            .post(format!("{}/api/internal/hands", self.base_url))
            .json(&HandHistoryRequest {
                community_id,
                table_id,
                name,
                hand_data: summary,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DirectoryError::Rejected(response.status().to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> DirectoryClient {
        DirectoryClient::new(
            "http://localhost:0".to_string(),
            ServiceMode::Test,
            Some("a-secret-long-enough-for-tests".to_string()),
        )
    }

    #[tokio::test]
    async fn test_mode_round_trips_tokens() {
        let client = test_client();
        let token = client.issue_test_token(42, "alice").unwrap();
        let user = client.verify_token(&token).await.unwrap();
        assert_eq!(user.id, 42);
        assert_eq!(user.username, "alice");
    }

    #[tokio::test]
    async fn test_mode_rejects_garbage_tokens() {
        let client = test_client();
        assert!(matches!(
            client.verify_token("not-a-token").await,
            Err(DirectoryError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_mode_rejects_tokens_signed_with_other_secret() {
        let other = DirectoryClient::new(
            "http://localhost:0".to_string(),
            ServiceMode::Test,
            Some("a-different-secret-entirely!".to_string()),
        );
        let token = other.issue_test_token(7, "mallory").unwrap();
        assert!(test_client().verify_token(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_mode_short_circuits_wallet_ops() {
        let client = test_client();
        let receipt = client
            .debit_wallet(1, Some("community-1"), 500, "buy-in")
            .await
            .unwrap();
        assert!(receipt.success);
        assert!(client.unseat_player("table_1", 1).await.is_ok());
        assert!(client.check_cleanup("table_1").await.unwrap());
    }

    #[test]
    fn mode_parses_from_str() {
        assert_eq!("prod".parse::<ServiceMode>().unwrap(), ServiceMode::Prod);
        assert_eq!("test".parse::<ServiceMode>().unwrap(), ServiceMode::Test);
        assert!("staging".parse::<ServiceMode>().is_err());
    }
}
