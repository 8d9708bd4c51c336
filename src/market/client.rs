//! Authenticated Polymarket CLOB HTTP transport.

use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use crate::config::Config;
use crate::error::{MarketError, TradingError};
use crate::signing::{self, ApiCreds};
use crate::trading::execution::parse_order_state;
use crate::trading::order::OrderState;

/// Polymarket CLOB API client.
#[derive(Debug, Clone)]
pub struct PolymarketClient {
    /// HTTP client for API requests.
    http: reqwest::Client,
    /// Base URL for CLOB API.
    clob_url: String,
    /// Wallet private key.
    private_key: String,
    /// Signature type (0=EOA, 1=Magic.link, 2=Gnosis).
    signature_type: u8,
    /// Funder address (for Magic.link).
    funder: Option<String>,
    /// L2 API credentials, when configured.
    creds: Option<ApiCreds>,
    /// Chain ID (137 for Polygon).
    chain_id: u64,
}

/// Convert a raw collateral balance into USDC.
///
/// A value with a decimal point is already in USDC; an integer is in
/// 6-decimal base units.
pub fn parse_usdc_balance(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    let value: Decimal = raw.parse().ok()?;
    if raw.contains('.') {
        Some(value)
    } else {
        Some(value / Decimal::new(1_000_000, 0))
    }
}

/// USDC balance from a `/balance-allowance` body. A missing or malformed
/// `balance` field is an error, never a zero balance.
pub fn balance_from_response(json: &Value) -> Result<Decimal, TradingError> {
    let raw = match json.get("balance") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(TradingError::BalanceQueryFailed(format!(
                "no balance in response: {}",
                json
            )))
        }
    };

    parse_usdc_balance(&raw)
        .ok_or_else(|| TradingError::BalanceQueryFailed(format!("unparseable balance {:?}", raw)))
}

/// Parse an order submission body; anything other than JSON is a failed submission.
pub fn order_response_from_text(text: &str) -> Result<Value, TradingError> {
    serde_json::from_str(text).map_err(|_| {
        TradingError::SubmissionFailed(format!("unreadable order response: {}", text.trim()))
    })
}

impl PolymarketClient {
    /// Create a new Polymarket client from config.
    pub fn new(config: &Config) -> Result<Self, TradingError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .connect_timeout(Duration::from_secs(5))
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| TradingError::SubmissionFailed(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            clob_url: config.polymarket_host.trim_end_matches('/').to_string(),
            private_key: config.polymarket_private_key.clone(),
            signature_type: config.polymarket_signature_type,
            funder: config.polymarket_funder.clone(),
            creds: ApiCreds::from_config(config),
            chain_id: 137, // Polygon mainnet
        })
    }

    /// Get the HTTP client reference.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Get the signature type.
    pub fn signature_type(&self) -> u8 {
        self.signature_type
    }

    /// Get funder address.
    pub fn funder(&self) -> Option<&str> {
        self.funder.as_deref()
    }

    /// Get the CLOB base URL.
    pub fn clob_url(&self) -> &str {
        &self.clob_url
    }

    /// Get the chain ID.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Get the wallet address derived from the private key.
    pub fn get_address(&self) -> Result<String, TradingError> {
        signing::address_from_private_key(&self.private_key)
    }

    /// Address that holds the funds: the funder for proxy wallets, else the signer.
    pub fn maker_address(&self) -> Result<String, TradingError> {
        match &self.funder {
            Some(funder) if !funder.is_empty() => Ok(funder.clone()),
            _ => self.get_address(),
        }
    }

    /// Order owner sent alongside signed orders: the API key when present.
    pub fn owner(&self) -> Result<String, TradingError> {
        match &self.creds {
            Some(creds) => Ok(creds.api_key.clone()),
            None => self.maker_address(),
        }
    }

    /// Whether requests are signed with L2 API credentials.
    pub fn has_api_creds(&self) -> bool {
        self.creds.is_some()
    }

    /// HMAC-signed L2 headers when credentials are configured, else the
    /// wallet-signed L1 headers.
    async fn auth_headers(
        &self,
        method: &str,
        path: &str,
        body: &str,
    ) -> Result<Vec<(String, String)>, TradingError> {
        match &self.creds {
            Some(creds) => signing::l2_headers(&self.private_key, creds, method, path, body),
            None => signing::generate_auth_headers(&self.private_key, self.signature_type).await,
        }
    }

    /// Create L2 API credentials for this wallet, deriving the existing set
    /// when the venue refuses to issue a new one.
    #[instrument(skip(self))]
    pub async fn create_api_key(&self) -> Result<ApiCreds, TradingError> {
        let create = format!("{}/auth/api-key", self.clob_url);
        match self.request_creds(self.http.post(&create)).await {
            Ok(creds) => Ok(creds),
            Err(e) => {
                debug!(error = %e, "API key creation failed, deriving existing key");
                let derive = format!("{}/auth/derive-api-key", self.clob_url);
                self.request_creds(self.http.get(&derive)).await
            }
        }
    }

    async fn request_creds(
        &self,
        mut request: reqwest::RequestBuilder,
    ) -> Result<ApiCreds, TradingError> {
        for (key, value) in
            signing::generate_auth_headers(&self.private_key, self.signature_type).await?
        {
            request = request.header(&key, &value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TradingError::SigningError(format!("HTTP request failed: {}", e)))?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(TradingError::SigningError(format!("HTTP {} - {}", status, text)));
        }

        serde_json::from_str(&text)
            .map_err(|e| TradingError::SigningError(format!("unreadable API credentials: {}", e)))
    }

    /// Read the advertised API version, if the venue exposes one.
    pub async fn api_version(&self) -> Option<u64> {
        let url = format!("{}/version", self.clob_url);
        let response = self.http.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let json: Value = response.json().await.ok()?;
        json.get("version").and_then(|v| {
            v.as_u64()
                .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        })
    }

    /// Get the raw order book for a token.
    #[instrument(skip(self), fields(token_id = %token_id))]
    pub async fn get_order_book(&self, token_id: &str) -> Result<Value, MarketError> {
        let url = format!("{}/book", self.clob_url);

        let response = self
            .http
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MarketError::FetchFailed {
                resource: token_id.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        response
            .json()
            .await
            .map_err(|e| MarketError::ParseError(format!("Failed to parse order book: {}", e)))
    }

    /// Get USDC collateral balance using an authenticated API call.
    #[instrument(skip(self))]
    pub async fn get_balance(&self) -> Result<Decimal, TradingError> {
        debug!("Getting balance from Polymarket API");

        let path = "/balance-allowance";
        let url = format!("{}{}", self.clob_url, path);
        let mut request = self.http.get(&url).query(&[
            ("asset_type", "COLLATERAL".to_string()),
            ("signature_type", self.signature_type.to_string()),
        ]);
        for (key, value) in self.auth_headers("GET", path, "").await? {
            request = request.header(&key, &value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TradingError::BalanceQueryFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TradingError::BalanceQueryFailed(format!(
                "HTTP {} - {}",
                status, body
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| TradingError::BalanceQueryFailed(format!("Failed to parse balance: {}", e)))?;

        let balance = balance_from_response(&json)?;
        debug!(balance = %balance, "Retrieved USDC balance");
        Ok(balance)
    }

    /// Sign an order payload, returning the hex signature.
    pub async fn sign_payload(&self, payload: &Map<String, Value>) -> Result<String, TradingError> {
        let message = serde_json::to_string(payload)
            .map_err(|e| TradingError::SigningError(format!("Failed to encode order: {}", e)))?;
        let signature = signing::sign_message(&self.private_key, message.as_bytes()).await?;
        Ok(format!("0x{}", hex::encode(signature)))
    }

    /// POST an order body to the CLOB and return the raw JSON response.
    #[instrument(skip(self, body))]
    pub async fn post_order_body(&self, body: &Value) -> Result<Value, TradingError> {
        let path = "/order";
        let url = format!("{}{}", self.clob_url, path);
        let payload = serde_json::to_string(body)
            .map_err(|e| TradingError::SubmissionFailed(format!("Failed to encode order: {}", e)))?;

        let mut request = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        for (key, value) in self.auth_headers("POST", path, &payload).await? {
            request = request.header(&key, &value);
        }

        let response = request
            .body(payload)
            .send()
            .await
            .map_err(|e| TradingError::SubmissionFailed(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(TradingError::SubmissionFailed(format!(
                "HTTP {} - {}",
                status, text
            )));
        }

        order_response_from_text(&text)
    }

    /// Get current order status from the API.
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: &str) -> Result<Option<OrderState>, TradingError> {
        let path = format!("/data/order/{}", order_id);
        let url = format!("{}{}", self.clob_url, path);

        let mut request = self.http.get(&url);
        for (key, value) in self.auth_headers("GET", &path, "").await? {
            request = request.header(&key, &value);
        }

        let response = request.send().await.map_err(|e| TradingError::StatusFailed {
            order_id: order_id.to_string(),
            reason: format!("HTTP request failed: {}", e),
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(TradingError::StatusFailed {
                order_id: order_id.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let json: Value = response.json().await.map_err(|e| TradingError::StatusFailed {
            order_id: order_id.to_string(),
            reason: format!("Failed to parse response: {}", e),
        })?;

        if json.is_null() {
            return Ok(None);
        }
        Ok(Some(parse_order_state(order_id, &json)))
    }

    /// Cancel one order.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: &str) -> Result<bool, TradingError> {
        let path = "/order";
        let url = format!("{}{}", self.clob_url, path);
        let payload = json!({ "orderID": order_id }).to_string();

        let mut request = self
            .http
            .delete(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        for (key, value) in self.auth_headers("DELETE", path, &payload).await? {
            request = request.header(&key, &value);
        }

        let response = request.body(payload).send().await.map_err(|e| TradingError::CancelFailed {
            order_id: order_id.to_string(),
            reason: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(TradingError::CancelFailed {
                order_id: order_id.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let json: Value = response.json().await.unwrap_or_default();
        let not_canceled = json
            .get("not_canceled")
            .and_then(Value::as_object)
            .is_some_and(|m| m.contains_key(order_id));
        Ok(!not_canceled)
    }
}
