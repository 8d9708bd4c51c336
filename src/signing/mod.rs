//! Wallet key handling and request signing.
//!
//! Signers are parsed once per key and cached; every order and every
//! authenticated request signs through the cached instance.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;

use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use base64::{engine::general_purpose::URL_SAFE as BASE64, Engine};
use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use polymarket_client_sdk::clob::types::SignatureType;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use crate::config::Config;
use crate::error::TradingError;

type HmacSha256 = Hmac<Sha256>;

/// Signers keyed by a hash of the private key, so raw keys are never map keys.
static SIGNERS: Lazy<RwLock<HashMap<u64, PrivateKeySigner>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn key_hash(private_key: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    private_key.trim().hash(&mut hasher);
    hasher.finish()
}

/// Map the configured signature type onto the SDK's enum.
///
/// 0 is a plain EOA, 1 a Magic.link / email proxy wallet, 2 a Gnosis Safe.
/// Anything else is treated as an EOA.
pub fn signature_type_from_u8(sig_type: u8) -> SignatureType {
    match sig_type {
        1 => SignatureType::Proxy,
        2 => SignatureType::GnosisSafe,
        _ => SignatureType::Eoa,
    }
}

/// Operator-facing name of a signature type.
pub fn signature_type_label(sig_type: u8) -> &'static str {
    match sig_type {
        0 => "EOA",
        1 => "Magic.link proxy",
        2 => "Gnosis Safe",
        _ => "unknown (treated as EOA)",
    }
}

/// Parse a hex private key, with or without "0x".
pub fn create_signer(private_key: &str) -> Result<PrivateKeySigner, TradingError> {
    let key = private_key.trim();
    let key = key.strip_prefix("0x").unwrap_or(key);
    let bytes = hex::decode(key)
        .map_err(|e| TradingError::SigningError(format!("Invalid private key hex: {}", e)))?;

    let key_bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        TradingError::SigningError(format!("Private key must be 32 bytes, got {}", bytes.len()))
    })?;

    PrivateKeySigner::from_bytes(&key_bytes.into())
        .map_err(|e| TradingError::SigningError(format!("Failed to create signer: {}", e)))
}

/// Cached signer for `private_key`, created on first use.
pub fn get_or_create_signer(private_key: &str) -> Result<PrivateKeySigner, TradingError> {
    let hash = key_hash(private_key);

    {
        let cache = SIGNERS.read().map_err(|e| {
            TradingError::SigningError(format!("signer cache poisoned: {}", e))
        })?;
        if let Some(signer) = cache.get(&hash) {
            return Ok(signer.clone());
        }
    }

    let signer = create_signer(private_key)?;
    let mut cache = SIGNERS
        .write()
        .map_err(|e| TradingError::SigningError(format!("signer cache poisoned: {}", e)))?;
    let signer = cache.entry(hash).or_insert(signer).clone();
    debug!(address = %signer.address(), "Signer cached");
    Ok(signer)
}

/// Checksummed wallet address for a private key.
pub fn address_from_private_key(private_key: &str) -> Result<String, TradingError> {
    let signer = get_or_create_signer(private_key)?;
    Ok(signer.address().to_checksum(None))
}

/// EIP-191 sign `message`, returning the 65 signature bytes.
pub async fn sign_message(private_key: &str, message: &[u8]) -> Result<Vec<u8>, TradingError> {
    let signer = get_or_create_signer(private_key)?;
    let signature = signer
        .sign_message(message)
        .await
        .map_err(|e| TradingError::SigningError(format!("Failed to sign message: {}", e)))?;
    Ok(signature.as_bytes().to_vec())
}

/// Level-1 CLOB authentication headers: a signed timestamp proving key
/// ownership. The signature type is sent so proxy wallets resolve to their
/// funder on the venue side.
pub async fn generate_auth_headers(
    private_key: &str,
    signature_type: u8,
) -> Result<Vec<(String, String)>, TradingError> {
    let signer = get_or_create_signer(private_key)?;
    let address = signer.address().to_checksum(None);
    let timestamp = chrono::Utc::now().timestamp().to_string();
    let message = format!("polymarket:{}", timestamp);

    let signature = signer
        .sign_message(message.as_bytes())
        .await
        .map_err(|e| TradingError::SigningError(format!("Failed to sign auth message: {}", e)))?;

    Ok(vec![
        ("POLY_ADDRESS".to_string(), address),
        ("POLY_SIGNATURE".to_string(), format!("0x{}", hex::encode(signature.as_bytes()))),
        ("POLY_TIMESTAMP".to_string(), timestamp),
        ("POLY_NONCE".to_string(), "0".to_string()),
        ("POLY_SIGNATURE_TYPE".to_string(), signature_type.to_string()),
    ])
}

/// Level-2 API credentials issued by the CLOB for one wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCreds {
    #[serde(alias = "apiKey")]
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
}

impl ApiCreds {
    /// Credentials from configuration, when all three parts are set.
    pub fn from_config(config: &Config) -> Option<Self> {
        let part = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        Some(Self {
            api_key: part(&config.polymarket_api_key)?,
            secret: part(&config.polymarket_api_secret)?,
            passphrase: part(&config.polymarket_api_passphrase)?,
        })
    }
}

/// HMAC-SHA256 over `timestamp + METHOD + path + body`, keyed with the
/// base64 API secret and returned URL-safe base64 encoded.
pub fn l2_signature(
    secret: &str,
    timestamp: &str,
    method: &str,
    path: &str,
    body: &str,
) -> Result<String, TradingError> {
    let secret_bytes = BASE64
        .decode(secret.trim())
        .map_err(|e| TradingError::SigningError(format!("API secret is not base64: {}", e)))?;
    let message = format!("{}{}{}{}", timestamp, method.to_uppercase(), path, body);

    let mut mac = HmacSha256::new_from_slice(&secret_bytes)
        .map_err(|e| TradingError::SigningError(format!("Invalid HMAC key: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Level-2 CLOB authentication headers for one request.
pub fn l2_headers(
    private_key: &str,
    creds: &ApiCreds,
    method: &str,
    path: &str,
    body: &str,
) -> Result<Vec<(String, String)>, TradingError> {
    let address = address_from_private_key(private_key)?;
    let timestamp = chrono::Utc::now().timestamp().to_string();
    let signature = l2_signature(&creds.secret, &timestamp, method, path, body)?;

    Ok(vec![
        ("POLY_ADDRESS".to_string(), address),
        ("POLY_SIGNATURE".to_string(), signature),
        ("POLY_TIMESTAMP".to_string(), timestamp),
        ("POLY_API_KEY".to_string(), creds.api_key.clone()),
        ("POLY_PASSPHRASE".to_string(), creds.passphrase.clone()),
    ])
}

/// Wallet identity derived from configuration.
#[derive(Debug, Clone)]
pub struct WalletInfo {
    /// Address of the signing key.
    pub signer: String,
    /// Address holding the funds (the funder for proxy wallets).
    pub funder: String,
    /// SDK signature type.
    pub signature_type: SignatureType,
    /// Operator-facing signature type name.
    pub label: &'static str,
}

/// Resolve signer and funder addresses for `config`.
pub fn wallet_info(config: &Config) -> Result<WalletInfo, TradingError> {
    let signer = address_from_private_key(&config.polymarket_private_key)?;
    let funder = match config.polymarket_funder.as_deref() {
        Some(f) if !f.trim().is_empty() => f.trim().to_string(),
        _ => signer.clone(),
    };
    Ok(WalletInfo {
        signer,
        funder,
        signature_type: signature_type_from_u8(config.polymarket_signature_type),
        label: signature_type_label(config.polymarket_signature_type),
    })
}
