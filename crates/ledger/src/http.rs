//! JSON/HTTP gateway adapter.
//!
//! Talks to a gateway service in front of the ledger node. Contract
//! invocations and queries share one response envelope: `code` is zero on
//! success, `result` carries the contract return value either inline or as
//! a JSON-encoded string, and the transaction id and block height ride on
//! the envelope rather than in the contract result.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use attest_core::config::LedgerConfig;

use crate::client::LedgerClient;
use crate::error::LedgerError;
use crate::types::{AuditData, BatchProof, EntryOutcome, LogEntry};

#[derive(Debug, Serialize)]
struct GatewayRequest<'a> {
    method: &'a str,
    args: Value,
}

#[derive(Debug, Deserialize)]
struct GatewayEnvelope {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    tx_id: String,
    #[serde(default)]
    block_height: u64,
    #[serde(default)]
    result: Value,
}

/// Decode a contract result that may arrive inline or as a JSON string.
fn decode_result<T: serde::de::DeserializeOwned>(result: &Value) -> Result<T, LedgerError> {
    match result {
        Value::String(inner) => Ok(serde_json::from_str(inner)?),
        other => Ok(serde_json::from_value(other.clone())?),
    }
}

pub struct HttpLedgerClient {
    http: reqwest::Client,
    cfg: LedgerConfig,
}

impl HttpLedgerClient {
    /// Build a client with a per-request deadline. The worker additionally
    /// bounds every submit with its own ledger timeout.
    pub fn new(cfg: LedgerConfig, request_timeout: Duration) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        tracing::info!(
            gateway = %cfg.gateway_url,
            contract = %cfg.contract_name,
            "Ledger gateway client created"
        );
        Ok(Self { http, cfg })
    }

    async fn call(
        &self,
        endpoint: &str,
        method: &str,
        args: Value,
    ) -> Result<GatewayEnvelope, LedgerError> {
        let url = format!(
            "{}/v1/contracts/{}/{endpoint}",
            self.cfg.gateway_url.trim_end_matches('/'),
            self.cfg.contract_name
        );

        let response = self
            .http
            .post(&url)
            .json(&GatewayRequest { method, args })
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let envelope: GatewayEnvelope = response
            .error_for_status()
            .map_err(map_reqwest_error)?
            .json()
            .await
            .map_err(map_reqwest_error)?;

        if envelope.code != 0 {
            return Err(LedgerError::Contract {
                code: envelope.code,
                message: envelope.message,
            });
        }
        Ok(envelope)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> LedgerError {
    if err.is_timeout() {
        LedgerError::Timeout
    } else {
        LedgerError::Transport(err)
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn submit_batch(
        &self,
        entries: &[LogEntry],
    ) -> Result<(BatchProof, Vec<EntryOutcome>), LedgerError> {
        if entries.is_empty() {
            return Err(LedgerError::EmptyBatch);
        }

        let logs_json = serde_json::to_string(entries)?;
        let envelope = self
            .call(
                "invoke",
                &self.cfg.submit_batch_method,
                serde_json::json!({ "logs_json": logs_json }),
            )
            .await?;

        let outcomes: Vec<EntryOutcome> = decode_result(&envelope.result)?;
        let proof = BatchProof {
            transaction_id: envelope.tx_id,
            block_height: envelope.block_height,
        };

        tracing::debug!(
            tx_id = %proof.transaction_id,
            block_height = proof.block_height,
            entries = entries.len(),
            results = outcomes.len(),
            "Ledger batch submitted"
        );
        Ok((proof, outcomes))
    }

    async fn find_by_hash(&self, log_hash: &str) -> Result<String, LedgerError> {
        let envelope = self
            .call(
                "query",
                &self.cfg.find_by_hash_method,
                serde_json::json!({ "log_hash": log_hash }),
            )
            .await?;

        match envelope.result {
            Value::String(record) => Ok(record),
            other => Ok(other.to_string()),
        }
    }

    async fn get_by_tx(&self, tx_hash: &str) -> Result<AuditData, LedgerError> {
        if tx_hash.is_empty() {
            return Err(LedgerError::EmptyTxHash);
        }

        let envelope = self
            .call(
                "query",
                &self.cfg.get_by_tx_method,
                serde_json::json!({ "tx_hash": tx_hash }),
            )
            .await?;

        decode_result(&envelope.result)
    }

    async fn close(&self) {
        tracing::info!("Closing ledger gateway client");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_decodes_with_inline_result() {
        let raw = r#"{
            "code": 0,
            "tx_id": "tx-1",
            "block_height": 12,
            "result": [{"log_hash": "h1", "status": "Success", "message": ""}]
        }"#;
        let envelope: GatewayEnvelope = serde_json::from_str(raw).unwrap();
        let outcomes: Vec<EntryOutcome> = decode_result(&envelope.result).unwrap();
        assert_eq!(envelope.tx_id, "tx-1");
        assert_eq!(envelope.block_height, 12);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].status.is_success());
    }

    #[test]
    fn envelope_decodes_with_string_encoded_result() {
        let raw = r#"{
            "code": 0,
            "tx_id": "tx-2",
            "block_height": 3,
            "result": "[{\"log_hash\": \"h2\", \"status\": \"SkippedDuplicate\", \"message\": \"dup\"}]"
        }"#;
        let envelope: GatewayEnvelope = serde_json::from_str(raw).unwrap();
        let outcomes: Vec<EntryOutcome> = decode_result(&envelope.result).unwrap();
        assert_eq!(outcomes[0].log_hash, "h2");
        assert_eq!(outcomes[0].message, "dup");
    }

    #[test]
    fn envelope_defaults_are_lenient() {
        let envelope: GatewayEnvelope = serde_json::from_str(r#"{"code": 1}"#).unwrap();
        assert_eq!(envelope.code, 1);
        assert_eq!(envelope.message, "");
        assert!(envelope.result.is_null());
    }
}
