//! Queue payload shared between the ingestion and processing stages.

use serde::{Deserialize, Serialize};

/// A single accepted log submission travelling through the queue.
///
/// Serialized as a self-describing JSON record. The field names on the wire
/// are PascalCase for compatibility with existing consumers, and
/// `received_timestamp` is a unix-second string for the same reason.
/// The queue partition key is `request_id`, so redeliveries always land on
/// the partition (and therefore the worker) that saw the message first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    #[serde(rename = "RequestID")]
    pub request_id: String,

    #[serde(rename = "LogContent")]
    pub log_content: String,

    #[serde(rename = "LogHash")]
    pub log_hash: String,

    #[serde(rename = "SourceOrgID")]
    pub source_org_id: String,

    #[serde(rename = "ReceivedTimestamp")]
    pub received_timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LogMessage {
        LogMessage {
            request_id: "a1b1c1d1-e1f1-1111-2222-1234567890ab".to_string(),
            log_content: "some log line".to_string(),
            log_hash: "abc123".to_string(),
            source_org_id: "org-1".to_string(),
            received_timestamp: "1700000000".to_string(),
        }
    }

    #[test]
    fn wire_format_uses_pascal_case_keys() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["RequestID"], "a1b1c1d1-e1f1-1111-2222-1234567890ab");
        assert_eq!(json["LogContent"], "some log line");
        assert_eq!(json["LogHash"], "abc123");
        assert_eq!(json["SourceOrgID"], "org-1");
        assert_eq!(json["ReceivedTimestamp"], "1700000000");
    }

    #[test]
    fn round_trips_through_json() {
        let msg = sample();
        let bytes = serde_json::to_vec(&msg).unwrap();
        let back: LogMessage = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, msg);
    }
}
