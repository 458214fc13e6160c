//! Messages exchanged with the display layer.

use serde::{Deserialize, Serialize};
use warren_types::InfoHash;

/// Kinds of message crossing the notification boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Request or response carrying one job's progress.
    GetInfo,
    /// Push-only signal telling the display to re-query the job list.
    RefreshInfo,
}

/// A request from the display layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFromWeb {
    /// What is being asked for.
    pub kind: MessageKind,
    /// The job the request is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_hash: Option<InfoHash>,
}

impl MessageFromWeb {
    /// Creates a progress request for one job.
    #[must_use]
    pub const fn get_info(info_hash: InfoHash) -> Self {
        Self {
            kind: MessageKind::GetInfo,
            info_hash: Some(info_hash),
        }
    }
}

/// Progress of one job, as answered to [`MessageKind::GetInfo`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressInfo {
    /// The job identifier.
    pub info_hash: InfoHash,
    /// Fraction of the content downloaded, in `[0, 1]`.
    pub percentage: f64,
    /// Human readable throughput.
    pub throughput: String,
    /// Human readable time remaining.
    pub eta: String,
}

/// A message sent to the display layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EngineMessage {
    /// Answer to a progress request.
    GetInfo(ProgressInfo),
    /// The job list changed.
    RefreshInfo,
}

impl EngineMessage {
    /// Returns the kind of this message.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::GetInfo(_) => MessageKind::GetInfo,
            Self::RefreshInfo => MessageKind::RefreshInfo,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_json_shape() {
        let hash: InfoHash = "c9e15763f722f23e98a29decdfae341b98d53056".parse().unwrap();
        let json = serde_json::to_value(MessageFromWeb::get_info(hash)).unwrap();

        assert_eq!(json["kind"], "GetInfo");
        assert_eq!(json["info_hash"], "c9e15763f722f23e98a29decdfae341b98d53056");
    }

    #[test]
    fn test_refresh_json_shape() {
        let json = serde_json::to_value(EngineMessage::RefreshInfo).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "RefreshInfo" }));
        assert_eq!(EngineMessage::RefreshInfo.kind(), MessageKind::RefreshInfo);
    }
}
