//! Signaling wire protocol types
//!
//! Small tagged JSON records exchanged over the relay WebSocket. Clients
//! submit offers, answers, and ICE candidates; the relay echoes descriptions
//! back to the sender and floods candidates to everyone else.

use serde::{Deserialize, Serialize};

/// A session description as produced by the peer connection, mirroring the
/// browser `RTCSessionDescription` JSON shape
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SdpPayload {
    /// Description type ("offer" or "answer")
    #[serde(rename = "type")]
    pub kind: String,

    /// Raw SDP text
    pub sdp: String,
}

impl SdpPayload {
    /// Create an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: "offer".to_string(),
            sdp: sdp.into(),
        }
    }

    /// Create an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: "answer".to_string(),
            sdp: sdp.into(),
        }
    }

    /// Whether this description is an offer
    pub fn is_offer(&self) -> bool {
        self.kind == "offer"
    }

    /// Whether this description is an answer
    pub fn is_answer(&self) -> bool {
        self.kind == "answer"
    }
}

/// An ICE candidate descriptor, mirroring the browser `RTCIceCandidateInit`
/// JSON shape (camelCase on the wire)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePayload {
    /// Candidate attribute line
    pub candidate: String,

    /// Media stream identification tag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    /// Index of the media description the candidate belongs to
    #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,

    /// ICE username fragment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// Messages a client sends to the relay
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientSignal {
    /// Submit a local offer; the relay echoes it back as `offer-created`
    Offer {
        /// The offer description
        sdp: SdpPayload,
    },

    /// Submit a local answer; the relay echoes it back as `answer-created`
    Answer {
        /// The answer description
        sdp: SdpPayload,
    },

    /// Trickle one ICE candidate; the relay floods it to all other peers
    IceCandidate {
        /// The candidate descriptor
        candidate: CandidatePayload,
    },

    /// Any unrecognized message type
    #[serde(other)]
    Unknown,
}

/// Messages the relay sends to a client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerSignal {
    /// Acknowledgement sent once when the connection is registered
    Connected,

    /// Echo of an offer this client submitted
    OfferCreated {
        /// The offer description as submitted
        sdp: SdpPayload,
    },

    /// Echo of an answer this client submitted
    AnswerCreated {
        /// The answer description as submitted
        sdp: SdpPayload,
    },

    /// A candidate trickled by another peer
    IceCandidate {
        /// The candidate descriptor
        candidate: CandidatePayload,
    },

    /// The relay could not parse the previous message
    Error {
        /// Human-readable description of what was rejected
        message: String,
    },

    /// Any unrecognized message type (ignored by clients)
    #[serde(other)]
    Unknown,
}

impl ClientSignal {
    /// Convert message to JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to serialize client signal: {}", e))
        })
    }

    /// Parse message from JSON string
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to deserialize client signal: {}", e))
        })
    }

    /// Get the wire name of this message type
    pub fn kind(&self) -> &'static str {
        match self {
            ClientSignal::Offer { .. } => "offer",
            ClientSignal::Answer { .. } => "answer",
            ClientSignal::IceCandidate { .. } => "ice-candidate",
            ClientSignal::Unknown => "unknown",
        }
    }
}

impl ServerSignal {
    /// Convert message to JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to serialize server signal: {}", e))
        })
    }

    /// Parse message from JSON string
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to deserialize server signal: {}", e))
        })
    }

    /// Get the wire name of this message type
    pub fn kind(&self) -> &'static str {
        match self {
            ServerSignal::Connected => "connected",
            ServerSignal::OfferCreated { .. } => "offer-created",
            ServerSignal::AnswerCreated { .. } => "answer-created",
            ServerSignal::IceCandidate { .. } => "ice-candidate",
            ServerSignal::Error { .. } => "error",
            ServerSignal::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candidate() -> CandidatePayload {
        CandidatePayload {
            candidate: "candidate:1 1 UDP 2122252543 192.168.1.7 54321 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }
    }

    #[test]
    fn test_offer_serialization() {
        let msg = ClientSignal::Offer {
            sdp: SdpPayload::offer("v=0\r\no=- ..."),
        };

        let json = msg.to_json().unwrap();
        assert!(json.contains("\"offer\""));
        let parsed = ClientSignal::from_json(&json).unwrap();
        assert_eq!(msg, parsed);
    }

    #[test]
    fn test_ice_candidate_serialization() {
        let msg = ClientSignal::IceCandidate {
            candidate: sample_candidate(),
        };

        let json = msg.to_json().unwrap();
        assert!(json.contains("\"ice-candidate\""));
        assert!(json.contains("\"sdpMid\""));
        assert!(json.contains("\"sdpMLineIndex\""));
        let parsed = ClientSignal::from_json(&json).unwrap();
        assert_eq!(msg, parsed);
    }

    #[test]
    fn test_candidate_omits_absent_fields() {
        let msg = ClientSignal::IceCandidate {
            candidate: CandidatePayload {
                candidate: "candidate:...".to_string(),
                sdp_mid: None,
                sdp_mline_index: None,
                username_fragment: None,
            },
        };

        let json = msg.to_json().unwrap();
        assert!(!json.contains("sdpMid"));
        assert!(!json.contains("usernameFragment"));
    }

    #[test]
    fn test_server_echo_wire_names() {
        let offer = ServerSignal::OfferCreated {
            sdp: SdpPayload::offer("v=0"),
        };
        assert!(offer.to_json().unwrap().contains("\"offer-created\""));

        let answer = ServerSignal::AnswerCreated {
            sdp: SdpPayload::answer("v=0"),
        };
        assert!(answer.to_json().unwrap().contains("\"answer-created\""));

        let connected = ServerSignal::Connected;
        assert_eq!(connected.to_json().unwrap(), r#"{"type":"connected"}"#);
    }

    #[test]
    fn test_unknown_type_falls_back() {
        let parsed = ClientSignal::from_json(r#"{"type":"shutdown-everything"}"#).unwrap();
        assert_eq!(parsed, ClientSignal::Unknown);

        let parsed = ServerSignal::from_json(r#"{"type":"telemetry","data":42}"#).unwrap();
        assert_eq!(parsed, ServerSignal::Unknown);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let result = ClientSignal::from_json("not json at all");
        assert!(matches!(
            result,
            Err(crate::Error::SerializationError(_))
        ));
    }

    #[test]
    fn test_sdp_payload_kind_helpers() {
        assert!(SdpPayload::offer("v=0").is_offer());
        assert!(!SdpPayload::offer("v=0").is_answer());
        assert!(SdpPayload::answer("v=0").is_answer());
    }

    #[test]
    fn test_kind_names() {
        let msg = ClientSignal::Answer {
            sdp: SdpPayload::answer("v=0"),
        };
        assert_eq!(msg.kind(), "answer");

        let err = ServerSignal::Error {
            message: "bad".to_string(),
        };
        assert_eq!(err.kind(), "error");
    }
}
