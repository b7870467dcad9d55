use serde::{Deserialize, Serialize};

/// Which translation worker tier a session requests. A supplemented
/// feature: the core pipeline doesn't care which tier serves a request, it
/// only needs to know which provider to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationTier {
    Standard,
    Premium,
}

impl Default for TranslationTier {
    fn default() -> Self {
        Self::Standard
    }
}

/// A frame received from the host connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Init {
        source_lang: String,
        #[serde(default)]
        tier: TranslationTier,
    },
    Audio {
        /// Base64-encoded PCM for this chunk.
        audio_data: String,
        chunk_index: u64,
        start_ms: i64,
        end_ms: i64,
        #[serde(default)]
        client_timestamp: Option<i64>,
    },
    AudioEnd,
    ForceCommit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_frame_defaults_to_standard_tier() {
        let frame: InboundFrame = serde_json::from_str(r#"{"type":"init","source_lang":"en"}"#).unwrap();
        assert_eq!(frame, InboundFrame::Init { source_lang: "en".to_string(), tier: TranslationTier::Standard });
    }

    #[test]
    fn audio_frame_parses_optional_client_timestamp() {
        let frame: InboundFrame = serde_json::from_str(
            r#"{"type":"audio","audio_data":"AAA=","chunk_index":3,"start_ms":100,"end_ms":200}"#,
        )
        .unwrap();
        match frame {
            InboundFrame::Audio { client_timestamp, chunk_index, .. } => {
                assert_eq!(client_timestamp, None);
                assert_eq!(chunk_index, 3);
            }
            other => panic!("expected Audio, got {other:?}"),
        }
    }

    #[test]
    fn audio_end_and_force_commit_have_no_fields() {
        let frame: InboundFrame = serde_json::from_str(r#"{"type":"audio_end"}"#).unwrap();
        assert_eq!(frame, InboundFrame::AudioEnd);
        let frame: InboundFrame = serde_json::from_str(r#"{"type":"force_commit"}"#).unwrap();
        assert_eq!(frame, InboundFrame::ForceCommit);
    }
}
