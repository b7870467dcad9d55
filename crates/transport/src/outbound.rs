use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    Grammar,
}

/// A message emitted to the host and to listeners. Anchor messages (source
/// language, `target_lang == source_lang`) and per-language translations
/// share this one shape; invariants below are enforced at construction time
/// rather than left to the caller to remember.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub seq_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_seq_id: Option<u64>,
    pub server_timestamp: i64,
    pub is_partial: bool,
    pub source_lang: String,
    pub target_lang: String,
    pub original_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
    pub has_translation: bool,
    pub has_correction: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_type: Option<UpdateType>,
    pub force_final: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation_error: Option<bool>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TransportError {
    #[error("non-source message for {target_lang} is missing a non-zero source_seq_id")]
    MissingSourceSeqId { target_lang: String },
    #[error("anchor message for {lang} must not carry a source_seq_id")]
    AnchorCarriesSourceSeqId { lang: String },
}

impl TranslationMessage {
    /// Validate the two invariants the core spec calls out at emit time:
    /// a non-source message must carry a non-zero `source_seq_id`, and an
    /// anchor message must carry none at all.
    pub fn validate(&self) -> Result<(), TransportError> {
        let is_anchor = self.source_lang == self.target_lang;
        if is_anchor {
            if self.source_seq_id.is_some() {
                return Err(TransportError::AnchorCarriesSourceSeqId { lang: self.source_lang.clone() });
            }
        } else {
            match self.source_seq_id {
                Some(0) | None => {
                    return Err(TransportError::MissingSourceSeqId { target_lang: self.target_lang.clone() })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// An anchor message carries the corrected text as `translated_text`
    /// (identity "translation" into its own language) so it serves as the
    /// correlation key for every per-language translation that follows.
    #[allow(clippy::too_many_arguments)]
    pub fn anchor(
        seq_id: u64,
        server_timestamp: i64,
        is_partial: bool,
        source_lang: impl Into<String>,
        original_text: impl Into<String>,
        corrected_text: impl Into<String>,
        has_correction: bool,
        update_type: Option<UpdateType>,
        force_final: bool,
    ) -> Self {
        let source_lang = source_lang.into();
        let corrected_text = corrected_text.into();
        Self {
            kind: "translation",
            seq_id,
            source_seq_id: None,
            server_timestamp,
            is_partial,
            target_lang: source_lang.clone(),
            source_lang,
            original_text: original_text.into(),
            translated_text: Some(corrected_text.clone()),
            corrected_text: Some(corrected_text),
            has_translation: true,
            has_correction,
            update_type,
            force_final,
            translation_error: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn translation(
        seq_id: u64,
        anchor_seq_id: u64,
        server_timestamp: i64,
        is_partial: bool,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
        original_text: impl Into<String>,
        corrected_text: Option<String>,
        translated_text: Option<String>,
        has_translation: bool,
        has_correction: bool,
        force_final: bool,
        translation_error: Option<bool>,
    ) -> Self {
        Self {
            kind: "translation",
            seq_id,
            source_seq_id: Some(anchor_seq_id),
            server_timestamp,
            is_partial,
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            original_text: original_text.into(),
            corrected_text,
            translated_text,
            has_translation,
            has_correction,
            update_type: None,
            force_final,
            translation_error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReadyMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub session_id: String,
}

impl SessionReadyMessage {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self { kind: "session_ready", session_id: session_id.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WarningMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl WarningMessage {
    pub fn new(message: impl Into<String>, code: Option<String>) -> Self {
        Self { kind: "warning", message: message.into(), code }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
}

impl ErrorMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self { kind: "error", message: message.into() }
    }
}
