//! Provider-facing contracts: everything the pipeline calls out to, and the
//! in-memory test doubles used to exercise it without live dependencies.

mod grammar;
mod session_store;
mod stt;
mod translation;

pub use grammar::{GrammarError, GrammarWorker, ScriptedGrammarWorker};
pub use session_store::{InMemorySessionStore, SessionRecord, SessionStore};
pub use stt::{AudioBufferStatus, ScriptedSttProvider, SttError, SttProvider, SttResult};
pub use translation::{RecordingTranslationWorker, RecordedCall, TranslationError, TranslationErrorKind, TranslationWorker};
