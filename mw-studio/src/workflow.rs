//! Session workflow orchestration
//!
//! Ties the session controller to the AI services. Every AI operation
//! follows the same shape: lock the session to validate and snapshot,
//! release it, await the call, then lock again to apply the outcome. The
//! session lock is never held across an `.await`.
//!
//! A dropped operation future still settles its busy flag (see [`InFlight`]).
//! HTTP handlers go through [`Studio::detached`] so the call itself runs to
//! completion even when the client goes away.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use mw_common::config::TomlConfig;
use mw_common::ClassType;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::audio::AudioSink;
use crate::gemini::GenerativeBackend;
use crate::services::attachment;
use crate::services::{
    GenerationError, MetadataExtractor, SpeechError, SpeechSynthesizer, WarmUpGenerator,
};
use crate::session::{
    FormUpdate, Outcome, SessionController, SessionError, SessionSnapshot, Ticket,
};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Could not read attachment: {0}")]
    Attachment(#[from] mw_common::Error),

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Speech failed: {0}")]
    Speech(#[from] SpeechError),

    /// The task running the operation panicked or was cancelled
    #[error("Operation aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Generate,
    Analyze,
    Speak,
}

/// Busy-flag owner for one in-flight operation.
///
/// If the operation's future is dropped before it completes, the flag is
/// cleared with a failed outcome so the session never stays busy.
struct InFlight<'a> {
    studio: &'a Studio,
    operation: Operation,
    ticket: Ticket,
    armed: bool,
}

impl<'a> InFlight<'a> {
    fn new(studio: &'a Studio, operation: Operation, ticket: Ticket) -> Self {
        Self {
            studio,
            operation,
            ticket,
            armed: true,
        }
    }

    /// Take the ticket back for the normal completion path
    fn complete(mut self) -> Ticket {
        self.armed = false;
        self.ticket.clone()
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(operation = ?self.operation, "Operation dropped before completion; clearing busy flag");
        let ticket = self.ticket.clone();
        let mut session = self.studio.lock();
        match self.operation {
            Operation::Generate => {
                session.finish_generate(ticket, None);
            }
            Operation::Analyze => {
                session.finish_analyze(ticket, None);
            }
            Operation::Speak => session.finish_speak(ticket),
        }
    }
}

/// One teacher's studio session plus the services it drives
pub struct Studio {
    session: Mutex<SessionController>,
    extractor: MetadataExtractor,
    generator: WarmUpGenerator,
    synthesizer: SpeechSynthesizer,
    max_upload_bytes: usize,
}

impl Studio {
    pub fn new(
        config: &TomlConfig,
        backend: Arc<dyn GenerativeBackend>,
        sink: Arc<dyn AudioSink>,
    ) -> Self {
        Self {
            session: Mutex::new(SessionController::new()),
            extractor: MetadataExtractor::new(Arc::clone(&backend), &config.models.metadata),
            generator: WarmUpGenerator::new(
                Arc::clone(&backend),
                &config.models.generation,
                config.require_listening_script,
            ),
            synthesizer: SpeechSynthesizer::new(backend, sink, &config.models.speech, &config.voice),
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    /// Run `op` on its own task and wait for it.
    ///
    /// The spawned task owns the studio, so if the caller stops waiting the
    /// operation still finishes and applies its outcome.
    pub async fn detached<F, Fut>(self: &Arc<Self>, op: F) -> Result<SessionSnapshot, WorkflowError>
    where
        F: FnOnce(Arc<Studio>) -> Fut,
        Fut: Future<Output = Result<SessionSnapshot, WorkflowError>> + Send + 'static,
    {
        tokio::spawn(op(Arc::clone(self)))
            .await
            .map_err(|e| WorkflowError::Aborted(e.to_string()))?
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    fn lock(&self) -> MutexGuard<'_, SessionController> {
        // A panic while holding the lock leaves the state machine consistent
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run a synchronous session transition and return the new snapshot
    pub fn with_session<F>(&self, f: F) -> Result<SessionSnapshot, WorkflowError>
    where
        F: FnOnce(&mut SessionController) -> Result<(), SessionError>,
    {
        let mut session = self.lock();
        f(&mut session)?;
        Ok(session.snapshot())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    pub fn select_class(&self, class_type: ClassType) -> Result<SessionSnapshot, WorkflowError> {
        self.with_session(|s| s.select_class(class_type))
    }

    pub fn continue_to_details(&self) -> Result<SessionSnapshot, WorkflowError> {
        self.with_session(|s| s.continue_to_details())
    }

    pub fn back(&self) -> Result<SessionSnapshot, WorkflowError> {
        self.with_session(|s| s.back())
    }

    pub fn modify(&self) -> Result<SessionSnapshot, WorkflowError> {
        self.with_session(|s| s.modify())
    }

    pub fn reset(&self) -> SessionSnapshot {
        let mut session = self.lock();
        session.reset();
        info!("Session reset");
        session.snapshot()
    }

    pub fn update_form(&self, update: FormUpdate) -> Result<SessionSnapshot, WorkflowError> {
        self.with_session(|s| s.update_form(update))
    }

    pub fn remove_attachment(&self) -> Result<SessionSnapshot, WorkflowError> {
        self.with_session(|s| s.remove_attachment())
    }

    /// Encode an uploaded document, attach it, and fill the form from it.
    ///
    /// Extraction failures are logged and otherwise ignored; the attachment
    /// stays on the request either way.
    pub async fn attach(
        &self,
        name: &str,
        declared_mime: Option<&str>,
        bytes: &[u8],
    ) -> Result<SessionSnapshot, WorkflowError> {
        attachment::check_size(bytes.len(), self.max_upload_bytes)?;
        let encoded = attachment::encode_bytes(name, declared_mime, bytes);
        let (base64, mime_type) = (encoded.base64.clone(), encoded.mime_type.clone());

        info!(name = %name, mime_type = %mime_type, bytes = bytes.len(), "Document attached");
        let ticket = self.lock().begin_attach(encoded)?;
        let pending = InFlight::new(self, Operation::Analyze, ticket);

        let metadata = match self.extractor.extract(&base64, &mime_type).await {
            Ok(metadata) => {
                if metadata.is_empty() {
                    warn!("Document analysis found no lesson metadata");
                }
                Some(metadata)
            }
            Err(e) => {
                warn!("Document analysis failed, form left unchanged: {}", e);
                None
            }
        };

        let ticket = pending.complete();
        let mut session = self.lock();
        session.finish_analyze(ticket, metadata);
        Ok(session.snapshot())
    }

    /// Generate (or regenerate) a warm-up from the current form
    pub async fn generate(&self) -> Result<SessionSnapshot, WorkflowError> {
        let (ticket, request) = self.lock().begin_generate()?;
        let pending = InFlight::new(self, Operation::Generate, ticket);
        let started = Instant::now();

        let outcome = self.generator.generate(&request).await;

        let ticket = pending.complete();
        let mut session = self.lock();
        match outcome {
            Ok(result) => {
                let title = result.title.clone();
                if session.finish_generate(ticket, Some(result)) == Outcome::Applied {
                    info!(
                        title = %title,
                        class = %request.class_type,
                        activity = %request.activity_type,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Warm-up generated"
                    );
                }
                Ok(session.snapshot())
            }
            Err(e) => {
                session.finish_generate(ticket, None);
                error!("Warm-up generation failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Synthesize the current listening script and start playback
    pub async fn speak(&self) -> Result<SessionSnapshot, WorkflowError> {
        let (ticket, script) = self.lock().begin_speak()?;
        let pending = InFlight::new(self, Operation::Speak, ticket);

        let outcome = self.synthesizer.speak(&script).await;

        let ticket = pending.complete();
        let mut session = self.lock();
        session.finish_speak(ticket);
        match outcome {
            Ok(()) => {
                info!(chars = script.chars().count(), "Listening script playback started");
                Ok(session.snapshot())
            }
            Err(e) => {
                error!("Speech playback failed: {}", e);
                Err(e.into())
            }
        }
    }
}
