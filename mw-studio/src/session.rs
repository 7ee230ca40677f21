//! Session state machine
//!
//! Three steps: pick a class, fill in lesson details, view the generated
//! warm-up. The generated result lives inside [`Step::ViewResult`], so it
//! cannot outlive that step.
//!
//! AI calls are split into `begin_*` (validate, snapshot, raise busy flag)
//! and `finish_*` (apply outcome, clear flag). Each begin hands out a
//! [`Ticket`] stamped with the current epoch. Only navigation (`back`,
//! `modify`, `reset`) bumps the epoch; completions carrying an older ticket
//! are discarded. Attachment changes are refused while a generation is in
//! flight instead of invalidating it.

use mw_common::{
    ActivityType, ClassType, FileAttachment, LessonMetadata, WarmUpRequest, WarmUpResult,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const MSG_UNIT_REQUIRED: &str = "Please enter a unit name.";

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    SelectClass,
    EditDetails,
    ViewResult(WarmUpResult),
}

impl Step {
    pub fn number(&self) -> u8 {
        match self {
            Step::SelectClass => 1,
            Step::EditDetails => 2,
            Step::ViewResult(_) => 3,
        }
    }

    pub fn result(&self) -> Option<&WarmUpResult> {
        match self {
            Step::ViewResult(result) => Some(result),
            _ => None,
        }
    }
}

/// Independent in-flight markers; each gates only its own operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BusyFlags {
    pub generating: bool,
    pub analyzing: bool,
    pub speaking: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} already in progress")]
    Busy(&'static str),

    #[error("Cannot {action} from step {step}")]
    InvalidStep { action: &'static str, step: u8 },

    #[error("No listening script to play")]
    NoListeningScript,
}

/// Proof that an operation was started at a given epoch
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Ticket {
    epoch: u64,
}

/// What happened to a completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Session moved on while the call was in flight
    Discarded,
}

/// Partial form update; absent fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormUpdate {
    pub unit: Option<String>,
    pub activity_type: Option<ActivityType>,
    pub vocabulary: Option<String>,
    pub learning_targets: Option<String>,
    pub lesson_plan: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentView {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: usize,
    /// Upper-case file extension for the UI badge, if the name has one
    pub extension: Option<String>,
}

impl From<&FileAttachment> for AttachmentView {
    fn from(attachment: &FileAttachment) -> Self {
        Self {
            name: attachment.name.clone(),
            mime_type: attachment.mime_type.clone(),
            size_bytes: attachment.decoded_len(),
            extension: attachment.extension(),
        }
    }
}

/// Request as reported to the UI (attachment payload omitted)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    pub class_type: ClassType,
    pub unit: String,
    pub activity_type: ActivityType,
    pub vocabulary: String,
    pub learning_targets: String,
    pub lesson_plan: String,
    pub attachment: Option<AttachmentView>,
}

impl From<&WarmUpRequest> for RequestView {
    fn from(request: &WarmUpRequest) -> Self {
        Self {
            class_type: request.class_type,
            unit: request.unit.clone(),
            activity_type: request.activity_type,
            vocabulary: request.vocabulary.clone(),
            learning_targets: request.learning_targets.clone(),
            lesson_plan: request.lesson_plan.clone(),
            attachment: request.attachment.as_ref().map(AttachmentView::from),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub step: u8,
    #[serde(flatten)]
    pub busy: BusyFlags,
    pub request: RequestView,
    pub result: Option<WarmUpResult>,
}

#[derive(Debug)]
pub struct SessionController {
    step: Step,
    request: WarmUpRequest,
    busy: BusyFlags,
    epoch: u64,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionController {
    pub fn new() -> Self {
        Self {
            step: Step::SelectClass,
            request: WarmUpRequest::default(),
            busy: BusyFlags::default(),
            epoch: 0,
        }
    }

    pub fn step(&self) -> &Step {
        &self.step
    }

    pub fn request(&self) -> &WarmUpRequest {
        &self.request
    }

    pub fn busy(&self) -> BusyFlags {
        self.busy
    }

    pub fn result(&self) -> Option<&WarmUpResult> {
        self.step.result()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            step: self.step.number(),
            busy: self.busy,
            request: RequestView::from(&self.request),
            result: self.step.result().cloned(),
        }
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    pub fn select_class(&mut self, class_type: ClassType) -> Result<(), SessionError> {
        self.require_step("select a class", |s| matches!(s, Step::SelectClass))?;
        self.request.class_type = class_type;
        Ok(())
    }

    pub fn continue_to_details(&mut self) -> Result<(), SessionError> {
        self.require_step("continue", |s| matches!(s, Step::SelectClass))?;
        self.step = Step::EditDetails;
        Ok(())
    }

    pub fn back(&mut self) -> Result<(), SessionError> {
        self.require_step("go back", |s| matches!(s, Step::EditDetails))?;
        self.step = Step::SelectClass;
        self.bump_epoch();
        Ok(())
    }

    /// Leave the result view to edit the form; the result is dropped
    pub fn modify(&mut self) -> Result<(), SessionError> {
        self.require_step("modify", |s| matches!(s, Step::ViewResult(_)))?;
        self.step = Step::EditDetails;
        self.bump_epoch();
        Ok(())
    }

    /// Start over, keeping the class and activity selections
    pub fn reset(&mut self) {
        self.request = self.request.cleared();
        self.step = Step::SelectClass;
        self.bump_epoch();
    }

    pub fn update_form(&mut self, update: FormUpdate) -> Result<(), SessionError> {
        self.require_step("edit the form", |s| matches!(s, Step::EditDetails))?;

        let FormUpdate {
            unit,
            activity_type,
            vocabulary,
            learning_targets,
            lesson_plan,
        } = update;

        if let Some(unit) = unit {
            self.request.unit = unit;
        }
        if let Some(activity_type) = activity_type {
            self.request.activity_type = activity_type;
        }
        if let Some(vocabulary) = vocabulary {
            self.request.vocabulary = vocabulary;
        }
        if let Some(learning_targets) = learning_targets {
            self.request.learning_targets = learning_targets;
        }
        if let Some(lesson_plan) = lesson_plan {
            self.request.lesson_plan = lesson_plan;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Generation
    // ------------------------------------------------------------------

    /// Validate and snapshot the request for generation or regeneration
    pub fn begin_generate(&mut self) -> Result<(Ticket, WarmUpRequest), SessionError> {
        self.require_step("generate", |s| {
            matches!(s, Step::EditDetails | Step::ViewResult(_))
        })?;
        if self.busy.generating {
            return Err(SessionError::Busy("Generation"));
        }
        if self.busy.analyzing {
            return Err(SessionError::Busy("Document analysis"));
        }
        if !self.request.has_unit() {
            return Err(SessionError::Validation(MSG_UNIT_REQUIRED.to_string()));
        }

        self.busy.generating = true;
        Ok((self.ticket(), self.request.clone()))
    }

    /// Apply a generation outcome; `None` means the call failed
    pub fn finish_generate(&mut self, ticket: Ticket, result: Option<WarmUpResult>) -> Outcome {
        self.busy.generating = false;

        if self.is_stale(&ticket) {
            warn!("Discarding stale generation result");
            return Outcome::Discarded;
        }

        if let Some(result) = result {
            debug!(title = %result.title, "Showing generated warm-up");
            self.step = Step::ViewResult(result);
        }
        Outcome::Applied
    }

    // ------------------------------------------------------------------
    // Attachment
    // ------------------------------------------------------------------

    /// Attach a document and mark it as being analyzed.
    ///
    /// The attachment is kept even if analysis later fails.
    pub fn begin_attach(&mut self, attachment: FileAttachment) -> Result<Ticket, SessionError> {
        self.require_step("attach a document", |s| matches!(s, Step::EditDetails))?;
        self.require_attachment_idle()?;

        self.request.attachment = Some(attachment);
        self.busy.analyzing = true;
        Ok(self.ticket())
    }

    /// Merge extracted metadata; `None` means extraction failed
    pub fn finish_analyze(&mut self, ticket: Ticket, metadata: Option<LessonMetadata>) -> Outcome {
        self.busy.analyzing = false;

        if self.is_stale(&ticket) {
            warn!("Discarding stale document analysis");
            return Outcome::Discarded;
        }

        if let Some(metadata) = metadata {
            metadata.merge_into(&mut self.request);
        }
        Outcome::Applied
    }

    pub fn remove_attachment(&mut self) -> Result<(), SessionError> {
        self.require_step("remove the attachment", |s| matches!(s, Step::EditDetails))?;
        self.require_attachment_idle()?;

        self.request.attachment = None;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Speech
    // ------------------------------------------------------------------

    /// Claim the speaker and return the listening script to synthesize
    pub fn begin_speak(&mut self) -> Result<(Ticket, String), SessionError> {
        let script = match &self.step {
            Step::ViewResult(result) => result
                .listening_script()
                .map(str::to_string)
                .ok_or(SessionError::NoListeningScript)?,
            other => {
                return Err(SessionError::InvalidStep {
                    action: "play audio",
                    step: other.number(),
                })
            }
        };
        if self.busy.speaking {
            return Err(SessionError::Busy("Speech playback"));
        }

        self.busy.speaking = true;
        Ok((self.ticket(), script))
    }

    pub fn finish_speak(&mut self, _ticket: Ticket) {
        self.busy.speaking = false;
    }

    // ------------------------------------------------------------------

    fn require_step(
        &self,
        action: &'static str,
        allowed: impl Fn(&Step) -> bool,
    ) -> Result<(), SessionError> {
        if allowed(&self.step) {
            Ok(())
        } else {
            Err(SessionError::InvalidStep {
                action,
                step: self.step.number(),
            })
        }
    }

    /// The attachment is part of the request an in-flight generation was
    /// built from, and is being read while analysis runs
    fn require_attachment_idle(&self) -> Result<(), SessionError> {
        if self.busy.generating {
            return Err(SessionError::Busy("Generation"));
        }
        if self.busy.analyzing {
            return Err(SessionError::Busy("Document analysis"));
        }
        Ok(())
    }

    fn ticket(&self) -> Ticket {
        Ticket { epoch: self.epoch }
    }

    fn is_stale(&self, ticket: &Ticket) -> bool {
        ticket.epoch != self.epoch
    }

    fn bump_epoch(&mut self) {
        self.epoch += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(script: Option<&str>) -> WarmUpResult {
        WarmUpResult {
            title: "Mi Familia".to_string(),
            instruction: "Escucha y contesta".to_string(),
            content: "1. ¿Cuántos hermanos tiene Ana?".to_string(),
            teacher_key: Some("1. Dos".to_string()),
            listening_script: script.map(str::to_string),
        }
    }

    fn in_details(unit: &str) -> SessionController {
        let mut session = SessionController::new();
        session.select_class(ClassType::Viaje).unwrap();
        session.continue_to_details().unwrap();
        session
            .update_form(FormUpdate {
                unit: Some(unit.to_string()),
                ..Default::default()
            })
            .unwrap();
        session
    }

    fn in_result(script: Option<&str>) -> SessionController {
        let mut session = in_details("La Familia");
        let (ticket, _) = session.begin_generate().unwrap();
        assert_eq!(session.finish_generate(ticket, Some(result(script))), Outcome::Applied);
        session
    }

    #[test]
    fn test_initial_state() {
        let session = SessionController::new();
        assert_eq!(session.step().number(), 1);
        assert_eq!(session.request().class_type, ClassType::Pasitos);
        assert_eq!(session.request().activity_type, ActivityType::Written);
        assert_eq!(session.busy(), BusyFlags::default());
        assert!(session.result().is_none());
    }

    #[test]
    fn test_navigation_guards() {
        let mut session = SessionController::new();
        assert!(matches!(session.back(), Err(SessionError::InvalidStep { step: 1, .. })));
        assert!(session.modify().is_err());
        assert!(session.update_form(FormUpdate::default()).is_err());

        session.continue_to_details().unwrap();
        assert!(session.select_class(ClassType::Cumbre).is_err());
        session.back().unwrap();
        assert_eq!(session.step().number(), 1);
        session.select_class(ClassType::Cumbre).unwrap();
        assert_eq!(session.request().class_type, ClassType::Cumbre);
    }

    #[test]
    fn test_blank_unit_blocks_generation() {
        let mut session = in_details("   ");
        let err = session.begin_generate().unwrap_err();
        assert_eq!(err, SessionError::Validation(MSG_UNIT_REQUIRED.to_string()));
        assert_eq!(session.step().number(), 2);
        assert!(!session.busy().generating);
    }

    #[test]
    fn test_generate_success_moves_to_result() {
        let session = in_result(None);
        assert_eq!(session.step().number(), 3);
        assert_eq!(session.result().unwrap().title, "Mi Familia");
        assert!(!session.busy().generating);
    }

    #[test]
    fn test_generate_failure_keeps_step() {
        let mut session = in_details("La Familia");
        let (ticket, _) = session.begin_generate().unwrap();
        assert!(session.busy().generating);
        assert!(matches!(session.begin_generate(), Err(SessionError::Busy(_))));

        session.finish_generate(ticket, None);
        assert_eq!(session.step().number(), 2);
        assert!(!session.busy().generating);
    }

    #[test]
    fn test_regenerate_failure_keeps_previous_result() {
        let mut session = in_result(Some("Hola"));
        let (ticket, snapshot) = session.begin_generate().unwrap();
        assert_eq!(snapshot.unit, "La Familia");

        session.finish_generate(ticket, None);
        assert_eq!(session.step().number(), 3);
        assert_eq!(session.result().unwrap().listening_script(), Some("Hola"));
    }

    #[test]
    fn test_regenerate_replaces_result() {
        let mut session = in_result(Some("Hola"));
        let (ticket, _) = session.begin_generate().unwrap();
        let mut replacement = result(None);
        replacement.title = "Nueva".to_string();

        session.finish_generate(ticket, Some(replacement));
        let current = session.result().unwrap();
        assert_eq!(current.title, "Nueva");
        assert!(current.listening_script.is_none());
    }

    #[test]
    fn test_modify_discards_result() {
        let mut session = in_result(None);
        session.modify().unwrap();
        assert_eq!(session.step().number(), 2);
        assert!(session.result().is_none());
        assert_eq!(session.request().unit, "La Familia");
    }

    #[test]
    fn test_reset_from_result() {
        let mut session = in_result(Some("Hola"));
        session.reset();

        assert_eq!(session.step().number(), 1);
        assert_eq!(session.request().class_type, ClassType::Viaje);
        assert!(session.request().unit.is_empty());
        assert!(session.result().is_none());
    }

    #[test]
    fn test_stale_generation_discarded_after_reset() {
        let mut session = in_details("La Familia");
        let (ticket, _) = session.begin_generate().unwrap();
        session.reset();

        assert_eq!(session.finish_generate(ticket, Some(result(None))), Outcome::Discarded);
        assert_eq!(session.step().number(), 1);
        assert!(session.result().is_none());
        assert!(!session.busy().generating);
    }

    #[test]
    fn test_stale_generation_discarded_after_back() {
        let mut session = in_details("La Familia");
        let (ticket, _) = session.begin_generate().unwrap();
        session.back().unwrap();
        session.continue_to_details().unwrap();

        assert_eq!(session.finish_generate(ticket, Some(result(None))), Outcome::Discarded);
        assert_eq!(session.step().number(), 2);
    }

    #[test]
    fn test_attach_and_merge() {
        let mut session = in_details("Los Animales");
        let attachment = FileAttachment {
            name: "plan.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            base64: "JVBERi0xLjc=".to_string(),
        };

        let ticket = session.begin_attach(attachment).unwrap();
        assert!(session.busy().analyzing);
        assert!(matches!(session.begin_generate(), Err(SessionError::Busy(_))));
        assert!(matches!(session.remove_attachment(), Err(SessionError::Busy(_))));

        let metadata = LessonMetadata {
            unit: Some(String::new()),
            vocabulary: Some("el perro".to_string()),
            learning_targets: None,
        };
        assert_eq!(session.finish_analyze(ticket, Some(metadata)), Outcome::Applied);

        assert!(!session.busy().analyzing);
        assert_eq!(session.request().unit, "Los Animales");
        assert_eq!(session.request().vocabulary, "el perro");

        let view = session.snapshot().request.attachment.unwrap();
        assert_eq!(view.name, "plan.pdf");
        assert_eq!(view.size_bytes, 8);
        assert_eq!(view.extension.as_deref(), Some("PDF"));
    }

    #[test]
    fn test_failed_analysis_keeps_attachment() {
        let mut session = in_details("Los Animales");
        let attachment = FileAttachment {
            name: "plan.txt".to_string(),
            mime_type: "text/plain".to_string(),
            base64: "aG9sYQ==".to_string(),
        };
        let ticket = session.begin_attach(attachment).unwrap();
        session.finish_analyze(ticket, None);

        assert!(session.request().attachment.is_some());
        assert_eq!(session.request().unit, "Los Animales");

        session.remove_attachment().unwrap();
        assert!(session.request().attachment.is_none());
    }

    #[test]
    fn test_attachment_changes_refused_while_generating() {
        let mut session = in_details("La Familia");
        let attachment = FileAttachment {
            name: "plan.txt".to_string(),
            mime_type: "text/plain".to_string(),
            base64: "aG9sYQ==".to_string(),
        };
        let (ticket, _) = session.begin_generate().unwrap();

        assert_eq!(
            session.begin_attach(attachment).unwrap_err(),
            SessionError::Busy("Generation")
        );
        assert_eq!(session.remove_attachment().unwrap_err(), SessionError::Busy("Generation"));
        assert!(session.request().attachment.is_none());
        assert!(!session.busy().analyzing);

        assert_eq!(session.finish_generate(ticket, Some(result(None))), Outcome::Applied);
        assert_eq!(session.step().number(), 3);
    }

    #[test]
    fn test_speak_requires_script() {
        let mut session = in_result(None);
        assert_eq!(session.begin_speak().unwrap_err(), SessionError::NoListeningScript);

        let mut session = in_result(Some("  "));
        assert_eq!(session.begin_speak().unwrap_err(), SessionError::NoListeningScript);

        let mut session = in_details("x");
        assert!(matches!(session.begin_speak(), Err(SessionError::InvalidStep { .. })));
    }

    #[test]
    fn test_speak_busy_gating_is_independent() {
        let mut session = in_result(Some("Hola, me llamo Ana."));
        let (ticket, script) = session.begin_speak().unwrap();
        assert_eq!(script, "Hola, me llamo Ana.");
        assert!(matches!(session.begin_speak(), Err(SessionError::Busy(_))));

        // Regeneration is not blocked by playback
        let (gen_ticket, _) = session.begin_generate().unwrap();
        session.finish_generate(gen_ticket, None);

        session.finish_speak(ticket);
        assert!(!session.busy().speaking);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let session = in_result(Some("Hola"));
        let value = serde_json::to_value(session.snapshot()).unwrap();
        assert_eq!(value["step"], 3);
        assert_eq!(value["generating"], false);
        assert_eq!(value["request"]["classType"], "viaje");
        assert_eq!(value["request"]["attachment"], serde_json::Value::Null);
        assert_eq!(value["result"]["listeningScript"], "Hola");
    }
}
