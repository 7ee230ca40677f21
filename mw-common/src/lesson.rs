//! Lesson data model
//!
//! Types exchanged between the browser UI, the session controller and the
//! generative AI service. JSON field names are camelCase on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

// ============================================================================
// Class profiles
// ============================================================================

/// One of the four fixed proficiency tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassType {
    /// Beginning
    #[default]
    Pasitos,
    /// Intermediate
    Viaje,
    /// Intermediate/Advanced
    Adelante,
    /// Advanced
    Cumbre,
}

/// Display information for a class tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassProfile {
    pub class_type: ClassType,
    pub name: &'static str,
    pub level: &'static str,
    pub color: &'static str,
}

impl ClassType {
    /// All class tiers in display order
    pub const ALL: [ClassType; 4] = [
        ClassType::Pasitos,
        ClassType::Viaje,
        ClassType::Adelante,
        ClassType::Cumbre,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ClassType::Pasitos => "pasitos",
            ClassType::Viaje => "viaje",
            ClassType::Adelante => "adelante",
            ClassType::Cumbre => "cumbre",
        }
    }

    pub fn profile(self) -> ClassProfile {
        let (name, level, color) = match self {
            ClassType::Pasitos => ("Pasitos", "Beginning", "green"),
            ClassType::Viaje => ("Viaje", "Intermediate", "blue"),
            ClassType::Adelante => ("Adelante", "Int/Adv", "purple"),
            ClassType::Cumbre => ("Cumbre", "Advanced", "orange"),
        };
        ClassProfile {
            class_type: self,
            name,
            level,
            color,
        }
    }

    /// Profiles for every tier, in display order
    pub fn profiles() -> Vec<ClassProfile> {
        Self::ALL.iter().map(|c| c.profile()).collect()
    }
}

impl fmt::Display for ClassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown class type: {}", s)))
    }
}

// ============================================================================
// Activity types
// ============================================================================

/// Kind of warm-up exercise requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    #[default]
    Written,
    Spoken,
    Listening,
    Other,
}

impl ActivityType {
    pub const ALL: [ActivityType; 4] = [
        ActivityType::Written,
        ActivityType::Spoken,
        ActivityType::Listening,
        ActivityType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::Written => "written",
            ActivityType::Spoken => "spoken",
            ActivityType::Listening => "listening",
            ActivityType::Other => "other",
        }
    }

    /// Option label shown in the activity selector
    pub fn label(self) -> &'static str {
        match self {
            ActivityType::Written => "Written (Translation/Grammar)",
            ActivityType::Spoken => "Spoken (Partner Discussion)",
            ActivityType::Listening => "Listening (Comprehension)",
            ActivityType::Other => "Other (Drawing/Game)",
        }
    }

    /// Generation guidance embedded in the prompt for this activity type
    pub fn guidance(self) -> &'static str {
        match self {
            ActivityType::Written => {
                "A creative written task like translation, fill-in-the-blanks, or a short creative response."
            }
            ActivityType::Spoken => {
                "A partner-based dialogue prompt or a set of \"preguntas personales\"."
            }
            ActivityType::Listening => {
                "A short script (in Spanish) for the teacher to read and 3 specific comprehension questions."
            }
            ActivityType::Other => {
                "An interactive or visual task (e.g., \"Draw what I describe\" or a quick matching challenge)."
            }
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown activity type: {}", s)))
    }
}

// ============================================================================
// Request / result
// ============================================================================

/// Uploaded lesson document, base64-encoded
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    pub name: String,
    pub mime_type: String,
    pub base64: String,
}

impl FileAttachment {
    /// Size of the decoded payload in bytes, computed from the base64 length
    pub fn decoded_len(&self) -> usize {
        let trimmed = self.base64.trim_end();
        let padding = trimmed.bytes().rev().take_while(|b| *b == b'=').count();
        ((trimmed.len() / 4) * 3).saturating_sub(padding.min(2))
    }

    /// File extension in upper case (e.g. "PDF"), used for the UI badge
    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_uppercase())
            .filter(|ext| !ext.is_empty())
    }
}

// Payloads can be megabytes; keep them out of debug logs.
impl fmt::Debug for FileAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileAttachment")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("base64_len", &self.base64.len())
            .finish()
    }
}

/// Lesson parameters collected by the form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmUpRequest {
    pub class_type: ClassType,
    pub unit: String,
    pub activity_type: ActivityType,
    pub vocabulary: String,
    pub learning_targets: String,
    /// Extra lesson context for today
    pub lesson_plan: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<FileAttachment>,
}

impl WarmUpRequest {
    pub fn new(class_type: ClassType) -> Self {
        Self {
            class_type,
            ..Default::default()
        }
    }

    /// A unit name is required before generation
    pub fn has_unit(&self) -> bool {
        !self.unit.trim().is_empty()
    }

    /// Blank request keeping the class and activity selections
    pub fn cleared(&self) -> Self {
        Self {
            class_type: self.class_type,
            activity_type: self.activity_type,
            ..Default::default()
        }
    }
}

/// Exercise produced by the generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmUpResult {
    pub title: String,
    pub instruction: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listening_script: Option<String>,
}

impl WarmUpResult {
    /// Listening script, if present and not blank
    pub fn listening_script(&self) -> Option<&str> {
        self.listening_script
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }
}

/// Metadata extracted from an uploaded lesson document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonMetadata {
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub vocabulary: Option<String>,
    #[serde(default)]
    pub learning_targets: Option<String>,
}

impl LessonMetadata {
    pub fn is_empty(&self) -> bool {
        non_blank(&self.unit).is_none()
            && non_blank(&self.vocabulary).is_none()
            && non_blank(&self.learning_targets).is_none()
    }

    /// Fill form fields from extracted values.
    ///
    /// Absent or blank extracted values never overwrite existing fields.
    pub fn merge_into(&self, request: &mut WarmUpRequest) {
        if let Some(unit) = non_blank(&self.unit) {
            request.unit = unit.to_string();
        }
        if let Some(vocabulary) = non_blank(&self.vocabulary) {
            request.vocabulary = vocabulary.to_string();
        }
        if let Some(targets) = non_blank(&self.learning_targets) {
            request.learning_targets = targets.to_string();
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
