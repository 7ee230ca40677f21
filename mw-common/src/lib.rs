//! # MaestroWarmup Common Library
//!
//! Shared code for the MaestroWarmup services including:
//! - Lesson data model (class profiles, warm-up requests and results)
//! - Configuration loading
//! - Common error type

pub mod config;
pub mod error;
pub mod lesson;

pub use error::{Error, Result};
pub use lesson::{
    ActivityType, ClassProfile, ClassType, FileAttachment, LessonMetadata, WarmUpRequest,
    WarmUpResult,
};
