//! # FlashQ Common Library
//!
//! Shared code for the FlashQ quiz service:
//! - Domain models (courses, modules, cards, test sessions, answers)
//! - Content hashing for card versioning
//! - Per-user event bus and SSE helpers
//! - Configuration file loading
//! - Utility functions

pub mod config;
pub mod error;
pub mod events;
pub mod hash;
pub mod models;
pub mod sse;
pub mod uuid_utils;

pub use error::{Error, Result};
pub use events::{EventBus, EventKind, Subscription, UserEvent};
pub use models::{AnswerStatus, UserId};
