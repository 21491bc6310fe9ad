//! Core types for EmotionAid

pub mod diary;
pub mod message;
pub mod profile;

pub use diary::DiaryEntry;
pub use message::{Message, MessageStatus, BOT_AUTHOR};
pub use profile::UserProfile;
