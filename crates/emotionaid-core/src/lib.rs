//! EmotionAid Core Library
//!
//! Local persistence and offline sync for the EmotionAid chat companion.
//!
//! ## Overview
//!
//! The client keeps everything on the user's machine: chat history, diary
//! pages, profiles and cached replies are stored as encrypted files, one per
//! key. Calls to the companion server that fail are parked in a durable
//! offline queue and replayed in order once the server answers again.
//!
//! ## Layers
//!
//! - **Store**: [`KvStore`], one ChaCha20-Poly1305 sealed file per key
//! - **Cache**: [`CacheLayer`], expiring entries under `cache_` keys
//! - **Queue**: [`OfflineQueue`], FIFO of pending remote actions
//! - **Gateway**: [`RemoteGateway`], implemented over HTTP by [`HttpGateway`]
//! - **Companion**: [`Companion`], builds the above once and wires them
//!
//! ## Quick Start
//!
//! ```ignore
//! use emotionaid_core::{keys, AppConfig, Companion, SendOutcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load(emotionaid_core::config::default_data_dir())?;
//!     let companion = Companion::open(config, keys::provider_from_env()?)?;
//!
//!     let user = companion.profiles().create_profile("Alice").await?;
//!     match companion.send_message(&user.id, "Hello").await? {
//!         SendOutcome::Replied(reply) => println!("{}", reply),
//!         _ => println!("(queued until the server is reachable)"),
//!     }
//!     Ok(())
//! }
//! ```

pub mod analytics;
pub mod cache;
pub mod chat;
pub mod companion;
pub mod config;
pub mod crypto;
pub mod diary;
pub mod error;
pub mod gateway;
pub mod keys;
pub mod logging;
pub mod profile;
pub mod queue;
pub mod store;
pub mod time;
pub mod types;

// Re-exports
pub use analytics::{AnalyticsStore, EmotionAnalysis, LexiconAnalyzer};
pub use cache::{CacheLayer, Ttl};
pub use chat::ChatRepository;
pub use companion::{Companion, SendOutcome};
pub use config::AppConfig;
pub use crypto::DataCipher;
pub use diary::DiaryRepository;
pub use error::{CompanionError, CompanionResult};
pub use gateway::{ChatParams, HttpGateway, RemoteGateway, RetryPolicy};
pub use keys::{KeyProvider, KeyringKeyProvider, StaticKeyProvider};
pub use profile::{Avatar, ProfileDirectory};
pub use queue::{DrainReport, OfflineQueue, QueueItem, QueuedAction};
pub use store::KvStore;
pub use time::{Clock, ManualClock, SystemClock};
pub use types::*;
