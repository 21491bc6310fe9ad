//! Composition root tying the services together.
//!
//! [`Companion`] constructs every service exactly once per data directory
//! and hands out shared handles. Remote calls go straight to the gateway
//! when it answers; otherwise the action is parked in the offline queue and
//! replayed by [`Companion::sync_now`] or the background sync loop.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analytics::{AnalyticsStore, LexiconAnalyzer, ANALYTICS_FILE, UNDETERMINED};
use crate::cache::CacheLayer;
use crate::chat::ChatRepository;
use crate::config::AppConfig;
use crate::diary::DiaryRepository;
use crate::error::{CompanionError, CompanionResult};
use crate::gateway::{HttpGateway, RemoteGateway};
use crate::keys::KeyProvider;
use crate::profile::ProfileDirectory;
use crate::queue::{
    CreateDiaryEntryPayload, DrainReport, OfflineQueue, QueuedAction, SendAudioPayload,
    SendMessagePayload,
};
use crate::store::KvStore;
use crate::types::{DiaryEntry, Message, MessageStatus};

/// Points awarded for a delivered chat message
pub const MESSAGE_POINTS: i64 = 5;

/// Points awarded for a diary entry
pub const DIARY_POINTS: i64 = 10;

/// What happened to an action handed to the companion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The server answered with this reply
    Replied(String),
    /// The server accepted the action
    Delivered,
    /// The server was unreachable; the action waits in the offline queue
    Queued,
}

/// Everything the client needs, built once.
pub struct Companion<G = HttpGateway> {
    config: AppConfig,
    store: KvStore,
    cache: CacheLayer,
    gateway: Arc<G>,
    queue: OfflineQueue,
    chats: ChatRepository,
    diary: DiaryRepository,
    profiles: ProfileDirectory,
    analytics: AnalyticsStore,
    analyzer: LexiconAnalyzer,
}

impl<G> Clone for Companion<G> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: self.store.clone(),
            cache: self.cache.clone(),
            gateway: Arc::clone(&self.gateway),
            queue: self.queue.clone(),
            chats: self.chats.clone(),
            diary: self.diary.clone(),
            profiles: self.profiles.clone(),
            analytics: self.analytics.clone(),
            analyzer: self.analyzer.clone(),
        }
    }
}

impl Companion<HttpGateway> {
    /// Open the data directory named by `config` and connect to its API.
    pub fn open(config: AppConfig, provider: Arc<dyn KeyProvider>) -> CompanionResult<Self> {
        config.validate()?;
        let store = KvStore::open(&config.data_dir, Arc::clone(&provider))?;
        let cache = CacheLayer::new(store.clone());
        let gateway = HttpGateway::new(&config.api, cache.clone())?;
        Self::assemble(config, provider, store, cache, gateway)
    }
}

impl<G: RemoteGateway + 'static> Companion<G> {
    /// Like [`Companion::open`] with a caller-supplied gateway.
    pub fn with_gateway(
        config: AppConfig,
        provider: Arc<dyn KeyProvider>,
        gateway: G,
    ) -> CompanionResult<Self> {
        config.validate()?;
        let store = KvStore::open(&config.data_dir, Arc::clone(&provider))?;
        let cache = CacheLayer::new(store.clone());
        Self::assemble(config, provider, store, cache, gateway)
    }

    fn assemble(
        config: AppConfig,
        provider: Arc<dyn KeyProvider>,
        store: KvStore,
        cache: CacheLayer,
        gateway: G,
    ) -> CompanionResult<Self> {
        let queue = OfflineQueue::open(&config.data_dir, provider, config.sync.max_attempts)?;
        let analytics = AnalyticsStore::open(config.data_dir.join(ANALYTICS_FILE))?;
        info!(data_dir = %config.data_dir.display(), "Companion ready");

        Ok(Self {
            chats: ChatRepository::new(store.clone()),
            diary: DiaryRepository::new(store.clone()),
            profiles: ProfileDirectory::new(store.clone()),
            config,
            store,
            cache,
            gateway: Arc::new(gateway),
            queue,
            analytics,
            analyzer: LexiconAnalyzer::new(),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    pub fn cache(&self) -> &CacheLayer {
        &self.cache
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    pub fn chats(&self) -> &ChatRepository {
        &self.chats
    }

    pub fn diary(&self) -> &DiaryRepository {
        &self.diary
    }

    pub fn profiles(&self) -> &ProfileDirectory {
        &self.profiles
    }

    pub fn analytics(&self) -> &AnalyticsStore {
        &self.analytics
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Chat
    // ═══════════════════════════════════════════════════════════════════════

    /// Send a chat message.
    ///
    /// The detected emotion is logged and passed along with the request. On
    /// a reply, both messages are appended to the history and
    /// [`MESSAGE_POINTS`] are awarded. If the server cannot be reached the
    /// message is queued and the history is left untouched until the queue
    /// is drained.
    pub async fn send_message(&self, user_id: &str, text: &str) -> CompanionResult<SendOutcome> {
        let mut outgoing = Message::new(user_id, text)?;
        let history = self.chats.messages(user_id).await?;

        let analysis = self.analyzer.analyze(text);
        self.analytics.save_emotion(user_id, &analysis)?;
        let mut params = self.config.chat.clone();
        if analysis.emotion != UNDETERMINED {
            params.user_emotion = Some(analysis.emotion);
        }

        match self
            .gateway
            .send_message(user_id, text, &history, &params)
            .await
        {
            Ok(reply) => {
                outgoing = outgoing.with_status(MessageStatus::Delivered);
                let mut exchange = vec![outgoing];
                if !reply.trim().is_empty() {
                    exchange.push(Message::reply(reply.clone())?);
                }
                self.chats.append(user_id, &exchange).await?;
                self.analytics.add_points(user_id, MESSAGE_POINTS, "message")?;
                Ok(SendOutcome::Replied(reply))
            }
            Err(e) if is_remote_failure(&e) => {
                warn!(user_id, error = %e, "Message not delivered, queueing");
                self.queue
                    .enqueue(QueuedAction::SendMessage(SendMessagePayload {
                        user_id: user_id.to_string(),
                        text: text.to_string(),
                        history,
                        params,
                    }))
                    .await?;
                Ok(SendOutcome::Queued)
            }
            Err(e) => Err(e),
        }
    }

    /// Upload a recorded voice message.
    pub async fn send_audio(&self, user_id: &str, file_path: &Path) -> CompanionResult<SendOutcome> {
        if !tokio::fs::try_exists(file_path).await? {
            return Err(CompanionError::InvalidInput(format!(
                "audio file not found: {}",
                file_path.display()
            )));
        }

        match self.gateway.send_audio(user_id, file_path).await {
            Ok(reply) => {
                if !reply.trim().is_empty() {
                    self.chats
                        .append(user_id, &[Message::reply(reply.clone())?])
                        .await?;
                }
                Ok(SendOutcome::Replied(reply))
            }
            Err(e) if is_remote_failure(&e) => {
                warn!(user_id, error = %e, "Audio not delivered, queueing");
                self.queue
                    .enqueue(QueuedAction::SendAudio(SendAudioPayload {
                        user_id: user_id.to_string(),
                        file_path: file_path.to_path_buf(),
                    }))
                    .await?;
                Ok(SendOutcome::Queued)
            }
            Err(e) => Err(e),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Diary
    // ═══════════════════════════════════════════════════════════════════════

    /// Save a diary entry locally, then mirror it to the server.
    ///
    /// The local save, tag and [`DIARY_POINTS`] happen regardless of
    /// connectivity.
    pub async fn create_diary_entry(
        &self,
        user_id: &str,
        entry: DiaryEntry,
    ) -> CompanionResult<SendOutcome> {
        self.diary.create_entry(user_id, &entry).await?;
        self.analytics.add_points(user_id, DIARY_POINTS, "diary")?;
        let analysis = self.analyzer.analyze(&entry.content);
        self.analytics.save_emotion(user_id, &analysis)?;

        match self.gateway.create_diary_entry(user_id, &entry).await {
            Ok(()) => Ok(SendOutcome::Delivered),
            Err(e) if is_remote_failure(&e) => {
                warn!(user_id, error = %e, "Diary entry not mirrored, queueing");
                self.queue
                    .enqueue(QueuedAction::CreateDiaryEntry(CreateDiaryEntryPayload {
                        user_id: user_id.to_string(),
                        entry,
                    }))
                    .await?;
                Ok(SendOutcome::Queued)
            }
            Err(e) => Err(e),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Sync
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn check_connection(&self) -> bool {
        self.gateway.ping().await
    }

    /// Drain the offline queue if the server is reachable.
    ///
    /// Returns `None` without touching the queue when it is not.
    pub async fn sync_now(&self, cancel: &CancellationToken) -> CompanionResult<Option<DrainReport>> {
        if !self.check_connection().await {
            debug!("Server unreachable, skipping sync");
            return Ok(None);
        }
        let report = self
            .queue
            .drain_and_sync(self.gateway.as_ref(), &self.chats, cancel)
            .await?;
        Ok(Some(report))
    }

    /// Check connectivity every `interval` and drain the queue when online.
    ///
    /// The first check runs immediately. The loop ends when `cancel` fires.
    pub fn spawn_sync_loop(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let companion = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_secs = interval.as_secs(), "Sync loop started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match companion.sync_now(&cancel).await {
                    Ok(Some(report)) if report.synced > 0 || report.dropped > 0 => {
                        info!(synced = report.synced, dropped = report.dropped, "Background sync");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Background sync failed"),
                }
            }
            info!("Sync loop stopped");
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Housekeeping
    // ═══════════════════════════════════════════════════════════════════════

    /// Delete every local record, the offline queue and all analytics.
    pub async fn wipe_all_data(&self) -> CompanionResult<()> {
        let records = self.store.clear_all().await?;
        let queued = self.queue.clear().await?;
        self.analytics.clear()?;
        info!(records, queued, "Wiped all local data");
        Ok(())
    }
}

/// Whether the error came from the server side and the action can wait.
fn is_remote_failure(err: &CompanionError) -> bool {
    matches!(
        err,
        CompanionError::Network(_) | CompanionError::RemoteRejected { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ChatParams;
    use crate::keys::StaticKeyProvider;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Gateway whose reachability can be toggled.
    #[derive(Default)]
    struct SwitchGateway {
        online: AtomicBool,
        mirrored: AtomicUsize,
    }

    impl SwitchGateway {
        fn check(&self) -> CompanionResult<()> {
            if self.online.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(CompanionError::Network("connection refused".into()))
            }
        }
    }

    impl RemoteGateway for SwitchGateway {
        async fn send_message(
            &self,
            _user_id: &str,
            text: &str,
            _history: &[Message],
            _params: &ChatParams,
        ) -> CompanionResult<String> {
            self.check()?;
            Ok(format!("echo: {}", text))
        }

        async fn send_audio(&self, _user_id: &str, _file_path: &Path) -> CompanionResult<String> {
            self.check()?;
            Ok("heard you".into())
        }

        async fn create_diary_entry(&self, _user_id: &str, _entry: &DiaryEntry) -> CompanionResult<()> {
            self.check()?;
            self.mirrored.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn ping(&self) -> bool {
            self.online.load(Ordering::SeqCst)
        }
    }

    fn create_test_companion(online: bool) -> (Companion<SwitchGateway>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = AppConfig {
            data_dir: temp_dir.path().to_path_buf(),
            ..AppConfig::default()
        };
        let gateway = SwitchGateway::default();
        gateway.online.store(online, Ordering::SeqCst);
        let companion =
            Companion::with_gateway(config, Arc::new(StaticKeyProvider::random()), gateway)
                .unwrap();
        (companion, temp_dir)
    }

    fn go_online(companion: &Companion<SwitchGateway>) {
        companion.gateway().online.store(true, Ordering::SeqCst);
    }

    #[tokio::test]
    async fn test_send_message_online() {
        let (companion, _temp) = create_test_companion(true);

        let outcome = companion.send_message("U1", "I feel happy").await.unwrap();
        assert_eq!(outcome, SendOutcome::Replied("echo: I feel happy".into()));

        let history = companion.chats().messages("U1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, MessageStatus::Delivered);
        assert!(history[1].is_from_bot());
        assert_eq!(companion.analytics().total_points("U1").unwrap(), MESSAGE_POINTS);
        assert_eq!(companion.analytics().mood_stats("U1").unwrap().get("joy"), Some(&1));
    }

    #[tokio::test]
    async fn test_send_message_offline_then_sync() {
        let (companion, _temp) = create_test_companion(false);

        let outcome = companion.send_message("U1", "hi").await.unwrap();
        assert_eq!(outcome, SendOutcome::Queued);
        assert!(companion.chats().messages("U1").await.unwrap().is_empty());
        assert_eq!(companion.queue().len().await.unwrap(), 1);
        assert_eq!(companion.analytics().total_points("U1").unwrap(), 0);

        let cancel = CancellationToken::new();
        assert!(companion.sync_now(&cancel).await.unwrap().is_none());
        assert_eq!(companion.queue().len().await.unwrap(), 1);

        go_online(&companion);
        let report = companion.sync_now(&cancel).await.unwrap().unwrap();
        assert_eq!(report.synced, 1);
        assert_eq!(report.remaining, 0);

        let history = companion.chats().messages("U1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "hi");
        assert_eq!(history[1].text, "echo: hi");
    }

    #[tokio::test]
    async fn test_blank_message_is_rejected_before_sending() {
        let (companion, _temp) = create_test_companion(false);
        let err = companion.send_message("U1", "   ").await.unwrap_err();
        assert!(matches!(err, CompanionError::InvalidInput(_)));
        assert!(companion.queue().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_diary_entry_saved_locally_when_offline() {
        let (companion, _temp) = create_test_companion(false);
        let entry = DiaryEntry::new("Day 1", "ok").unwrap().with_tag("calm");

        let outcome = companion.create_diary_entry("U1", entry.clone()).await.unwrap();
        assert_eq!(outcome, SendOutcome::Queued);

        assert_eq!(companion.diary().entries("U1", 1, 50).await.unwrap(), vec![entry]);
        assert_eq!(companion.diary().tags("U1").await.unwrap(), vec!["calm"]);
        assert_eq!(companion.analytics().total_points("U1").unwrap(), DIARY_POINTS);

        go_online(&companion);
        companion.sync_now(&CancellationToken::new()).await.unwrap();
        assert_eq!(companion.gateway().mirrored.load(Ordering::SeqCst), 1);
        assert!(companion.queue().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_send_audio_requires_existing_file() {
        let (companion, temp) = create_test_companion(true);
        let missing = temp.path().join("missing.wav");
        assert!(companion.send_audio("U1", &missing).await.is_err());

        let recording = temp.path().join("note.wav");
        std::fs::write(&recording, b"RIFF").unwrap();
        let outcome = companion.send_audio("U1", &recording).await.unwrap();
        assert_eq!(outcome, SendOutcome::Replied("heard you".into()));
        assert_eq!(companion.chats().messages("U1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_loop_drains_when_online() {
        let (companion, _temp) = create_test_companion(false);
        companion.send_message("U1", "hi").await.unwrap();
        go_online(&companion);

        let cancel = CancellationToken::new();
        let handle = companion.spawn_sync_loop(Duration::from_millis(20), cancel.clone());

        let drained = async {
            while !companion.queue().is_empty().await.unwrap() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), drained)
            .await
            .expect("queue was not drained");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_wipe_all_data() {
        let (companion, _temp) = create_test_companion(false);
        let user = companion.profiles().create_profile("Alice").await.unwrap();
        companion.send_message(&user.id, "hi").await.unwrap();
        companion
            .create_diary_entry(&user.id, DiaryEntry::new("t", "c").unwrap())
            .await
            .unwrap();

        companion.wipe_all_data().await.unwrap();

        assert!(companion.profiles().user_ids().await.unwrap().is_empty());
        assert!(companion.queue().is_empty().await.unwrap());
        assert!(companion.diary().all_entries(&user.id).await.unwrap().is_empty());
        assert_eq!(companion.analytics().total_points(&user.id).unwrap(), 0);
    }
}
