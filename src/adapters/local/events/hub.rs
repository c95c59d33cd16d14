use crate::domain::events::StudyEvent;
use crate::ports::events::EventPublisher;
use futures::Stream;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-video event buffer. A subscriber that falls further behind than this
/// skips ahead instead of being disconnected.
pub const DEFAULT_CAPACITY: usize = 64;

type Sender = broadcast::Sender<StudyEvent>;

struct Channels {
    capacity: usize,
    by_video: RwLock<HashMap<String, Sender>>,
}

impl Channels {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Sender>> {
        self.by_video.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Sender>> {
        self.by_video.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn sender(&self, video_id: &str) -> Option<Sender> {
        self.read().get(video_id).cloned()
    }

    /// Drops the channel of `video_id` once its last receiver is gone.
    fn release(&self, video_id: &str) {
        let mut channels = self.write();
        if channels
            .get(video_id)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            channels.remove(video_id);
            debug!("Closed event channel for video {}", video_id);
        }
    }
}

/// Multiplexes study events to the clients watching each video.
///
/// The map lock is only held to find or create a video's channel; fan-out to
/// the subscribers of that video happens on its own broadcast channel.
/// Nothing is buffered for videos without subscribers.
#[derive(Clone)]
pub struct EventBroadcaster {
    channels: Arc<Channels>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Channels {
                capacity: capacity.max(1),
                by_video: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Opens a live stream of the events published for `video_id` from now on.
    pub fn subscribe(&self, video_id: &str) -> SubscriberConnection {
        let rx = {
            let mut channels = self.channels.write();
            channels
                .entry(video_id.to_string())
                .or_insert_with(|| broadcast::channel(self.channels.capacity).0)
                .subscribe()
        };
        let connection = SubscriberConnection {
            id: Uuid::new_v4(),
            video_id: video_id.to_string(),
            rx: Some(rx),
            channels: Arc::clone(&self.channels),
        };
        debug!(
            "Subscriber {} joined video {} ({} connected)",
            connection.id,
            video_id,
            self.subscriber_count(video_id)
        );
        connection
    }

    pub fn unsubscribe(&self, connection: SubscriberConnection) {
        drop(connection);
    }

    /// Best-effort delivery to everyone currently subscribed to `video_id`.
    pub fn send(&self, video_id: &str, event: StudyEvent) -> usize {
        match self.channels.sender(video_id) {
            // Err only means every receiver went away since the lookup.
            Some(tx) => tx.send(event).unwrap_or(0),
            None => 0,
        }
    }

    pub fn subscriber_count(&self, video_id: &str) -> usize {
        self.channels
            .sender(video_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Number of videos with at least one open channel.
    pub fn active_videos(&self) -> usize {
        self.channels.read().len()
    }

    /// Prunes channels without receivers, then pings every remaining
    /// connection. Returns the number of connections reached.
    pub fn heartbeat(&self) -> usize {
        let live: Vec<(String, Sender)> = {
            let mut channels = self.channels.write();
            channels.retain(|_, tx| tx.receiver_count() > 0);
            channels
                .iter()
                .map(|(video_id, tx)| (video_id.clone(), tx.clone()))
                .collect()
        };
        live.into_iter()
            .map(|(video_id, tx)| tx.send(StudyEvent::heartbeat(&video_id)).unwrap_or(0))
            .sum()
    }

    /// Runs [`heartbeat`](Self::heartbeat) every `interval` until `shutdown`
    /// is cancelled, then closes every channel.
    pub fn spawn_heartbeat(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let broadcaster = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let reached = broadcaster.heartbeat();
                        debug!("Heartbeat reached {} connections", reached);
                    }
                }
            }
            broadcaster.shutdown();
        })
    }

    /// Closes every channel; open connections drain and then end.
    pub fn shutdown(&self) {
        let closed = {
            let mut channels = self.channels.write();
            let count = channels.len();
            channels.clear();
            count
        };
        info!("Event broadcaster shut down ({} channels closed)", closed);
    }
}

impl EventPublisher for EventBroadcaster {
    fn publish(&self, video_id: &str, event: StudyEvent) -> usize {
        self.send(video_id, event)
    }
}

/// A client's live view of one video's events. Dropping it unsubscribes.
pub struct SubscriberConnection {
    id: Uuid,
    video_id: String,
    rx: Option<broadcast::Receiver<StudyEvent>>,
    channels: Arc<Channels>,
}

impl SubscriberConnection {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// Next event, or `None` once the broadcaster has shut down.
    pub async fn recv(&mut self) -> Option<StudyEvent> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        "Subscriber {} on video {} skipped {} events",
                        self.id, self.video_id, skipped
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<StudyEvent> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(
                        "Subscriber {} on video {} skipped {} events",
                        self.id, self.video_id, skipped
                    );
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = StudyEvent> + Send + 'static {
        futures::stream::unfold(self, |mut connection| async move {
            connection.recv().await.map(|event| (event, connection))
        })
    }
}

impl Drop for SubscriberConnection {
    fn drop(&mut self) {
        // Drop the receiver first so the count seen by `release` excludes it.
        self.rx.take();
        self.channels.release(&self.video_id);
        debug!("Subscriber {} left video {}", self.id, self.video_id);
    }
}
