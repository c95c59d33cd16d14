use crate::domain::segment::{merge_hits, rank_and_cap, EmbeddingScope, Segment};
use crate::domain::video::VideoRecord;
use crate::error::RetrievalError;
use crate::ports::index::ContentIndex;
use crate::ports::repository::MetadataStore;
use crate::ports::PortError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Query used when the caller gives none, and for snapshots.
pub const BROAD_QUERY: &str = "main ideas, definitions, and worked examples in this lecture";

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    /// Hits closer than this many seconds are merged into one segment.
    pub gap_secs: f64,
    pub scopes: Vec<EmbeddingScope>,
    pub timeout: Duration,
    /// Segment cap for the stored snapshot of a ready video.
    pub snapshot_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            gap_secs: 2.0,
            scopes: vec![EmbeddingScope::Visual, EmbeddingScope::Conversation],
            timeout: Duration::from_secs(20),
            snapshot_limit: 200,
        }
    }
}

/// Fetches query-relevant segments of an indexed video from the content index.
pub struct SegmentRetriever<S, I> {
    store: Arc<S>,
    index: Arc<I>,
    config: RetrievalConfig,
}

impl<S, I> SegmentRetriever<S, I>
where
    S: MetadataStore,
    I: ContentIndex,
{
    pub fn new(store: Arc<S>, index: Arc<I>, config: RetrievalConfig) -> Self {
        Self {
            store,
            index,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub async fn retrieve(
        &self,
        video_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Segment>, RetrievalError> {
        let record = self
            .store
            .get_video(video_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| RetrievalError::VideoNotFound(video_id.to_string()))?;
        self.retrieve_for(&record, query, limit).await
    }

    /// Searches, merges nearby hits, ranks by confidence, and keeps `limit`.
    /// No hits is an empty result; index failures are errors.
    pub async fn retrieve_for(
        &self,
        record: &VideoRecord,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Segment>, RetrievalError> {
        let target = record
            .search_target()
            .ok_or_else(|| RetrievalError::NotIndexed(record.id().to_string()))?;
        let query = match query.trim() {
            "" => BROAD_QUERY,
            q => q,
        };

        let hits = tokio::time::timeout(
            self.config.timeout,
            self.index.search(target, query, &self.config.scopes),
        )
        .await
        .map_err(|_| RetrievalError::Timeout(self.config.timeout))?
        .map_err(|e| RetrievalError::Index(e.to_string()))?;

        let raw = hits.len();
        let segments = rank_and_cap(merge_hits(record.id(), hits, self.config.gap_secs), limit);
        debug!(
            "Search on video {} for {:?}: {} hits -> {} segments",
            record.id(),
            query,
            raw,
            segments.len()
        );
        Ok(segments)
    }

    /// Replaces the stored segment set of a ready video with a broad retrieval.
    pub async fn snapshot(&self, video_id: &str) -> Result<Vec<Segment>, RetrievalError> {
        let mut segments = self
            .retrieve(video_id, BROAD_QUERY, self.config.snapshot_limit)
            .await?;
        segments.sort_by(|a, b| a.start_sec.total_cmp(&b.start_sec));
        self.store
            .put_segments(video_id, &segments)
            .await
            .map_err(store_error)?;
        info!("Stored {} segments for video {}", segments.len(), video_id);
        Ok(segments)
    }

    /// Stored segments of a video, ordered by start time.
    pub async fn segments(&self, video_id: &str) -> Result<Vec<Segment>, RetrievalError> {
        self.store
            .get_video(video_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| RetrievalError::VideoNotFound(video_id.to_string()))?;
        self.store
            .get_segments(video_id)
            .await
            .map_err(store_error)
    }
}

fn store_error(e: PortError) -> RetrievalError {
    RetrievalError::Store(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::local::memory::MemoryStore;
    use crate::domain::segment::RawHit;
    use crate::domain::video::CompletionSignal;
    use crate::ports::index::MockContentIndex;
    use crate::test_utils::FakeIndex;

    async fn ready_video(store: &MemoryStore, id: &str, index_id: Option<&str>) -> VideoRecord {
        let mut record = VideoRecord::with_id(id, "s3://lectures/x.mp4", None);
        record.begin_indexing(format!("task-{id}")).unwrap();
        record
            .complete(&CompletionSignal::ready("", index_id.map(str::to_string)).outcome)
            .unwrap();
        store.put_video(&record).await.unwrap();
        record
    }

    fn lecture_hits() -> Vec<RawHit> {
        vec![
            RawHit::new(31.0, 60.0, "Then we derive the efficiency bound.", 0.7),
            RawHit::new(0.0, 30.0, "A heat engine converts heat into work.", 0.6),
            RawHit::new(120.0, 150.0, "Entropy of an isolated system never decreases.", 0.9),
            RawHit::new(29.0, 32.0, "A heat engine converts heat into work.", 0.5),
        ]
    }

    #[tokio::test]
    async fn test_retrieve_merges_ranks_and_caps() {
        let store = Arc::new(MemoryStore::new());
        ready_video(&store, "v1", Some("idx-1")).await;
        let index = Arc::new(FakeIndex::new().with_hits(lecture_hits()));
        let retriever =
            SegmentRetriever::new(store, Arc::clone(&index), RetrievalConfig::default());

        let segments = retriever.retrieve("v1", "entropy", 10).await.unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start_sec, 120.0);
        assert_eq!((segments[1].start_sec, segments[1].end_sec), (0.0, 60.0));
        assert_eq!(segments[1].confidence, 0.7);
        assert_eq!(
            segments[1].text,
            "A heat engine converts heat into work. Then we derive the efficiency bound."
        );
        assert_eq!(index.searches(), vec![("idx-1".to_string(), "entropy".to_string())]);

        let capped = retriever.retrieve("v1", "entropy", 1).await.unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].confidence, 0.9);
    }

    #[tokio::test]
    async fn test_search_falls_back_to_task_and_broad_query() {
        let store = Arc::new(MemoryStore::new());
        ready_video(&store, "v1", None).await;
        let index = Arc::new(FakeIndex::new());
        let retriever =
            SegmentRetriever::new(store, Arc::clone(&index), RetrievalConfig::default());

        let segments = retriever.retrieve("v1", "  ", 5).await.unwrap();
        assert!(segments.is_empty());
        assert_eq!(
            index.searches(),
            vec![("task-v1".to_string(), BROAD_QUERY.to_string())]
        );
    }

    #[tokio::test]
    async fn test_index_failure_is_an_error_not_empty() {
        let store = Arc::new(MemoryStore::new());
        ready_video(&store, "v1", Some("idx-1")).await;
        let mut index = MockContentIndex::new();
        index
            .expect_search()
            .times(1)
            .returning(|_, _, _| Err("503 from index".into()));
        let retriever = SegmentRetriever::new(store, Arc::new(index), RetrievalConfig::default());

        let err = retriever.retrieve("v1", "entropy", 5).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Index(ref m) if m.contains("503")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_search_times_out() {
        let store = Arc::new(MemoryStore::new());
        ready_video(&store, "v1", Some("idx-1")).await;
        let index = Arc::new(FakeIndex::new().with_search_delay(Duration::from_secs(60)));
        let retriever = SegmentRetriever::new(store, index, RetrievalConfig::default());

        let err = retriever.retrieve("v1", "entropy", 5).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Timeout(t) if t == Duration::from_secs(20)));
    }

    #[tokio::test]
    async fn test_unsubmitted_video_cannot_be_searched() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_video(&VideoRecord::with_id("v1", "s3://lectures/x.mp4", None))
            .await
            .unwrap();
        let retriever = SegmentRetriever::new(
            store,
            Arc::new(MockContentIndex::new()),
            RetrievalConfig::default(),
        );
        assert!(matches!(
            retriever.retrieve("v1", "entropy", 5).await,
            Err(RetrievalError::NotIndexed(_))
        ));
        assert!(matches!(
            retriever.retrieve("nope", "entropy", 5).await,
            Err(RetrievalError::VideoNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_replaces_stored_set_in_time_order() {
        let store = Arc::new(MemoryStore::new());
        ready_video(&store, "v1", Some("idx-1")).await;
        store
            .put_segments("v1", &merge_hits("v1", vec![RawHit::new(500.0, 510.0, "stale", 0.1)], 0.0))
            .await
            .unwrap();
        let index = Arc::new(FakeIndex::new().with_hits(lecture_hits()));
        let retriever = SegmentRetriever::new(Arc::clone(&store), index, RetrievalConfig::default());

        let snapshot = retriever.snapshot("v1").await.unwrap();
        let stored = retriever.segments("v1").await.unwrap();
        assert_eq!(stored, snapshot);
        let starts: Vec<f64> = stored.iter().map(|s| s.start_sec).collect();
        assert_eq!(starts, vec![0.0, 120.0]);
    }
}
