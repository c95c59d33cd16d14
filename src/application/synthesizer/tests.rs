use super::*;
use crate::adapters::local::events::{EventBroadcaster, SubscriberConnection};
use crate::adapters::local::memory::MemoryStore;
use crate::application::retriever::RetrievalConfig;
use crate::domain::events::EventKind;
use crate::domain::segment::RawHit;
use crate::domain::video::{CompletionSignal, VideoRecord};
use crate::test_utils::{FakeEngine, FakeIndex};
use std::time::Duration;

type Synth = StudyMaterialSynthesizer<MemoryStore, FakeIndex, FakeEngine, EventBroadcaster>;

struct Harness {
    store: Arc<MemoryStore>,
    index: Arc<FakeIndex>,
    engine: Arc<FakeEngine>,
    hub: EventBroadcaster,
    synth: Synth,
}

fn lecture_hits() -> Vec<RawHit> {
    vec![
        RawHit::new(0.0, 29.5, "A heat engine converts heat from a hot reservoir into work.", 0.8),
        RawHit::new(30.0, 59.5, "The Carnot efficiency bound depends only on reservoir temperatures.", 0.9),
        RawHit::new(60.0, 90.0, "The entropy of an isolated system never decreases.", 0.7),
    ]
}

async fn harness(status: VideoStatus, hits: Vec<RawHit>, engine: FakeEngine) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let mut record = VideoRecord::with_id("v1", "s3://lectures/thermo.mp4", Some("idx-1".into()));
    if status != VideoStatus::Uploaded {
        record.begin_indexing("t1".to_string()).unwrap();
    }
    if status == VideoStatus::Ready {
        record
            .complete(&CompletionSignal::ready("t1", None).outcome)
            .unwrap();
    }
    store.put_video(&record).await.unwrap();

    let index = Arc::new(FakeIndex::new().with_hits(hits));
    let engine = Arc::new(engine);
    let hub = EventBroadcaster::default();
    let retriever = Arc::new(SegmentRetriever::new(
        Arc::clone(&store),
        Arc::clone(&index),
        RetrievalConfig {
            gap_secs: 0.0,
            ..RetrievalConfig::default()
        },
    ));
    let synth = StudyMaterialSynthesizer::new(
        Arc::clone(&store),
        retriever,
        Arc::clone(&engine),
        Arc::new(hub.clone()),
    )
    .with_policy(RetryPolicy::new(
        3,
        Duration::from_secs(5),
        Duration::from_secs(30),
    ));

    Harness {
        store,
        index,
        engine,
        hub,
        synth,
    }
}

fn small_options() -> GenerationOptions {
    GenerationOptions {
        topics_count: 3,
        flashcards_per_topic: 3,
        quiz_per_topic: 2,
        ..GenerationOptions::default().with_query("overview")
    }
}

fn drain(connection: &mut SubscriberConnection) -> Vec<StudyEvent> {
    let mut events = Vec::new();
    while let Some(event) = connection.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_ready_video_yields_valid_bundle() {
    let h = harness(VideoStatus::Ready, lecture_hits(), FakeEngine::new()).await;

    let bundle = h.synth.generate_all("v1", &small_options()).await.unwrap();

    assert!(!bundle.summary.trim().is_empty());
    assert!(!bundle.topics.is_empty());
    assert!(bundle.topics.len() <= 3);
    assert!(bundle.keys_match_topics());
    assert_eq!(bundle.grounding_segments.len(), 3);
    assert_eq!(bundle.query.as_deref(), Some("overview"));
    assert!(!bundle.is_partial());
    assert!(ContentValidator::new().audit(&bundle).is_empty());
    assert_eq!(
        h.store.get_study_bundle("v1").await.unwrap(),
        Some(bundle.clone())
    );
    assert_eq!(h.synth.bundle("v1").await.unwrap(), Some(bundle));
    assert_eq!(
        h.index.searches(),
        vec![("idx-1".to_string(), "overview".to_string())]
    );
}

#[tokio::test]
async fn test_progress_events_cover_every_stage() {
    let h = harness(VideoStatus::Ready, lecture_hits(), FakeEngine::new()).await;
    let mut connection = h.hub.subscribe("v1");

    h.synth.generate_all("v1", &small_options()).await.unwrap();

    let events = drain(&mut connection);
    assert!(events
        .iter()
        .all(|e| e.event == EventKind::GenerationProgress));
    let trail: Vec<(GenerationStage, StageOutcome)> = events
        .iter()
        .map(|e| (e.stage.unwrap(), e.outcome.unwrap()))
        .collect();
    assert_eq!(
        trail.first(),
        Some(&(GenerationStage::Grounding, StageOutcome::Started))
    );
    assert_eq!(
        trail.last(),
        Some(&(GenerationStage::Bundle, StageOutcome::Completed))
    );
    for stage in [
        GenerationStage::Summary,
        GenerationStage::Topics,
        GenerationStage::Flashcards,
        GenerationStage::Quiz,
    ] {
        assert!(trail.contains(&(stage, StageOutcome::Started)));
        assert!(trail.contains(&(stage, StageOutcome::Completed)));
    }
}

#[tokio::test]
async fn test_video_not_ready_makes_no_engine_calls() {
    let h = harness(VideoStatus::Indexing, lecture_hits(), FakeEngine::new()).await;

    let err = h.synth.generate_all("v1", &small_options()).await.unwrap_err();

    assert!(matches!(
        err,
        GenerationError::VideoNotReady {
            status: VideoStatus::Indexing,
            ..
        }
    ));
    assert_eq!(h.engine.calls(), 0);
    assert!(h.index.searches().is_empty());
}

#[tokio::test]
async fn test_zero_hits_is_insufficient_grounding_and_nothing_persisted() {
    let h = harness(VideoStatus::Ready, Vec::new(), FakeEngine::new()).await;
    let mut connection = h.hub.subscribe("v1");

    let err = h.synth.generate_all("v1", &small_options()).await.unwrap_err();

    assert!(matches!(err, GenerationError::InsufficientGroundingData(_)));
    assert_eq!(h.engine.calls(), 0);
    assert!(h.store.get_study_bundle("v1").await.unwrap().is_none());

    let failure = drain(&mut connection).pop().unwrap();
    assert_eq!(failure.stage, Some(GenerationStage::Grounding));
    assert_eq!(failure.outcome, Some(StageOutcome::Failed));
}

#[tokio::test]
async fn test_index_failure_surfaces_as_retrieval_error() {
    let h = harness(VideoStatus::Ready, lecture_hits(), FakeEngine::new()).await;
    let failing = Arc::new(FakeIndex::new().failing_search("index unavailable"));
    let synth = StudyMaterialSynthesizer::new(
        Arc::clone(&h.store),
        Arc::new(SegmentRetriever::new(
            Arc::clone(&h.store),
            failing,
            RetrievalConfig::default(),
        )),
        Arc::clone(&h.engine),
        Arc::new(h.hub.clone()),
    );

    let err = synth.generate_all("v1", &small_options()).await.unwrap_err();
    assert!(matches!(err, GenerationError::Retrieval(_)));
    assert_eq!(h.engine.calls(), 0);
}

#[tokio::test]
async fn test_rejected_summary_is_regenerated() {
    let engine = FakeEngine::new().respond(
        GenerationStage::Summary,
        "This lecture covers [TOPIC] in detail and explains why it matters for the course.",
    );
    let h = harness(VideoStatus::Ready, lecture_hits(), engine).await;

    let bundle = h.synth.generate_all("v1", &small_options()).await.unwrap();

    assert_eq!(bundle.summary, crate::test_utils::LECTURE_SUMMARY);
    assert_eq!(h.engine.calls_for(GenerationStage::Summary), 2);
    let instructions = h.engine.instructions(GenerationStage::Summary);
    assert!(!instructions[0].contains("previous answer was rejected"));
    assert!(instructions[1].contains("previous answer was rejected"));
}

#[tokio::test]
async fn test_summary_exhaustion_aborts_with_stage() {
    let engine = FakeEngine::new().always(
        GenerationStage::Summary,
        "Lorem ipsum dolor sit amet, consectetur adipiscing elit, sed do eiusmod tempor.",
    );
    let h = harness(VideoStatus::Ready, lecture_hits(), engine).await;

    let err = h.synth.generate_all("v1", &small_options()).await.unwrap_err();

    assert!(matches!(
        err,
        GenerationError::GenerationIncomplete {
            stage: GenerationStage::Summary,
            ..
        }
    ));
    assert_eq!(err.stage(), GenerationStage::Summary);
    assert_eq!(h.engine.calls_for(GenerationStage::Summary), 3);
    assert_eq!(h.engine.calls_for(GenerationStage::Topics), 0);
    assert!(h.store.get_study_bundle("v1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_topics_accumulate_and_deduplicate_across_attempts() {
    let engine = FakeEngine::new().respond(
        GenerationStage::Topics,
        r#"["Carnot efficiency bound", "carnot  EFFICIENCY bound", "Topic 1"]"#,
    );
    let h = harness(VideoStatus::Ready, lecture_hits(), engine).await;

    let bundle = h.synth.generate_all("v1", &small_options()).await.unwrap();

    assert_eq!(
        bundle.topics,
        vec![
            "Carnot efficiency bound",
            "Entropy of isolated systems",
            "Heat engine cycles"
        ]
    );
    assert_eq!(h.engine.calls_for(GenerationStage::Topics), 2);
    assert!(h.engine.instructions(GenerationStage::Topics)[1]
        .contains("Do not repeat: Carnot efficiency bound."));
}

#[tokio::test]
async fn test_topics_differing_only_in_trailing_punctuation_are_one_topic() {
    let engine = FakeEngine::new().respond(
        GenerationStage::Topics,
        r#"["Carnot efficiency bound", "Carnot efficiency bound."]"#,
    );
    let h = harness(VideoStatus::Ready, lecture_hits(), engine).await;
    let options = GenerationOptions {
        topics_count: 2,
        ..small_options()
    };

    let bundle = h.synth.generate_all("v1", &options).await.unwrap();

    assert_eq!(
        bundle.topics,
        vec!["Carnot efficiency bound", "Entropy of isolated systems"]
    );
    assert!(ContentValidator::new().audit(&bundle).is_empty());
    assert_eq!(h.engine.calls_for(GenerationStage::Flashcards), 2);
}

#[tokio::test]
async fn test_no_valid_topics_aborts() {
    let engine = FakeEngine::new().always(GenerationStage::Topics, r#"["Topic 1", "[TOPIC]"]"#);
    let h = harness(VideoStatus::Ready, lecture_hits(), engine).await;

    let err = h.synth.generate_all("v1", &small_options()).await.unwrap_err();

    assert!(matches!(
        err,
        GenerationError::GenerationIncomplete {
            stage: GenerationStage::Topics,
            ..
        }
    ));
    assert_eq!(h.engine.calls_for(GenerationStage::Flashcards), 0);
}

#[tokio::test]
async fn test_shortfall_marks_decks_partial() {
    let h = harness(VideoStatus::Ready, lecture_hits(), FakeEngine::new()).await;
    let mut connection = h.hub.subscribe("v1");
    let options = GenerationOptions {
        topics_count: 1,
        flashcards_per_topic: 5,
        ..small_options()
    };

    let bundle = h.synth.generate_all("v1", &options).await.unwrap();

    let deck = &bundle.flashcards_by_topic["Carnot efficiency bound"];
    assert_eq!(deck.items.len(), 3);
    assert_eq!(deck.requested, 5);
    assert!(deck.is_partial);
    assert!(bundle.is_partial());
    assert!(!bundle.quiz_by_topic["Carnot efficiency bound"].is_partial);
    assert_eq!(h.engine.calls_for(GenerationStage::Flashcards), 3);

    let events = drain(&mut connection);
    assert!(events.iter().any(|e| e.stage == Some(GenerationStage::Flashcards)
        && e.outcome == Some(StageOutcome::Partial)));
}

#[tokio::test]
async fn test_unparseable_items_degrade_instead_of_failing() {
    let engine = FakeEngine::new().always(GenerationStage::Quiz, "Sorry, I cannot help with that.");
    let h = harness(VideoStatus::Ready, lecture_hits(), engine).await;
    let options = GenerationOptions {
        topics_count: 1,
        ..small_options()
    };

    let bundle = h.synth.generate_all("v1", &options).await.unwrap();

    let deck = &bundle.quiz_by_topic["Carnot efficiency bound"];
    assert!(deck.items.is_empty());
    assert!(deck.is_partial);
    assert_eq!(bundle.flashcards_by_topic["Carnot efficiency bound"].items.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_slow_engine_is_bounded_by_stage_budget() {
    let engine = FakeEngine::new().with_delay(Duration::from_secs(120));
    let h = harness(VideoStatus::Ready, lecture_hits(), engine).await;
    let synth = h.synth.with_policy(RetryPolicy::new(
        3,
        Duration::from_secs(5),
        Duration::from_secs(12),
    ));

    let err = synth.generate_all("v1", &small_options()).await.unwrap_err();

    match err {
        GenerationError::GenerationIncomplete { stage, message } => {
            assert_eq!(stage, GenerationStage::Summary);
            assert!(message.contains("timed out"));
        }
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test]
async fn test_regeneration_replaces_bundle() {
    let h = harness(VideoStatus::Ready, lecture_hits(), FakeEngine::new()).await;

    h.synth.generate_all("v1", &small_options()).await.unwrap();
    let second = h
        .synth
        .generate_all("v1", &small_options().with_query("entropy"))
        .await
        .unwrap();

    let stored = h.store.get_study_bundle("v1").await.unwrap().unwrap();
    assert_eq!(stored.query.as_deref(), Some("entropy"));
    assert_eq!(stored, second);
}

#[tokio::test(start_paused = true)]
async fn test_runs_for_one_video_do_not_interleave() {
    let engine = FakeEngine::new().with_delay(Duration::from_millis(100));
    let h = harness(VideoStatus::Ready, lecture_hits(), engine).await;

    let first_options = small_options();
    let second_options = small_options().with_query("entropy");
    let (first, second) = tokio::join!(
        h.synth.generate_all("v1", &first_options),
        h.synth.generate_all("v1", &second_options)
    );
    first.unwrap();
    second.unwrap();

    let stages = h.engine.stages();
    let per_run = stages.len() / 2;
    let summaries: Vec<usize> = stages
        .iter()
        .enumerate()
        .filter(|(_, s)| **s == GenerationStage::Summary)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(summaries, vec![0, per_run]);
    assert_eq!(stages[..per_run], stages[per_run..]);
}

#[test]
fn test_relevant_segments_share_a_significant_word() {
    let segments = merge_hits_for_test();
    let entropy = relevant_segments("Entropy of isolated systems", &segments);
    assert_eq!(entropy.len(), 1);
    assert_eq!(entropy[0].start_sec, 60.0);

    let unrelated = relevant_segments("Quantum tunnelling", &segments);
    assert_eq!(unrelated.len(), segments.len());
}

fn merge_hits_for_test() -> Vec<Segment> {
    crate::domain::segment::merge_hits("v1", lecture_hits(), 0.0)
}
