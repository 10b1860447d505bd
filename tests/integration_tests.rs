use httpmock::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use zhouyi::core::ReadingStore;
use zhouyi::domain::model::CastSequence;
use zhouyi::{
    HexagramRepository, InMemoryDataset, InterpreterClient, LocalReadingStore, ReadingSession,
    SessionState,
};

const USAGE_SENTINEL: &str = "[[[TOKEN_USAGE]]]";

#[tokio::test]
async fn test_end_to_end_reading_with_real_http() {
    // Local persistence in a throwaway directory
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(LocalReadingStore::new(temp_dir.path().join("readings.json")));

    // Mock interpretation server: narrative, newline, sentinel, usage JSON
    let server = MockServer::start();
    let stream_body = format!(
        "此卦靜中有動。\n{USAGE_SENTINEL}{{\"input_tokens\":11,\"output_tokens\":88,\"total_tokens\":99}}"
    );
    let ask_mock = server.mock(|when, then| {
        when.method(POST).path("/ask").header("Accept", "text/plain");
        then.status(200)
            .header("Content-Type", "text/plain")
            .body(&stream_body);
    });

    let dataset = InMemoryDataset::bundled().unwrap();
    let repository = HexagramRepository::new(dataset);
    let mut session = ReadingSession::new(repository, Some(store.clone()), Duration::ZERO);
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    // Cast resolves locally before any network traffic
    let context = session
        .cast("今年適合創業嗎", &mut rng, |_| {})
        .await
        .unwrap()
        .clone();
    assert_eq!(session.state(), SessionState::LocalResultReady);
    assert_eq!(context.hexagram_code.len(), 6);
    assert!(!context.judgment.is_empty());

    // The cast was persisted before the interpretation was requested
    let saved = store.list(10).await.unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].question, "今年適合創業嗎");
    assert_eq!(saved[0].hexagram_code, context.hexagram_code);

    // Streamed interpretation, demuxed into narrative and usage
    let client = InterpreterClient::new(&server.base_url(), None);
    let cancel = CancellationToken::new();
    let mut streamed = String::new();
    let outcome = session
        .request_interpretation(&client, None, &cancel, &mut |s| streamed.push_str(s))
        .await
        .unwrap()
        .clone();

    ask_mock.assert();
    assert_eq!(session.state(), SessionState::InterpretationComplete);
    assert_eq!(streamed, "此卦靜中有動。");
    assert_eq!(outcome.content, streamed);
    assert_eq!(outcome.usage.unwrap().total_tokens, 99);
}

#[tokio::test]
async fn test_known_cast_resolves_the_canonical_hexagram() {
    let dataset = InMemoryDataset::bundled().unwrap();
    let repository = HexagramRepository::new(dataset);

    let cast = CastSequence::from_values(&[7, 9, 8, 6, 7, 7]).unwrap();
    let context = repository.lookup_cast(&cast).unwrap();

    assert_eq!(context.hexagram_code, "110011");
    assert_eq!(context.hexagram_id, 61);
    assert_eq!(context.display_name, "中孚");
    assert_eq!(context.changing_lines, vec![2, 4]);
}

#[tokio::test]
async fn test_insufficient_funds_then_unlock_retry() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(LocalReadingStore::new(temp_dir.path().join("readings.json")));

    let server = MockServer::start();
    let mut broke_mock = server.mock(|when, then| {
        when.method(POST).path("/ask");
        then.status(402).body("{\"error\":\"no_balance\"}");
    });

    let dataset = InMemoryDataset::bundled().unwrap();
    let mut session = ReadingSession::new(
        HexagramRepository::new(dataset),
        Some(store),
        Duration::ZERO,
    );
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    session.cast("何時轉運", &mut rng, |_| {}).await.unwrap();

    let client = InterpreterClient::new(&server.base_url(), None);
    let cancel = CancellationToken::new();

    let err = session
        .request_interpretation(&client, None, &cancel, &mut |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, zhouyi::DivinationError::InsufficientFunds));
    assert_eq!(session.state(), SessionState::LocalResultReady);

    // Funds restored (via the reward flow); same request now succeeds
    broke_mock.delete();
    let unlocked_mock = server.mock(|when, then| {
        when.method(POST).path("/ask").header("X-Ad-Session", "unlock-1");
        then.status(200).body("解卦內容。");
    });

    let outcome = session
        .request_interpretation(&client, Some("unlock-1"), &cancel, &mut |_| {})
        .await
        .unwrap();
    unlocked_mock.assert();
    assert_eq!(outcome.content, "解卦內容。");
    assert_eq!(session.state(), SessionState::InterpretationComplete);
}
