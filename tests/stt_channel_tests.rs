use std::time::Duration;

use preplive::config::SttConfig;
use preplive::stt::{AudioDisposition, RetryVerdict, SttChannel, SttManager, SttOutbound, SttState};
use tokio::sync::mpsc;

fn chunk(tag: u8) -> Vec<u8> {
    vec![tag; 4]
}

#[test]
fn test_audio_queues_before_connect_and_flushes_in_order() {
    let mut ch = SttChannel::new(50, 3, Duration::from_millis(500), Duration::from_secs(8));

    // Five frames arrive before the link is up
    for tag in 0..5u8 {
        assert_eq!(ch.accept_audio(chunk(tag)), AudioDisposition::Queued);
    }
    assert_eq!(ch.pending_len(), 5);

    assert!(ch.begin_connect());
    assert_eq!(ch.state(), SttState::Connecting);

    // Still connecting; audio keeps queueing
    assert_eq!(ch.accept_audio(chunk(5)), AudioDisposition::Queued);

    let flushed = ch.mark_ready().unwrap();
    assert_eq!(ch.state(), SttState::Ready);
    let tags: Vec<u8> = flushed.iter().map(|c| c[0]).collect();
    assert_eq!(tags, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(ch.pending_len(), 0);

    // Once ready, audio forwards directly
    assert_eq!(
        ch.accept_audio(chunk(9)),
        AudioDisposition::Forward(chunk(9))
    );
}

#[test]
fn test_full_queue_drops_oldest_chunk() {
    let mut ch = SttChannel::new(3, 3, Duration::from_millis(500), Duration::from_secs(8));

    for tag in 0..3u8 {
        assert_eq!(ch.accept_audio(chunk(tag)), AudioDisposition::Queued);
    }
    assert_eq!(
        ch.accept_audio(chunk(3)),
        AudioDisposition::QueuedDroppedOldest
    );
    assert_eq!(ch.pending_len(), 3);

    ch.begin_connect();
    let tags: Vec<u8> = ch.mark_ready().unwrap().iter().map(|c| c[0]).collect();
    assert_eq!(tags, vec![1, 2, 3]);
}

#[test]
fn test_backoff_doubles_then_caps() {
    let mut ch = SttChannel::new(50, 10, Duration::from_millis(500), Duration::from_secs(2));
    ch.begin_connect();

    let expected = [500u64, 1000, 2000, 2000];
    for (i, want_ms) in expected.iter().enumerate() {
        match ch.mark_error() {
            RetryVerdict::RetryAfter { delay, attempt } => {
                assert_eq!(attempt, (i + 1) as u32);
                assert_eq!(delay, Duration::from_millis(*want_ms));
            }
            other => panic!("unexpected verdict: {:?}", other),
        }
        assert!(ch.begin_connect());
    }
}

#[test]
fn test_retry_budget_exhaustion_closes_link() {
    let mut ch = SttChannel::new(50, 3, Duration::from_millis(500), Duration::from_secs(8));
    ch.begin_connect();
    ch.accept_audio(chunk(0));

    for _ in 0..3 {
        assert!(matches!(ch.mark_error(), RetryVerdict::RetryAfter { .. }));
        ch.begin_connect();
    }
    assert_eq!(ch.mark_error(), RetryVerdict::GiveUp);
    assert_eq!(ch.state(), SttState::Closed);
    assert_eq!(ch.pending_len(), 0);

    // Closed is terminal for both audio and further failures
    assert_eq!(ch.accept_audio(chunk(1)), AudioDisposition::Discarded);
    assert_eq!(ch.mark_error(), RetryVerdict::Ignored);
}

#[test]
fn test_successful_connect_resets_retry_budget() {
    let mut ch = SttChannel::new(50, 2, Duration::from_millis(100), Duration::from_secs(1));
    ch.begin_connect();

    assert!(matches!(ch.mark_error(), RetryVerdict::RetryAfter { .. }));
    assert!(matches!(ch.mark_error(), RetryVerdict::RetryAfter { .. }));
    ch.begin_connect();
    ch.mark_ready().unwrap();

    // A fresh failure starts at attempt 1 again
    match ch.mark_error() {
        RetryVerdict::RetryAfter { attempt, .. } => assert_eq!(attempt, 1),
        other => panic!("unexpected verdict: {:?}", other),
    }
}

#[test]
fn test_mark_ready_requires_connecting() {
    let mut ch = SttChannel::new(50, 3, Duration::from_millis(500), Duration::from_secs(8));
    assert!(ch.mark_ready().is_none());

    ch.begin_connect();
    ch.mark_ready().unwrap();
    // Second ready on an already-ready link is rejected
    assert!(ch.mark_ready().is_none());
}

#[test]
fn test_begin_connect_only_from_idle_or_error() {
    let mut ch = SttChannel::new(50, 3, Duration::from_millis(500), Duration::from_secs(8));
    assert!(ch.begin_connect());
    assert!(!ch.begin_connect());

    ch.mark_ready().unwrap();
    assert!(!ch.begin_connect());

    ch.mark_error();
    assert!(ch.begin_connect());

    ch.close();
    assert!(!ch.begin_connect());
}

fn manager_config() -> SttConfig {
    let mut cfg = SttConfig::default();
    // A key the environment will not have, so the link task exits without
    // touching the network
    cfg.api_key_env = "PREPLIVE_TEST_UNSET_STT_KEY".to_string();
    cfg
}

#[tokio::test]
async fn test_manager_flushes_large_pending_queue_in_order() {
    let mut cfg = manager_config();
    cfg.max_pending_chunks = 200;
    let (events_tx, _events_rx) = mpsc::channel(16);
    let mut manager = SttManager::new(cfg, events_tx);

    for tag in 0..100u8 {
        manager.send_audio(vec![tag; 2]);
    }

    // Writer channel must absorb the whole flush in one burst
    let (tx, mut rx) = mpsc::channel(201);
    assert!(manager.on_opened(tx));

    for tag in 0..100u8 {
        match rx.try_recv() {
            Ok(SttOutbound::Audio(bytes)) => assert_eq!(bytes[0], tag),
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_manager_shutdown_delivers_close_after_queued_frames() {
    let (events_tx, _events_rx) = mpsc::channel(16);
    let mut manager = SttManager::new(manager_config(), events_tx);

    manager.send_audio(vec![7; 2]);
    let (tx, mut rx) = mpsc::channel(64);
    assert!(manager.on_opened(tx));

    match rx.recv().await {
        Some(SttOutbound::Audio(bytes)) => assert_eq!(bytes[0], 7),
        other => panic!("unexpected frame: {:?}", other),
    }

    manager.shutdown();

    // The queued Close survives teardown; the channel then ends cleanly
    assert!(matches!(rx.recv().await, Some(SttOutbound::Close)));
    assert!(rx.recv().await.is_none());
}
