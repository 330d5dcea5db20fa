//! End-to-end polling loop scenarios.

use std::sync::Arc;
use std::time::Duration;

use epoch_trader::engine::{GateConfig, PollConfig, TraderAgent};
use epoch_trader::registry::FeedRegistry;
use epoch_trader::storage::EpochHistoryStore;
use epoch_trader::strategy::DryRunStrategy;
use epoch_trader::types::{AgentError, Block, Decision, Feed, Prediction};

use crate::mock_chain::{temp_cache_dir, MockChain, RecordingStrategy};

fn gate_config() -> GateConfig {
    GateConfig {
        min_buffer_secs: 20,
        prediction_attempts: 2,
        retry_delay: Duration::ZERO,
    }
}

fn agent_with(feeds: Vec<Feed>, chain: &MockChain, strategy: &RecordingStrategy) -> TraderAgent {
    let registry = FeedRegistry::new(feeds);
    let history = EpochHistoryStore::open(temp_cache_dir(), 8, registry.addresses());
    TraderAgent::new(
        registry,
        Arc::new(chain.clone()),
        Arc::new(strategy.clone()),
        history,
        gate_config(),
        PollConfig::default(),
    )
    .unwrap()
}

fn cleanup(agent: &TraderAgent) {
    let _ = std::fs::remove_dir_all(agent.history().dir());
}

#[test]
fn no_feeds_is_fatal() {
    let result = TraderAgent::new(
        FeedRegistry::new(Vec::new()),
        Arc::new(MockChain::new()),
        Arc::new(DryRunStrategy),
        EpochHistoryStore::new(temp_cache_dir(), 8),
        gate_config(),
        PollConfig::default(),
    );
    let err = result.err().expect("agent without feeds must not start");
    assert!(matches!(err, AgentError::NoFeeds));
    assert_eq!(err.to_string(), "No feeds configured, nothing to trade");
}

#[tokio::test]
async fn single_iteration_trades_every_feed_once() {
    let chain = MockChain::new();
    let strategy = RecordingStrategy::new();
    chain.set_block(80);
    chain.set_epoch("0x1", 1);
    chain.set_epoch("0x2", 1);
    chain.set_prediction("0x2", Prediction::new(3, 4));

    let mut agent = agent_with(
        vec![Feed::new("0x1", "BTC", 60), Feed::new("0x2", "ETH", 60)],
        &chain,
        &strategy,
    );
    agent.run(true).await.unwrap();

    assert_eq!(strategy.calls_for("0x1"), 1);
    assert_eq!(strategy.calls_for("0x2"), 1);
    assert!(strategy.calls().contains(&("0x2".to_string(), Prediction::new(3, 4))));
    assert_eq!(agent.history().epochs("0x1"), vec![1]);
    assert_eq!(agent.history().epochs("0x2"), vec![1]);
    cleanup(&agent);
}

#[tokio::test]
async fn repeated_polls_within_epoch_trade_once() {
    let chain = MockChain::new();
    let strategy = RecordingStrategy::new();
    chain.set_epoch("0x1", 1);

    let mut agent = agent_with(vec![Feed::new("0x1", "BTC", 60)], &chain, &strategy);

    for ts in [61, 70, 80, 95] {
        chain.set_block(ts);
        agent.take_step().await;
    }

    assert_eq!(strategy.calls_for("0x1"), 1);
    assert_eq!(agent.history().len("0x1"), 1);
    cleanup(&agent);
}

#[tokio::test]
async fn epoch_walkthrough_reports_remaining_time() {
    let chain = MockChain::new();
    let strategy = RecordingStrategy::new();
    chain.set_epoch("0x123", 1);

    let mut agent = agent_with(vec![Feed::new("0x123", "test feed", 60)], &chain, &strategy);
    let gate = agent.gate_mut();

    let eval = gate.evaluate("0x123", &Block::new(55, 55)).await.unwrap();
    assert_eq!((eval.seconds_left, eval.decision), (5, Decision::TooLate));
    assert_eq!(gate.history().len("0x123"), 0);

    let eval = gate.evaluate("0x123", &Block::new(80, 80)).await.unwrap();
    assert_eq!((eval.seconds_left, eval.decision), (40, Decision::Traded { epoch: 1 }));
    assert_eq!(gate.history().len("0x123"), 1);

    let eval = gate.evaluate("0x123", &Block::new(80, 80)).await.unwrap();
    assert_eq!(eval.seconds_left, 40);
    assert_eq!(gate.history().len("0x123"), 1);

    chain.set_epoch("0x123", 2);
    let eval = gate.evaluate("0x123", &Block::new(140, 140)).await.unwrap();
    assert_eq!(eval.seconds_left, 40);
    assert_eq!(gate.history().len("0x123"), 2);

    // prediction source down: no trade, history untouched
    chain.set_epoch("0x123", 3);
    chain.fail_predictions("0x123");
    let eval = gate.evaluate("0x123", &Block::new(20, 20)).await.unwrap();
    assert_eq!(eval.seconds_left, 40);
    assert!(eval.decision.is_retryable());
    assert_eq!(gate.history().len("0x123"), 2);

    // recovered within the same epoch: the retry trades
    chain.clear_errors();
    let eval = gate.evaluate("0x123", &Block::new(25, 25)).await.unwrap();
    assert_eq!(eval.decision, Decision::Traded { epoch: 3 });
    assert_eq!(strategy.calls_for("0x123"), 3);
    cleanup(&agent);
}

#[tokio::test]
async fn failing_feed_does_not_block_others() {
    let chain = MockChain::new();
    let strategy = RecordingStrategy::new();
    chain.set_block(80);
    chain.set_epoch("0x1", 1);
    chain.set_epoch("0x2", 1);
    chain.fail_predictions("0x1");

    let mut agent = agent_with(
        vec![Feed::new("0x1", "BTC", 60), Feed::new("0x2", "ETH", 60)],
        &chain,
        &strategy,
    );
    let report = agent.take_step().await;

    assert_eq!(report.evaluations.len(), 2);
    assert_eq!(report.trades(), 1);
    assert_eq!(strategy.calls_for("0x1"), 0);
    assert_eq!(strategy.calls_for("0x2"), 1);
    assert_eq!(agent.history().len("0x1"), 0);
    // two attempts for the failing feed, one for the healthy one
    assert_eq!(chain.prediction_calls(), 3);
    // failed feed is re-polled promptly
    assert_eq!(report.sleep, PollConfig::default().floor);
    cleanup(&agent);
}

#[tokio::test]
async fn head_failure_skips_iteration() {
    let chain = MockChain::new();
    let strategy = RecordingStrategy::new();
    chain.set_epoch("0x1", 1);
    chain.fail_head("connection reset");

    let mut agent = agent_with(vec![Feed::new("0x1", "BTC", 60)], &chain, &strategy);
    let report = agent.take_step().await;

    assert!(report.block.is_none());
    assert!(report.evaluations.is_empty());
    assert!(strategy.calls().is_empty());

    chain.clear_errors();
    chain.set_block(80);
    let report = agent.take_step().await;
    assert_eq!(report.trades(), 1);
    cleanup(&agent);
}

#[tokio::test]
async fn strategy_error_marks_epoch_traded() {
    let chain = MockChain::new();
    let strategy = RecordingStrategy::new();
    strategy.set_error("order rejected");
    chain.set_block(80);
    chain.set_epoch("0x1", 5);

    let mut agent = agent_with(vec![Feed::new("0x1", "BTC", 60)], &chain, &strategy);
    let report = agent.take_step().await;

    let (_, eval) = &report.evaluations[0];
    assert!(matches!(eval.decision, Decision::StrategyFailed { epoch: 5, .. }));
    assert_eq!(agent.history().epochs("0x1"), vec![5]);

    agent.take_step().await;
    assert_eq!(strategy.calls_for("0x1"), 1);
    cleanup(&agent);
}

#[tokio::test]
async fn sleep_targets_next_boundary() {
    let chain = MockChain::new();
    let strategy = RecordingStrategy::new();
    chain.set_block(80);
    chain.set_epoch("0x1", 1);
    chain.set_epoch("0x2", 1);

    let mut agent = agent_with(
        vec![Feed::new("0x1", "1m", 60), Feed::new("0x2", "5m", 300)],
        &chain,
        &strategy,
    );
    let report = agent.take_step().await;

    // 40s left on the 1m feed, 220s on the 5m feed
    assert_eq!(report.sleep, Duration::from_secs(40));
    cleanup(&agent);
}

#[tokio::test]
async fn shutdown_stops_loop_and_saves() {
    let chain = MockChain::new();
    let strategy = RecordingStrategy::new();
    chain.set_block(80);
    chain.set_epoch("0x1", 1);

    let mut agent = agent_with(vec![Feed::new("0x1", "BTC", 60)], &chain, &strategy);
    agent.run_until(false, async {}).await.unwrap();

    assert_eq!(strategy.calls_for("0x1"), 1);
    assert!(agent.history().dir().join("0x1.json").exists());
    cleanup(&agent);
}

#[tokio::test(start_paused = true)]
async fn slow_prediction_past_buffer_does_not_trade() {
    let chain = MockChain::new();
    let strategy = RecordingStrategy::new();
    chain.set_block(35);
    chain.set_epoch("0x1", 1);
    chain.set_prediction_delay(Duration::from_secs(10));

    let mut agent = agent_with(vec![Feed::new("0x1", "BTC", 60)], &chain, &strategy);
    let eval = agent
        .gate_mut()
        .evaluate("0x1", &Block::new(35, 35))
        .await
        .unwrap();

    assert_eq!(eval.seconds_left, 15);
    assert_eq!(eval.decision, Decision::TooLate);
    assert_eq!(chain.prediction_calls(), 1);
    assert_eq!(strategy.calls_for("0x1"), 0);
    assert_eq!(agent.history().len("0x1"), 0);
    cleanup(&agent);
}
