//! Scenario: unfilled order timeouts.
//!
//! # Invariants under test
//!
//! 1. Base timeout not elapsed → `*_timeout_exceeded` not called, `Hold`.
//! 2. Entry cancel with nothing filled → `Aborted`.
//! 3. Entry cancel after a partial fill → `Open` with the filled amount.
//! 4. Exit cancel → back to `Open`; the position is still held.
//! 5. Default timeout answer is "keep waiting".
//! 6. A snapshot that is already fully filled is a fill, never a cancel:
//!    entry → `Open`, exit → `Closed`; the timeout hook is not consulted.

use std::sync::Arc;

use hkd_hooks::{Direction, HookKind, OrderContext, OrderSide};
use hkd_lifecycle::*;
use hkd_testkit::*;

fn scripted(script: HookScript) -> (StrategyHost, Arc<RecordingHooks<ScriptedStrategy>>) {
    let rec = Arc::new(RecordingHooks::new(ScriptedStrategy::new(script).unwrap()));
    (StrategyHost::new(rec.clone()).unwrap(), rec)
}

/// Trade with its entry order placed at `t0()`: 10 units at 10.0.
async fn awaiting_entry(host: &mut StrategyHost) -> (TradeLifecycle, OrderContext) {
    let token = host.begin_iteration(t0());
    let mut trade = TradeLifecycle::new("t1", "ETH/USDT", Direction::Long);
    trade
        .propose_entry(
            host,
            &token,
            EntryProposal::new(10.0, proposal(100.0, 50.0, 500.0).unwrap()),
        )
        .await
        .unwrap();
    let order = trade.open_order().unwrap().clone();
    (trade, order)
}

#[tokio::test]
async fn entry_hook_not_called_before_base_timeout() {
    let (mut host, rec) = scripted(HookScript {
        entry_timeout: Some(true),
        ..HookScript::default()
    });
    let (mut trade, order) = awaiting_entry(&mut host).await;

    let token = host.begin_iteration(ts(599));
    let ins = trade.poll_entry_order(&host, &token, order).unwrap();

    assert_eq!(ins, Instruction::Hold);
    assert!(!rec.was_called(HookKind::EntryTimeout));
    assert_eq!(trade.state(), LifecycleState::AwaitingEntryFill);
}

#[tokio::test]
async fn default_answer_keeps_waiting() {
    let (mut host, rec) = scripted(HookScript::default());
    let (mut trade, order) = awaiting_entry(&mut host).await;

    let token = host.begin_iteration(ts(600));
    let ins = trade.poll_entry_order(&host, &token, order).unwrap();

    assert_eq!(ins, Instruction::Hold);
    assert_eq!(rec.count(HookKind::EntryTimeout), 1);
    assert_eq!(trade.state(), LifecycleState::AwaitingEntryFill);
}

#[tokio::test]
async fn unfilled_entry_cancel_aborts() {
    let (mut host, _rec) = scripted(HookScript {
        entry_timeout: Some(true),
        ..HookScript::default()
    });
    let (mut trade, order) = awaiting_entry(&mut host).await;

    let token = host.begin_iteration(ts(900));
    let ins = trade.poll_entry_order(&host, &token, order).unwrap();

    assert_eq!(ins, Instruction::Cancel);
    assert_eq!(trade.state(), LifecycleState::Aborted);
    assert!(trade.open_order().is_none());
}

#[tokio::test]
async fn partially_filled_entry_cancel_opens_with_filled_amount() {
    let (mut host, _rec) = scripted(HookScript {
        entry_timeout: Some(true),
        ..HookScript::default()
    });
    let (mut trade, mut order) = awaiting_entry(&mut host).await;
    order.filled = 4.0;

    let token = host.begin_iteration(ts(900));
    let ins = trade.poll_entry_order(&host, &token, order).unwrap();

    assert_eq!(ins, Instruction::Cancel);
    assert_eq!(trade.state(), LifecycleState::Open);
    let t = trade.trade().unwrap();
    assert_eq!(t.amount, 4.0);
    assert_eq!(t.stake_amount, 40.0);
}

#[tokio::test]
async fn failing_timeout_hook_keeps_waiting() {
    let (mut host, _rec) = scripted(HookScript {
        entry_timeout: Some(true),
        panic: vec!["entry_timeout_exceeded".into()],
        ..HookScript::default()
    });
    let (mut trade, order) = awaiting_entry(&mut host).await;

    let token = host.begin_iteration(ts(900));
    let ins = trade.poll_entry_order(&host, &token, order).unwrap();

    assert_eq!(ins, Instruction::Hold);
    assert_eq!(trade.state(), LifecycleState::AwaitingEntryFill);
}

#[tokio::test]
async fn cancelled_exit_returns_trade_to_open() {
    let (mut host, rec) = scripted(HookScript {
        exit_timeout: Some(true),
        ..HookScript::default()
    });
    let (mut trade, order) = awaiting_entry(&mut host).await;
    trade.on_entry_filled(order.amount, order.rate).unwrap();

    let token = host.begin_iteration(ts(60));
    let ins = trade
        .evaluate_open(&host, &token, OpenTick::at_rate(11.0).with_roi(true))
        .await
        .unwrap();
    assert_eq!(trade.state(), LifecycleState::AwaitingExitFill);
    let exit_order = trade.open_order().unwrap().clone();
    assert_eq!(exit_order.side, OrderSide::Exit);
    assert_eq!(exit_order.order_id, ins.order().unwrap().client_order_id);

    let token = host.begin_iteration(ts(120));
    let early = trade
        .poll_exit_order(&host, &token, exit_order.clone())
        .unwrap();
    assert_eq!(early, Instruction::Hold);
    assert!(!rec.was_called(HookKind::ExitTimeout));

    let token = host.begin_iteration(ts(60 + 600));
    let ins = trade.poll_exit_order(&host, &token, exit_order).unwrap();

    assert_eq!(ins, Instruction::Cancel);
    assert_eq!(trade.state(), LifecycleState::Open);
    assert!(trade.exit_reason().is_none());
    assert_eq!(trade.trade().unwrap().amount, 10.0);
}

#[tokio::test]
async fn fully_filled_exit_snapshot_closes_the_trade() {
    let (mut host, rec) = scripted(HookScript {
        exit_timeout: Some(true),
        ..HookScript::default()
    });
    let (mut trade, order) = awaiting_entry(&mut host).await;
    trade.on_entry_filled(order.amount, order.rate).unwrap();

    let token = host.begin_iteration(ts(60));
    trade
        .evaluate_open(&host, &token, OpenTick::at_rate(11.0).with_roi(true))
        .await
        .unwrap();
    let mut exit_order = trade.open_order().unwrap().clone();
    exit_order.filled = exit_order.amount;

    let token = host.begin_iteration(ts(60 + 600));
    let ins = trade.poll_exit_order(&host, &token, exit_order).unwrap();

    assert_eq!(ins, Instruction::Hold);
    assert_eq!(trade.state(), LifecycleState::Closed);
    assert_eq!(trade.trade().unwrap().amount, 10.0);
    assert!(trade.open_order().is_none());
    assert!((trade.close_profit().unwrap() - 0.10).abs() < 1e-9);
    assert!(!rec.was_called(HookKind::ExitTimeout));

    let token = host.begin_iteration(ts(60 + 660));
    let err = trade
        .evaluate_open(&host, &token, OpenTick::at_rate(11.0))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Transition(_)));
}

#[tokio::test]
async fn fully_filled_entry_snapshot_opens_the_trade() {
    let (mut host, rec) = scripted(HookScript {
        entry_timeout: Some(true),
        ..HookScript::default()
    });
    let (mut trade, mut order) = awaiting_entry(&mut host).await;
    order.filled = order.amount;

    let token = host.begin_iteration(ts(900));
    let ins = trade.poll_entry_order(&host, &token, order).unwrap();

    assert_eq!(ins, Instruction::Hold);
    assert_eq!(trade.state(), LifecycleState::Open);
    assert_eq!(trade.trade().unwrap().amount, 10.0);
    assert!(!rec.was_called(HookKind::EntryTimeout));
}

#[tokio::test]
async fn polling_in_the_wrong_state_is_rejected() {
    let (mut host, rec) = scripted(HookScript::default());
    let (mut trade, order) = awaiting_entry(&mut host).await;

    let token = host.begin_iteration(ts(900));
    let err = trade.poll_exit_order(&host, &token, order).unwrap_err();

    assert!(matches!(err, LifecycleError::Transition(_)));
    assert_eq!(trade.state(), LifecycleState::AwaitingEntryFill);
    assert!(!rec.was_called(HookKind::ExitTimeout));
}
