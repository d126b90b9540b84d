//! The per-symbol tick pipeline and its state machine.
//!
//! ```text
//!   Idle    --start-->  Running
//!   Running --freeze--> Frozen   (sanitizer or risk guard)
//!   Frozen  --resume--> Running  (operator action)
//!   Running --stop--->  Stopped
//!   Frozen  --stop--->  Stopped
//! ```
//!
//! Run-to-completion per tick, no yield points. Write-ahead ordering is
//! enforced by call order inside this module: the WAL entry for an
//! effect is always appended before the effect is applied or published.

use crate::adapter::ExchangeAdapter;
use crate::bus::{Event, EventBus, Topic};
use crate::core::{
    Clock, DecisionOutcome, EngineError, OrderId, OrderIdSequence, ReasonCode, ReasonCodeTracker,
};
use crate::data::{GateAction, Sanitizer, SanitizerStats, Tick};
use crate::engine::EngineConfig;
use crate::fees::{FillEngine, FillResult, OrderRequest};
use crate::position::{Position, PositionBook};
use crate::risk::{DrbGuard, PortfolioSummary, RiskAction, RiskCheck};
use crate::strategy::{SignalManager, Strategy};
use crate::tca::{TcaAnalyzer, TcaSummary};
use crate::wal::{
    DecisionRecord, ErrorRecord, ExecutionRecord, RecoveredState, RiskCheckRecord,
    StateChangeRecord, TradePhase, WalEntry, WalEvent, WalLogger,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Engine lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Frozen,
    Stopped,
}

impl EngineState {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Running => "running",
            EngineState::Frozen => "frozen",
            EngineState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What one call to `process_tick` did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Engine was not Running; tick ignored.
    Ignored,
    /// Sanitizer or risk guard froze the engine on this tick.
    Frozen,
    /// Tick rejected as bad data.
    Rejected,
    /// Tick skipped (wide spread).
    Skipped,
    /// Nothing actionable this tick.
    NoAction,
    /// A signal was blocked by the risk guard.
    Blocked(ReasonCode),
    /// A position opened.
    Opened,
    /// A position closed with this realized P&L.
    Closed { realized_pnl: Decimal },
    /// An internal failure was contained.
    Errored,
}

/// Running counters for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub ticks_total: u64,
    pub ticks_valid: u64,
    pub ticks_rejected: u64,
    pub ticks_skipped: u64,
    pub freezes: u64,
    pub signals_generated: u64,
    pub orders_placed: u64,
    pub fills: u64,
    pub closes: u64,
    pub errors: u64,
}

/// Engine-side metadata for an open trade: who opened it and what the
/// entry cost, needed to settle attribution at close.
#[derive(Debug, Clone)]
struct OpenTrade {
    strategy_id: String,
    reason_code: ReasonCode,
    entry_fee: Decimal,
    #[allow(dead_code)]
    order_id: Option<OrderId>,
}

/// Simulated execution latency stamped on paper fills. Constant so a
/// replayed run is bit-identical.
const SIM_EXECUTION_MS: f64 = 0.0;

/// Consecutive contained failures before the engine gives up.
const MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// One engine instance: a single-threaded, run-to-completion pipeline
/// owning every mutable piece of per-symbol state. The WAL and event bus
/// are shared, injected surfaces; everything else is exclusive.
pub struct Engine {
    config: EngineConfig,
    state: EngineState,
    clock: Box<dyn Clock>,
    sanitizer: Sanitizer,
    book: PositionBook,
    guard: DrbGuard,
    fill_engine: FillEngine,
    tca: TcaAnalyzer,
    signals: SignalManager,
    reasons: ReasonCodeTracker,
    wal: Arc<WalLogger>,
    bus: Arc<EventBus>,
    adapter: Option<Box<dyn ExchangeAdapter>>,
    open_trades: HashMap<String, OpenTrade>,
    order_ids: OrderIdSequence,
    tick_seq: u64,
    state_seq: u64,
    consecutive_failures: u32,
    stats: EngineStats,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        wal: Arc<WalLogger>,
        bus: Arc<EventBus>,
        clock: Box<dyn Clock>,
    ) -> Result<Self, crate::core::ConfigError> {
        config.validate()?;

        let sanitizer = Sanitizer::new(config.sanitizer_config());
        let guard = DrbGuard::new(config.risk_limits());
        let fill_engine =
            FillEngine::new(config.exchange).with_crossing_spread_bps(config.crossing_spread_bps);
        let tca = TcaAnalyzer::new(config.exchange.fees());
        let book = PositionBook::new(config.max_hold_secs);

        info!(symbol = %config.symbol, exchange = %config.exchange, "engine initialized");
        Ok(Self {
            config,
            state: EngineState::Idle,
            clock,
            sanitizer,
            book,
            guard,
            fill_engine,
            tca,
            signals: SignalManager::new(),
            reasons: ReasonCodeTracker::new(),
            wal,
            bus,
            adapter: None,
            open_trades: HashMap::new(),
            order_ids: OrderIdSequence::new(),
            tick_seq: 0,
            state_seq: 0,
            consecutive_failures: 0,
            stats: EngineStats::default(),
        })
    }

    /// Route live orders through this adapter (`paper_trading = false`).
    pub fn with_adapter(mut self, adapter: Box<dyn ExchangeAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn register_strategy(&mut self, strategy: Box<dyn Strategy>, revenue_target: Decimal) {
        self.signals.register(strategy, revenue_target);
    }

    pub fn register_tick_size(&mut self, symbol: impl Into<String>, tick_size: Decimal) {
        self.sanitizer.register_tick_size(symbol, tick_size);
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn sanitizer_stats(&self) -> SanitizerStats {
        self.sanitizer.stats()
    }

    pub fn portfolio(&self) -> PortfolioSummary {
        self.guard.summary()
    }

    pub fn tca_summary(&self) -> TcaSummary {
        self.tca.summary()
    }

    pub fn reasons(&self) -> &ReasonCodeTracker {
        &self.reasons
    }

    pub fn signal_manager(&self) -> &SignalManager {
        &self.signals
    }

    pub fn open_position(&self) -> Option<&Position> {
        self.book.get(&self.config.symbol)
    }

    /// Restore state recovered from a WAL replay. Strategy buffers stay
    /// cold; they re-warm on live ticks before signalling again.
    pub fn restore(&mut self, recovered: RecoveredState) -> Result<(), EngineError> {
        self.guard
            .restore(recovered.realized_pnl, recovered.peak_equity);
        for item in recovered.open_positions {
            self.book.open(item.position.clone())?;
            self.guard.update_position(item.position.clone());
            self.open_trades.insert(
                item.position.symbol.clone(),
                OpenTrade {
                    strategy_id: item.strategy_id,
                    reason_code: item.reason_code,
                    entry_fee: item.entry_fee,
                    order_id: item.order_id,
                },
            );
        }
        info!(
            realized = %recovered.realized_pnl,
            open = self.book.len(),
            "engine state restored from wal"
        );
        Ok(())
    }

    /// Swap risk limits at runtime. The change is journaled before it
    /// takes effect.
    pub fn reconfigure_risk(
        &mut self,
        limits: crate::risk::RiskLimits,
        timestamp: f64,
    ) -> Result<(), EngineError> {
        limits
            .validate()
            .map_err(|e| EngineError::Invariant(e.to_string()))?;
        self.state_seq += 1;
        self.wal.append(&WalEntry {
            timestamp,
            event_id: format!("state_{:06}", self.state_seq),
            event: WalEvent::StateChange(StateChangeRecord {
                old_state: self.state.as_str().to_string(),
                new_state: self.state.as_str().to_string(),
            }),
            reason_code: Some(ReasonCode::SystemResume),
            reason_detail: Some("risk limits reconfigured".to_string()),
        })?;
        self.guard.reconfigure(limits);
        Ok(())
    }

    // --- lifecycle -------------------------------------------------------

    pub fn start(&mut self, timestamp: f64) -> Result<(), EngineError> {
        if self.state != EngineState::Idle {
            warn!(state = %self.state, "start ignored");
            return Ok(());
        }
        self.transition(
            timestamp,
            EngineState::Running,
            ReasonCode::SystemStartup,
            "engine started",
        )
    }

    pub fn resume(&mut self, timestamp: f64) -> Result<(), EngineError> {
        if self.state != EngineState::Frozen {
            warn!(state = %self.state, "resume ignored");
            return Ok(());
        }
        self.transition(
            timestamp,
            EngineState::Running,
            ReasonCode::SystemResume,
            "operator resume",
        )
    }

    pub fn stop(&mut self, timestamp: f64) -> Result<(), EngineError> {
        if self.state == EngineState::Stopped {
            return Ok(());
        }
        self.transition(
            timestamp,
            EngineState::Stopped,
            ReasonCode::SystemShutdown,
            "engine stopped",
        )
    }

    /// Journal and apply a state transition; the entry precedes the new
    /// state becoming visible.
    fn transition(
        &mut self,
        timestamp: f64,
        new_state: EngineState,
        code: ReasonCode,
        detail: &str,
    ) -> Result<(), EngineError> {
        let old_state = self.state;
        self.state_seq += 1;
        let event_id = format!("state_{:06}", self.state_seq);

        self.wal.append(&WalEntry {
            timestamp,
            event_id: event_id.clone(),
            event: WalEvent::StateChange(StateChangeRecord {
                old_state: old_state.as_str().to_string(),
                new_state: new_state.as_str().to_string(),
            }),
            reason_code: Some(code),
            reason_detail: Some(detail.to_string()),
        })?;

        self.state = new_state;
        if new_state == EngineState::Frozen {
            self.stats.freezes += 1;
        }

        self.publish(
            Topic::StateChange,
            &event_id,
            timestamp,
            json!({
                "old_state": old_state.as_str(),
                "new_state": new_state.as_str(),
                "reason": detail,
            }),
        );
        info!(from = %old_state, to = %new_state, detail, "state transition");
        Ok(())
    }

    fn freeze(&mut self, timestamp: f64, detail: &str) -> Result<(), EngineError> {
        if self.state == EngineState::Frozen {
            return Ok(());
        }
        self.transition(timestamp, EngineState::Frozen, ReasonCode::SystemFreeze, detail)
    }

    // --- tick pipeline ---------------------------------------------------

    /// Feed one tick through the pipeline. Never panics across this
    /// boundary: internal failures are contained, journaled and counted,
    /// and repeated failure stops the engine.
    pub fn process_tick(&mut self, tick: &Tick) -> TickOutcome {
        self.stats.ticks_total += 1;
        if self.state != EngineState::Running {
            debug!(state = %self.state, "tick ignored");
            return TickOutcome::Ignored;
        }

        match self.tick_inner(tick) {
            Ok(outcome) => {
                self.consecutive_failures = 0;
                outcome
            }
            Err(e) => self.contain_failure(tick, e),
        }
    }

    fn tick_inner(&mut self, tick: &Tick) -> Result<TickOutcome, EngineError> {
        let ts = tick.local_timestamp;
        self.tick_seq += 1;
        let tick_id = format!("tick_{:06}", self.tick_seq);

        // 1. Market data onto the bus.
        self.publish(
            Topic::MarketData,
            &tick_id,
            ts,
            serde_json::to_value(tick).unwrap_or_default(),
        );

        // 2. Layer-0 gate. The clock is consulted only when staleness is
        // enabled; backtests never read it.
        let now = if self.config.max_data_age_sec.is_some() {
            self.clock.now()
        } else {
            ts
        };
        let verdict = self.sanitizer.validate(tick, now);
        match verdict.action {
            GateAction::Allow => self.stats.ticks_valid += 1,
            GateAction::Skip => {
                self.stats.ticks_skipped += 1;
                if let Some(code) = verdict.reason {
                    self.reasons.record(code, DecisionOutcome::Blocked, None);
                }
                return Ok(TickOutcome::Skipped);
            }
            GateAction::Reject => {
                self.stats.ticks_rejected += 1;
                if let Some(code) = verdict.reason {
                    self.reasons.record(code, DecisionOutcome::Blocked, None);
                }
                return Ok(TickOutcome::Rejected);
            }
            GateAction::Freeze => {
                let code = verdict.reason.unwrap_or(ReasonCode::ErrorUnknown);
                self.reasons.record(code, DecisionOutcome::Blocked, None);
                // Freeze-class input failures get a journaled error
                // entry before the state change.
                self.wal.append(&WalEntry {
                    timestamp: ts,
                    event_id: tick_id.clone(),
                    event: WalEvent::Error(ErrorRecord {
                        error_type: code.as_str().to_string(),
                        message: verdict.detail.clone(),
                    }),
                    reason_code: Some(code),
                    reason_detail: Some(verdict.detail.clone()),
                })?;
                self.publish(
                    Topic::Error,
                    &tick_id,
                    ts,
                    json!({"reason": code.as_str(), "detail": verdict.detail.clone()}),
                );
                self.freeze(ts, &verdict.detail)?;
                return Ok(TickOutcome::Frozen);
            }
        }

        let symbol = tick.symbol.clone();
        let mid = tick.mid();

        // 3. Manage the open position, if any: mark, exit, risk-direct.
        if self.book.contains(&symbol) {
            if let Some(position) = self.book.mark_to_market(&symbol, mid) {
                let snapshot = position.clone();
                self.guard.update_position(snapshot);
            }

            if let Some(exit) = self.book.check_exit(&symbol, mid, ts) {
                return self.close_position(tick, exit.to_string());
            }

            let check = self.guard.check();
            if check.action != RiskAction::Allow {
                let risk_id = format!("risk_{:06}", self.tick_seq);
                self.wal_risk_check(&risk_id, ts, &check)?;
                self.publish(Topic::RiskCheck, &risk_id, ts, risk_payload(&check));

                match check.action {
                    RiskAction::Freeze => {
                        self.reasons
                            .record(check.reason_code, DecisionOutcome::Blocked, None);
                        self.freeze(ts, &check.reason)?;
                        return Ok(TickOutcome::Frozen);
                    }
                    RiskAction::Close => {
                        return self.close_position(tick, check.reason.clone());
                    }
                    RiskAction::Reduce => {
                        warn!(reason = %check.reason, "risk guard directs reduce; holding entries");
                        return Ok(TickOutcome::NoAction);
                    }
                    RiskAction::Warn | RiskAction::Allow => {}
                }
            }

            // Position survived the tick; entries wait for flat.
            return Ok(TickOutcome::NoAction);
        }

        // 4-5. Flat: ask the strategies.
        let candidates = self.signals.collect(tick);
        if candidates.is_empty() {
            return Ok(TickOutcome::NoAction);
        }
        self.stats.signals_generated += candidates.len() as u64;

        let Some(signal) = self.signals.select_best(candidates) else {
            return Ok(TickOutcome::NoAction);
        };
        self.publish(
            Topic::Signal,
            &tick_id,
            ts,
            serde_json::to_value(&signal).unwrap_or_default(),
        );

        // 6. Risk admission on a hypothetical snapshot.
        let candidate = Position {
            symbol: symbol.clone(),
            side: signal.side.position_side(),
            size: signal.size,
            entry_price: signal.entry_price,
            current_price: signal.entry_price,
            opened_at: ts,
            take_profit_pct: signal.take_profit_pct(),
            stop_loss_pct: signal.stop_loss_pct(),
        };
        let check = self.guard.admit(candidate);
        let risk_id = format!("risk_{:06}", self.tick_seq);
        self.wal_risk_check(&risk_id, ts, &check)?;
        self.publish(Topic::RiskCheck, &risk_id, ts, risk_payload(&check));

        if !check.action.admits_entry() {
            self.reasons
                .record(check.reason_code, DecisionOutcome::Blocked, None);
            if check.action == RiskAction::Freeze {
                self.freeze(ts, &check.reason)?;
                return Ok(TickOutcome::Frozen);
            }
            debug!(action = %check.action, reason = %check.reason, "signal blocked");
            return Ok(TickOutcome::Blocked(check.reason_code));
        }

        // Final duplicate gate before anything is journaled.
        if self.book.contains(&symbol) {
            self.reasons
                .record(ReasonCode::SignalDuplicate, DecisionOutcome::Blocked, None);
            return Ok(TickOutcome::Blocked(ReasonCode::SignalDuplicate));
        }

        // 7. Decide, fill, apply, publish - WAL first at every step.
        let order_id = self.order_ids.next_id();
        let order = OrderRequest::market(order_id, symbol.clone(), signal.side, signal.size);
        let reference = signal.entry_price;

        self.tca.estimate(&order, reference, ts);

        self.wal.append(&WalEntry {
            timestamp: ts,
            event_id: order_id.to_string(),
            event: WalEvent::Decision(DecisionRecord {
                symbol: symbol.clone(),
                side: signal.side,
                order_type: order.order_type,
                size: signal.size,
                price: reference,
                confidence: signal.confidence,
                strategy_id: signal.strategy_id.clone(),
            }),
            reason_code: Some(signal.reason_code),
            reason_detail: Some(signal.reason_detail.clone()),
        })?;
        self.publish(
            Topic::Decision,
            &order_id.to_string(),
            ts,
            serde_json::to_value(&order).unwrap_or_default(),
        );

        let Some(fill) = self.execute_gated(&order, reference, tick, ts)? else {
            return Ok(TickOutcome::Frozen);
        };
        self.stats.orders_placed += 1;

        self.wal.append(&WalEntry {
            timestamp: ts,
            event_id: order_id.to_string(),
            event: WalEvent::Execution(ExecutionRecord {
                symbol: symbol.clone(),
                side: fill.side,
                phase: TradePhase::Open,
                fill_price: fill.fill_price,
                size: fill.size,
                fee_cash: fill.fee_cash,
                slippage_bps: fill.slippage_bps,
                is_maker: fill.is_maker,
                take_profit_pct: Some(signal.take_profit_pct()),
                stop_loss_pct: Some(signal.stop_loss_pct()),
                realized_pnl: None,
            }),
            reason_code: None,
            reason_detail: None,
        })?;

        self.tca.measure(
            order_id,
            fill.fill_price,
            fill.size,
            fill.fee_cash,
            fill.execution_ms,
            ts,
        );

        let position = Position {
            symbol: symbol.clone(),
            side: fill.side.position_side(),
            size: fill.size,
            entry_price: fill.fill_price,
            current_price: fill.fill_price,
            opened_at: ts,
            take_profit_pct: signal.take_profit_pct(),
            stop_loss_pct: signal.stop_loss_pct(),
        };
        self.book.open(position.clone())?;
        self.guard.update_position(position.clone());
        self.open_trades.insert(
            symbol.clone(),
            OpenTrade {
                strategy_id: signal.strategy_id.clone(),
                reason_code: signal.reason_code,
                entry_fee: fill.fee_cash,
                order_id: Some(order_id),
            },
        );
        self.reasons
            .record(signal.reason_code, DecisionOutcome::Pending, None);
        self.stats.fills += 1;

        self.publish(
            Topic::Fill,
            &order_id.to_string(),
            ts,
            serde_json::to_value(&fill).unwrap_or_default(),
        );
        self.publish(
            Topic::Position,
            &order_id.to_string(),
            ts,
            serde_json::to_value(&position).unwrap_or_default(),
        );

        info!(%fill, strategy = %signal.strategy_id, "position opened");
        Ok(TickOutcome::Opened)
    }

    /// Close the open position at the current market. The execution
    /// entry, carrying the realized P&L, precedes every mutation.
    fn close_position(&mut self, tick: &Tick, detail: String) -> Result<TickOutcome, EngineError> {
        let ts = tick.local_timestamp;
        let symbol = tick.symbol.clone();
        let position = self
            .book
            .get(&symbol)
            .cloned()
            .ok_or_else(|| EngineError::Invariant(format!("close without position: {symbol}")))?;

        let order_id = self.order_ids.next_id();
        let order = OrderRequest::market(
            order_id,
            symbol.clone(),
            position.side.closing_side(),
            position.size,
        );
        let reference = tick.mid();

        self.tca.estimate(&order, reference, ts);

        let Some(fill) = self.execute_gated(&order, reference, tick, ts)? else {
            return Ok(TickOutcome::Frozen);
        };
        self.stats.orders_placed += 1;

        let gross =
            position.side.signum() * (fill.fill_price - position.entry_price) * position.size;
        let trade_meta = self.open_trades.remove(&symbol);
        let entry_fee = trade_meta
            .as_ref()
            .map(|m| m.entry_fee)
            .unwrap_or_default();
        let realized = gross - entry_fee - fill.fee_cash;

        self.wal.append(&WalEntry {
            timestamp: ts,
            event_id: order_id.to_string(),
            event: WalEvent::Execution(ExecutionRecord {
                symbol: symbol.clone(),
                side: fill.side,
                phase: TradePhase::Close,
                fill_price: fill.fill_price,
                size: fill.size,
                fee_cash: fill.fee_cash,
                slippage_bps: fill.slippage_bps,
                is_maker: fill.is_maker,
                take_profit_pct: None,
                stop_loss_pct: None,
                realized_pnl: Some(realized),
            }),
            reason_code: None,
            reason_detail: Some(detail.clone()),
        })?;

        self.book.close(&symbol, fill.fill_price);
        self.guard.remove_position(&symbol, realized);

        self.tca.measure(
            order_id,
            fill.fill_price,
            fill.size,
            fill.fee_cash,
            fill.execution_ms,
            ts,
        );

        if let Some(meta) = trade_meta {
            self.signals.record_trade_result(&meta.strategy_id, realized);
            self.reasons.resolve(meta.reason_code, realized);
        }
        self.stats.fills += 1;
        self.stats.closes += 1;

        self.publish(
            Topic::Fill,
            &order_id.to_string(),
            ts,
            serde_json::to_value(&fill).unwrap_or_default(),
        );
        self.publish(
            Topic::Position,
            &order_id.to_string(),
            ts,
            json!({
                "symbol": symbol,
                "status": "closed",
                "exit_price": fill.fill_price.to_string(),
                "realized_pnl": realized.to_string(),
                "detail": detail,
            }),
        );

        info!(%symbol, %realized, detail, "position closed");
        Ok(TickOutcome::Closed {
            realized_pnl: realized,
        })
    }

    /// Route an order through the simulator or the live adapter. Adapter
    /// failures journal an error and freeze the engine (a decision may
    /// already be on disk with no matching execution), yielding `None`.
    fn execute_gated(
        &mut self,
        order: &OrderRequest,
        reference: Decimal,
        tick: &Tick,
        ts: f64,
    ) -> Result<Option<FillResult>, EngineError> {
        if self.config.paper_trading {
            let fill = self.fill_engine.simulate_fill(
                order,
                reference,
                tick.depth.as_ref(),
                SIM_EXECUTION_MS,
                ts,
            )?;
            return Ok(Some(fill));
        }

        let Some(adapter) = self.adapter.as_mut() else {
            return Err(EngineError::Adapter(
                "live mode configured without an adapter".to_string(),
            ));
        };
        match adapter.place_order(order, reference) {
            Ok(fill) => Ok(Some(fill)),
            Err(e) => {
                let message = e.to_string();
                error!(order = %order.client_id, error = %message, "adapter order failed");
                self.wal.append(&WalEntry {
                    timestamp: ts,
                    event_id: order.client_id.to_string(),
                    event: WalEvent::Error(ErrorRecord {
                        error_type: ReasonCode::ErrorExecutionFailed.as_str().to_string(),
                        message: message.clone(),
                    }),
                    reason_code: Some(ReasonCode::ErrorExecutionFailed),
                    reason_detail: Some(message.clone()),
                })?;
                self.publish(
                    Topic::Error,
                    &order.client_id.to_string(),
                    ts,
                    json!({"reason": "ERROR_EXECUTION_FAILED", "detail": message}),
                );
                self.freeze(ts, &message)?;
                Ok(None)
            }
        }
    }

    /// Contain an internal failure: journal it, count it, and stop the
    /// engine after repeated failures. No error crosses `process_tick`.
    fn contain_failure(&mut self, tick: &Tick, error: EngineError) -> TickOutcome {
        let ts = tick.local_timestamp;
        self.stats.errors += 1;
        self.consecutive_failures += 1;
        error!(
            error = %error,
            consecutive = self.consecutive_failures,
            "tick pipeline failure contained"
        );

        let entry = WalEntry {
            timestamp: ts,
            event_id: format!("error_{:06}", self.stats.errors),
            event: WalEvent::Error(ErrorRecord {
                error_type: ReasonCode::ErrorUnknown.as_str().to_string(),
                message: error.to_string(),
            }),
            reason_code: Some(ReasonCode::ErrorUnknown),
            reason_detail: Some(error.to_string()),
        };
        if let Err(wal_err) = self.wal.append(&entry) {
            error!(error = %wal_err, "failed to journal pipeline error");
        }
        self.publish(
            Topic::Error,
            &entry.event_id,
            ts,
            json!({"reason": "ERROR_UNKNOWN", "detail": error.to_string()}),
        );

        if self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
            error!(
                failures = self.consecutive_failures,
                "repeated pipeline failures; stopping engine"
            );
            if let Err(e) = self.stop(ts) {
                error!(error = %e, "failed to journal stop transition");
                self.state = EngineState::Stopped;
            }
        }
        TickOutcome::Errored
    }

    fn wal_risk_check(
        &self,
        event_id: &str,
        ts: f64,
        check: &RiskCheck,
    ) -> Result<(), EngineError> {
        self.wal.append(&WalEntry {
            timestamp: ts,
            event_id: event_id.to_string(),
            event: WalEvent::RiskCheck(RiskCheckRecord {
                action: check.action.as_str().to_string(),
                current_risk: check.current_risk,
                limit: check.limit,
                utilization_pct: check.utilization_pct,
            }),
            reason_code: Some(check.reason_code),
            reason_detail: Some(check.reason.clone()),
        })?;
        Ok(())
    }

    fn publish(&self, topic: Topic, event_id: &str, timestamp: f64, payload: serde_json::Value) {
        self.bus.publish(Event {
            topic,
            event_id: event_id.to_string(),
            timestamp,
            payload,
        });
    }
}

fn risk_payload(check: &RiskCheck) -> serde_json::Value {
    json!({
        "action": check.action.as_str(),
        "reason_code": check.reason_code.as_str(),
        "reason": check.reason,
        "current_risk": check.current_risk.to_string(),
        "limit": check.limit.to_string(),
        "utilization_pct": check.utilization_pct,
    })
}
