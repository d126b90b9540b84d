//! Write-ahead decision log.
//!
//! Every decision is appended here *before* its effect becomes
//! observable: a `decision` precedes the simulated fill, an `execution`
//! precedes the position-book mutation, a `state_change` precedes the
//! new state being visible to the next tick.
//!
//! On-disk format is UTF-8 JSONL, one entry per line, flushed at entry
//! boundaries so a crash loses at most the in-flight line. Rotation is
//! atomic: close, rename with a timestamp, open fresh.

use crate::core::{OrderId, OrderType, PositionSide, ReasonCode, Side, WalError};
use crate::position::Position;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Whether an execution opened or closed a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradePhase {
    Open,
    Close,
}

/// Payload of a `decision` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub size: Decimal,
    pub price: Decimal,
    pub confidence: f64,
    pub strategy_id: String,
}

/// Payload of an `execution` entry. Open executions carry enough to
/// rebuild the position on replay; close executions carry the realized
/// P&L they locked in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub symbol: String,
    pub side: Side,
    pub phase: TradePhase,
    pub fill_price: Decimal,
    pub size: Decimal,
    pub fee_cash: Decimal,
    pub slippage_bps: Decimal,
    pub is_maker: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit_pct: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss_pct: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realized_pnl: Option<Decimal>,
}

/// Payload of a `risk_check` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskCheckRecord {
    pub action: String,
    pub current_risk: Decimal,
    pub limit: Decimal,
    pub utilization_pct: f64,
}

/// Payload of a `state_change` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangeRecord {
    pub old_state: String,
    pub new_state: String,
}

/// Payload of an `error` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error_type: String,
    pub message: String,
}

/// The tagged union of everything the WAL records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "data", rename_all = "snake_case")]
pub enum WalEvent {
    Decision(DecisionRecord),
    Execution(ExecutionRecord),
    RiskCheck(RiskCheckRecord),
    StateChange(StateChangeRecord),
    Error(ErrorRecord),
}

/// One WAL line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    pub timestamp: f64,
    pub event_id: String,
    #[serde(flatten)]
    pub event: WalEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<ReasonCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_detail: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalStats {
    pub entries_written: u64,
    pub bytes_written: u64,
}

struct WalWriter {
    file: File,
    bytes_in_file: u64,
    stats: WalStats,
}

/// Append-only logger. A single writer lock serializes appends; each
/// entry is flushed before `append` returns.
pub struct WalLogger {
    path: PathBuf,
    max_file_bytes: u64,
    inner: Mutex<WalWriter>,
}

impl WalLogger {
    pub fn new(path: impl Into<PathBuf>, max_file_size_mb: u64) -> Result<Self, WalError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let bytes_in_file = file.metadata()?.len();

        info!(path = %path.display(), "wal logger initialized");
        Ok(Self {
            path,
            max_file_bytes: max_file_size_mb.saturating_mul(1024 * 1024),
            inner: Mutex::new(WalWriter {
                file,
                bytes_in_file,
                stats: WalStats::default(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry and flush it to disk.
    pub fn append(&self, entry: &WalEntry) -> Result<(), WalError> {
        let line = serde_json::to_string(entry)?;

        let mut writer = self.inner.lock();
        writer.file.write_all(line.as_bytes())?;
        writer.file.write_all(b"\n")?;
        writer.file.flush()?;

        let written = line.len() as u64 + 1;
        writer.bytes_in_file += written;
        writer.stats.entries_written += 1;
        writer.stats.bytes_written += written;

        if self.max_file_bytes > 0 && writer.bytes_in_file >= self.max_file_bytes {
            self.rotate(&mut writer)?;
        }
        Ok(())
    }

    /// Close the current file, rename it aside with a timestamp, and
    /// open a fresh one.
    fn rotate(&self, writer: &mut WalWriter) -> Result<(), WalError> {
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "wal".to_string());
        let archive = self.path.with_file_name(format!("{stem}_{stamp}.jsonl"));

        writer.file.flush()?;
        std::fs::rename(&self.path, &archive)?;
        writer.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writer.bytes_in_file = 0;

        info!(archive = %archive.display(), "wal rotated");
        Ok(())
    }

    pub fn stats(&self) -> WalStats {
        self.inner.lock().stats
    }
}

/// Read a WAL file back. Malformed lines are skipped with a warning so a
/// torn final line from a crash never blocks recovery.
pub fn replay(path: &Path) -> Result<Vec<WalEntry>, WalError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<WalEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(line = idx + 1, error = %e, "skipping malformed wal line"),
        }
    }

    info!(path = %path.display(), entries = entries.len(), "wal replayed");
    Ok(entries)
}

/// A position reconstructed from the log, with the metadata the engine
/// needs to keep managing it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredPosition {
    pub position: Position,
    pub entry_fee: Decimal,
    pub strategy_id: String,
    pub reason_code: ReasonCode,
    pub order_id: Option<OrderId>,
}

/// Engine state rebuilt from a replayed WAL: realized P&L, the equity
/// high-water mark, and the positions whose open execution never saw a
/// matching close.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredState {
    pub realized_pnl: Decimal,
    pub peak_equity: Decimal,
    pub open_positions: Vec<RecoveredPosition>,
}

impl RecoveredState {
    pub fn from_entries(entries: &[WalEntry], initial_capital: Decimal) -> Self {
        let mut realized_pnl = Decimal::ZERO;
        let mut peak_equity = initial_capital;
        let mut open: HashMap<String, RecoveredPosition> = HashMap::new();
        // Decisions carry the strategy attribution for the execution
        // that shares their event id.
        let mut decision_meta: HashMap<String, (String, Option<ReasonCode>)> = HashMap::new();

        for entry in entries {
            match &entry.event {
                WalEvent::Decision(decision) => {
                    decision_meta.insert(
                        entry.event_id.clone(),
                        (decision.strategy_id.clone(), entry.reason_code),
                    );
                }
                WalEvent::Execution(execution) => match execution.phase {
                    TradePhase::Open => {
                        let (strategy_id, reason_code) = decision_meta
                            .get(&entry.event_id)
                            .cloned()
                            .unwrap_or_else(|| ("unknown".to_string(), None));
                        let position = Position {
                            symbol: execution.symbol.clone(),
                            side: position_side_for(execution.side),
                            size: execution.size,
                            entry_price: execution.fill_price,
                            current_price: execution.fill_price,
                            opened_at: entry.timestamp,
                            take_profit_pct: execution.take_profit_pct.unwrap_or_default(),
                            stop_loss_pct: execution.stop_loss_pct.unwrap_or_default(),
                        };
                        open.insert(
                            execution.symbol.clone(),
                            RecoveredPosition {
                                position,
                                entry_fee: execution.fee_cash,
                                strategy_id,
                                reason_code: reason_code.unwrap_or(ReasonCode::SignalMedium),
                                order_id: None,
                            },
                        );
                    }
                    TradePhase::Close => {
                        open.remove(&execution.symbol);
                        if let Some(pnl) = execution.realized_pnl {
                            realized_pnl += pnl;
                            peak_equity = peak_equity.max(initial_capital + realized_pnl);
                        }
                    }
                },
                _ => {}
            }
        }

        let mut open_positions: Vec<_> = open.into_values().collect();
        open_positions.sort_by(|a, b| a.position.symbol.cmp(&b.position.symbol));

        Self {
            realized_pnl,
            peak_equity,
            open_positions,
        }
    }
}

fn position_side_for(side: Side) -> PositionSide {
    side.position_side()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn decision_entry(event_id: &str, ts: f64) -> WalEntry {
        WalEntry {
            timestamp: ts,
            event_id: event_id.to_string(),
            event: WalEvent::Decision(DecisionRecord {
                symbol: "BTC/USDT".into(),
                side: Side::Buy,
                order_type: OrderType::Market,
                size: dec!(0.01),
                price: dec!(93500),
                confidence: 0.8,
                strategy_id: "liquidation_hunter".into(),
            }),
            reason_code: Some(ReasonCode::SignalLiquidation),
            reason_detail: Some("cluster below".into()),
        }
    }

    fn open_entry(event_id: &str, ts: f64) -> WalEntry {
        WalEntry {
            timestamp: ts,
            event_id: event_id.to_string(),
            event: WalEvent::Execution(ExecutionRecord {
                symbol: "BTC/USDT".into(),
                side: Side::Buy,
                phase: TradePhase::Open,
                fill_price: dec!(93509.35),
                size: dec!(0.01),
                fee_cash: dec!(0.94),
                slippage_bps: dec!(1),
                is_maker: false,
                take_profit_pct: Some(dec!(0.01)),
                stop_loss_pct: Some(dec!(0.01)),
                realized_pnl: None,
            }),
            reason_code: None,
            reason_detail: None,
        }
    }

    fn close_entry(event_id: &str, ts: f64, pnl: Decimal) -> WalEntry {
        WalEntry {
            timestamp: ts,
            event_id: event_id.to_string(),
            event: WalEvent::Execution(ExecutionRecord {
                symbol: "BTC/USDT".into(),
                side: Side::Sell,
                phase: TradePhase::Close,
                fill_price: dec!(95790.42),
                size: dec!(0.01),
                fee_cash: dec!(0.96),
                slippage_bps: dec!(1),
                is_maker: false,
                take_profit_pct: None,
                stop_loss_pct: None,
                realized_pnl: Some(pnl),
            }),
            reason_code: None,
            reason_detail: None,
        }
    }

    #[test]
    fn test_entry_round_trips_through_json() {
        let entry = decision_entry("ord_000001", 1_700_000_000.0);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"event_type\":\"decision\""));
        assert!(json.contains("\"SIGNAL_LIQUIDATION\""));

        let back: WalEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_append_writes_one_line_per_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wal.jsonl");
        let wal = WalLogger::new(&path, 100).unwrap();

        wal.append(&decision_entry("ord_000001", 1.0)).unwrap();
        wal.append(&open_entry("ord_000001", 2.0)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert_eq!(wal.stats().entries_written, 2);
    }

    #[test]
    fn test_replay_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wal.jsonl");
        let wal = WalLogger::new(&path, 100).unwrap();
        wal.append(&decision_entry("ord_000001", 1.0)).unwrap();
        drop(wal);

        // Simulate a torn write from a crash.
        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str("{\"timestamp\": 2.0, \"event_id\": \"ord_0000");
        std::fs::write(&path, contents).unwrap();

        let entries = replay(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_id, "ord_000001");
    }

    #[test]
    fn test_rotation_renames_and_reopens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wal.jsonl");
        // 1 MB cap would never trip in a unit test; use the smallest cap
        // and enough entries to pass it.
        let wal = WalLogger::new(&path, 1).unwrap();
        let big_detail = "x".repeat(64 * 1024);
        for i in 0..20 {
            let mut entry = decision_entry(&format!("ord_{i:06}"), i as f64);
            entry.reason_detail = Some(big_detail.clone());
            wal.append(&entry).unwrap();
        }

        let rotated: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("wal_") && name.ends_with(".jsonl"))
            .collect();
        assert!(!rotated.is_empty());
        // Live file still present and writable.
        wal.append(&decision_entry("ord_999999", 99.0)).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_recovery_open_without_close() {
        let entries = vec![
            decision_entry("ord_000001", 1.0),
            open_entry("ord_000001", 1.0),
        ];
        let state = RecoveredState::from_entries(&entries, dec!(10000));

        assert_eq!(state.realized_pnl, Decimal::ZERO);
        assert_eq!(state.peak_equity, dec!(10000));
        assert_eq!(state.open_positions.len(), 1);

        let recovered = &state.open_positions[0];
        assert_eq!(recovered.position.symbol, "BTC/USDT");
        assert_eq!(recovered.position.side, PositionSide::Long);
        assert_eq!(recovered.position.entry_price, dec!(93509.35));
        assert_eq!(recovered.strategy_id, "liquidation_hunter");
        assert_eq!(recovered.entry_fee, dec!(0.94));
    }

    #[test]
    fn test_recovery_closed_round_trip() {
        let entries = vec![
            decision_entry("ord_000001", 1.0),
            open_entry("ord_000001", 1.0),
            close_entry("ord_000002", 3.0, dec!(20.91)),
        ];
        let state = RecoveredState::from_entries(&entries, dec!(10000));

        assert!(state.open_positions.is_empty());
        assert_eq!(state.realized_pnl, dec!(20.91));
        assert_eq!(state.peak_equity, dec!(10020.91));
    }

    #[test]
    fn test_recovery_losses_keep_peak_at_capital() {
        let entries = vec![
            decision_entry("ord_000001", 1.0),
            open_entry("ord_000001", 1.0),
            close_entry("ord_000002", 3.0, dec!(-55)),
        ];
        let state = RecoveredState::from_entries(&entries, dec!(10000));
        assert_eq!(state.realized_pnl, dec!(-55));
        assert_eq!(state.peak_equity, dec!(10000));
    }
}
