/// reporting.rs — External interfaces
///
/// Shapes and helpers for the parts of the persisted layout that sit
/// above individual components: the `stats.yaml` run summary, the
/// sample-config YAML header convention, and the two small observability
/// enums (`EngineStatus`, `ProviderConnectionStatus`). None of this is the
/// literal columnar on-disk format — it's the stats/summary artifact the
/// session folder is expected to carry.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, ErrorCode, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInfo {
    pub id: String,
    pub version: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveTradeStats {
    pub session_id: String,
    pub date: String,
    pub session_start: DateTime<Utc>,
    pub symbols: Vec<String>,
    /// Per-symbol win/loss counts, keyed `"{symbol}"`.
    pub trade_result: BTreeMap<String, TradeResult>,
    /// Per-symbol realized P&L, serialized as a decimal string to avoid
    /// float round-tripping through YAML.
    pub trade_pnl: BTreeMap<String, String>,
    /// Per-symbol average holding time in hours; `None` if no closed
    /// trades yet.
    pub trade_holding_time: BTreeMap<String, Option<i64>>,
    pub total_fees: BTreeMap<String, String>,
    pub file_paths: Vec<PathBuf>,
    pub strategy: StrategyInfo,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradeResult {
    pub winning: usize,
    pub losing: usize,
}

/// Backtest-specific stats: everything `LiveTradeStats` carries, plus the
/// fields that only make sense for a completed backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestStats {
    #[serde(flatten)]
    pub live: LiveTradeStats,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub strategy_path: PathBuf,
    pub data_path: PathBuf,
    pub buy_and_hold_pnl: BTreeMap<String, String>,
}

pub fn write_stats_yaml(path: &Path, stats: &LiveTradeStats) -> Result<()> {
    write_yaml(path, stats)
}

pub fn write_backtest_stats_yaml(path: &Path, stats: &BacktestStats) -> Result<()> {
    write_yaml(path, stats)
}

fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let yaml = serde_yaml::to_string(value).map_err(|e| EngineError::SessionIo {
        code: ErrorCode::SessionIo,
        message: format!("failed to serialize {}", path.display()),
        cause: Some(Box::new(e)),
    })?;
    std::fs::write(path, yaml).map_err(|e| EngineError::SessionIo {
        code: ErrorCode::SessionIo,
        message: format!("failed to write {}", path.display()),
        cause: Some(Box::new(e)),
    })
}

/// The single-line header prepended to a generated sample-config YAML
/// body. The CLI generator that calls this is out of scope here, but the
/// header convention, and its `.json` naming rule, is part of the
/// external contract.
pub fn sample_config_header(schema_name: &str) -> Result<String> {
    if !schema_name.ends_with(".json") {
        return Err(EngineError::InvalidParameter {
            code: ErrorCode::InvalidParameter,
            message: format!("schema name `{schema_name}` must end with .json"),
        });
    }
    Ok(format!("# yaml-language-server: $schema={schema_name}\n"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Prefetching,
    GapFilling,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderConnectionStatus {
    Connected,
    Disconnected,
}
