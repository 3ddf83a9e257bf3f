// =============================================================================
// Position — the single long a bot may hold, and its durable file store
// =============================================================================
//
// Life-cycle:
//   created on the first successful buy
//   mutated by scale-ins (weighted-average entry, SL/TP recomputed)
//   destroyed by any successful sell (the file is deleted)
//
// Invariant: a persisted position always has a qty whose notional was at or
// above the exchange min notional at creation time. Dust discovered later
// (external sells, fee erosion) is cleared by the worker's reconcile step.
// =============================================================================

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage;

/// A bot's open long position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub symbol: String,
    /// Only long positions are supported on spot.
    pub side: String,
    pub qty: f64,
    pub avg_entry_price: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub opened_at: DateTime<Utc>,
    pub last_buy_at: DateTime<Utc>,
    #[serde(default)]
    pub ai_reasoning: Option<String>,
    #[serde(default)]
    pub realized_pnl_usdt_cumulative: f64,
}

impl Position {
    /// Open a fresh position from an initial fill.
    pub fn open(
        symbol: &str,
        qty: f64,
        entry_price: f64,
        sl_factor: f64,
        tp_factor: f64,
        reasoning: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            symbol: symbol.to_string(),
            side: "long".to_string(),
            qty,
            avg_entry_price: entry_price,
            stop_loss_price: entry_price * sl_factor,
            take_profit_price: entry_price * tp_factor,
            opened_at: now,
            last_buy_at: now,
            ai_reasoning: reasoning,
            realized_pnl_usdt_cumulative: 0.0,
        }
    }

    /// Fold an additional fill into the position: the entry becomes the
    /// quantity-weighted average and SL/TP are re-anchored around it.
    pub fn scale_in(&mut self, fill_qty: f64, fill_price: f64, sl_factor: f64, tp_factor: f64) {
        let old_cost = self.qty * self.avg_entry_price;
        let new_cost = fill_qty * fill_price;
        let total_qty = self.qty + fill_qty;

        self.avg_entry_price = (old_cost + new_cost) / total_qty;
        self.qty = total_qty;
        self.stop_loss_price = self.avg_entry_price * sl_factor;
        self.take_profit_price = self.avg_entry_price * tp_factor;
        self.last_buy_at = Utc::now();

        debug!(
            symbol = %self.symbol,
            qty = self.qty,
            avg_entry_price = self.avg_entry_price,
            stop_loss = self.stop_loss_price,
            take_profit = self.take_profit_price,
            "position scaled in"
        );
    }

    /// USDT spent acquiring the current quantity (at the average entry).
    pub fn cost_basis(&self) -> f64 {
        self.qty * self.avg_entry_price
    }

    /// Unrealized PnL at `price`.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        (price - self.avg_entry_price) * self.qty
    }

    /// How long the position has been open.
    pub fn held_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.opened_at
    }

    /// True when the position's notional at `price` is under the exchange
    /// minimum — too small to ever sell.
    pub fn is_dust(&self, price: f64, min_notional: f64) -> bool {
        self.qty * price < min_notional
    }
}

// ---------------------------------------------------------------------------
// File store
// ---------------------------------------------------------------------------

/// Durable store for one bot's position file. The owning worker is the only
/// writer; saves are atomic so dashboard reads never see a torn position.
pub struct PositionStore {
    path: PathBuf,
}

impl PositionStore {
    pub fn new(data_dir: &std::path::Path, bot_id: u64) -> Self {
        Self {
            path: storage::position_path(data_dir, bot_id),
        }
    }

    pub fn load(&self) -> Result<Option<Position>> {
        storage::read_json(&self.path)
    }

    pub fn save(&self, position: &Position) -> Result<()> {
        storage::write_json_atomic(&self.path, position)
    }

    /// Delete the position file (position closed or collapsed to dust).
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            info!(path = %self.path.display(), "position file cleared");
        }
        storage::remove_if_exists(&self.path)
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("flotilla-pos-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn open_sets_sl_tp_around_entry() {
        let pos = Position::open("SOLUSDT", 0.584, 171.2, 0.97, 1.05, None);
        assert!((pos.stop_loss_price - 171.2 * 0.97).abs() < 1e-9);
        assert!((pos.take_profit_price - 171.2 * 1.05).abs() < 1e-9);
        assert_eq!(pos.side, "long");
        assert_eq!(pos.realized_pnl_usdt_cumulative, 0.0);
    }

    #[test]
    fn scale_in_recomputes_weighted_average() {
        // Mirrors the shape of a real scale-in: 0.05 ETH at 4366.87 plus a
        // 45.32 USDT fill at 4448.29.
        let mut pos = Position::open("ETHUSDT", 0.05, 4366.87, 0.97, 1.05, None);
        let fill_qty = 45.32 / 4448.29;
        pos.scale_in(fill_qty, 4448.29, 0.97, 1.05);

        let expected_avg =
            (0.05 * 4366.87 + fill_qty * 4448.29) / (0.05 + fill_qty);
        // Invariant: weighted average exact to within one ULP.
        assert!((pos.avg_entry_price - expected_avg).abs() <= expected_avg * f64::EPSILON);
        assert!((pos.qty - (0.05 + fill_qty)).abs() < 1e-15);
        assert!((pos.stop_loss_price - expected_avg * 0.97).abs() < 1e-9);
        assert!((pos.take_profit_price - expected_avg * 1.05).abs() < 1e-9);
    }

    #[test]
    fn scale_in_moves_entry_toward_fill_price() {
        let mut pos = Position::open("BTCUSDT", 0.001, 50_000.0, 0.97, 1.05, None);
        pos.scale_in(0.001, 60_000.0, 0.97, 1.05);
        assert!((pos.avg_entry_price - 55_000.0).abs() < 1e-6);
    }

    #[test]
    fn unrealized_pnl_sign() {
        let pos = Position::open("BNBUSDT", 0.10, 700.0, 0.97, 1.05, None);
        assert!((pos.unrealized_pnl(678.0) - (-2.2)).abs() < 1e-9);
        assert!(pos.unrealized_pnl(710.0) > 0.0);
    }

    #[test]
    fn dust_detection() {
        let pos = Position::open("ADAUSDT", 5.0, 0.5, 0.97, 1.05, None);
        // Notional 2.5 < min notional 5.0 => dust.
        assert!(pos.is_dust(0.5, 5.0));
        assert!(!pos.is_dust(2.0, 5.0));
    }

    #[test]
    fn store_roundtrip_is_exact() {
        let dir = temp_dir();
        let store = PositionStore::new(&dir, 9);
        let pos = Position::open("ETHUSDT", 0.05123, 4366.87, 0.97, 1.05, Some("why".into()));

        store.save(&pos).unwrap();
        let loaded = store.load().unwrap().unwrap();

        // Bit-equality on every float field after persist-then-reload.
        assert_eq!(loaded.qty.to_bits(), pos.qty.to_bits());
        assert_eq!(
            loaded.avg_entry_price.to_bits(),
            pos.avg_entry_price.to_bits()
        );
        assert_eq!(
            loaded.stop_loss_price.to_bits(),
            pos.stop_loss_price.to_bits()
        );
        assert_eq!(
            loaded.take_profit_price.to_bits(),
            pos.take_profit_price.to_bits()
        );
        assert_eq!(loaded, pos);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn clear_removes_file_and_is_idempotent() {
        let dir = temp_dir();
        let store = PositionStore::new(&dir, 4);
        store
            .save(&Position::open("SOLUSDT", 1.0, 100.0, 0.97, 1.05, None))
            .unwrap();
        assert!(store.exists());

        store.clear().unwrap();
        assert!(!store.exists());
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());

        std::fs::remove_dir_all(&dir).ok();
    }
}
