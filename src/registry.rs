// =============================================================================
// Bot Registry — the durable fleet roster and the shared capital ledger
// =============================================================================
//
// The registry is the single writer of active_bots.json. Workers read cached
// copies (one `get` per tick) and route every mutation through here.
//
// Capital ledger: `allocated_capital_usdt` is the bot's REMAINING spendable
// quota. Buys debit it, sell proceeds credit it, AddFunds raises it. Because
// all bots spend the same physical USDT balance, a buy reservation is taken
// under the registry lock BEFORE the order goes out:
//
//   reserve_spend  — debit the quota, track the in-flight amount
//   confirm_spend  — order filled; refund any unspent remainder
//   rollback_spend — order failed; restore the full reservation
//
// The reservation also subtracts every other bot's in-flight spend from the
// wallet balance it is allowed to see, so two workers can never commit the
// same USDT.
// =============================================================================

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage;
use crate::strategy::StrategyKind;
use crate::types::BotStatus;

/// One registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub id: u64,
    pub name: String,
    pub symbol: String,
    pub strategy: StrategyKind,
    /// Remaining spendable quota (see module docs).
    pub allocated_capital_usdt: f64,
    /// Seed size for the first buy of a position.
    pub trade_amount_usdt: f64,
    pub status: BotStatus,
    pub created_at: DateTime<Utc>,
    /// Lifetime realized P&L across closed positions.
    #[serde(default)]
    pub realized_pnl_usdt: f64,
}

/// Creation request, as accepted by the dashboard API.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBotSpec {
    pub name: String,
    pub symbol: String,
    pub strategy: StrategyKind,
    #[serde(default)]
    pub allocated_capital_usdt: f64,
    pub trade_amount_usdt: f64,
    /// Symbol uniqueness is advisory; the user may override.
    #[serde(default)]
    pub allow_duplicate_symbol: bool,
}

/// Editable fields; symbol changes are vetoed by the supervisor while a
/// position exists.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotPatch {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub strategy: Option<StrategyKind>,
    pub trade_amount_usdt: Option<f64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    next_id: u64,
    bots: Vec<Bot>,
}

struct RegistryState {
    next_id: u64,
    bots: Vec<Bot>,
    /// In-flight buy reservations per bot id. Not persisted: a crash between
    /// reserve and confirm resolves itself because the quota debit IS
    /// persisted and the order either filled or did not.
    in_flight: HashMap<u64, f64>,
}

/// Thread-safe registry + ledger.
pub struct BotRegistry {
    path: PathBuf,
    state: Mutex<RegistryState>,
}

impl BotRegistry {
    /// Load the registry from disk (empty when the file is absent).
    pub fn load(data_dir: &std::path::Path) -> Result<Self> {
        let path = storage::registry_path(data_dir);
        let file: RegistryFile = storage::read_json(&path)?.unwrap_or_default();

        info!(bots = file.bots.len(), "bot registry loaded");
        Ok(Self {
            path,
            state: Mutex::new(RegistryState {
                next_id: file.next_id.max(1),
                bots: file.bots,
                in_flight: HashMap::new(),
            }),
        })
    }

    fn persist(&self, state: &RegistryState) -> Result<()> {
        storage::write_json_atomic(
            &self.path,
            &RegistryFile {
                next_id: state.next_id,
                bots: state.bots.clone(),
            },
        )
    }

    // -------------------------------------------------------------------------
    // Roster operations
    // -------------------------------------------------------------------------

    /// Insert a new bot and return it with its assigned id.
    pub fn create(&self, spec: NewBotSpec) -> Result<Bot> {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;

        let bot = Bot {
            id,
            name: spec.name,
            symbol: spec.symbol.to_uppercase(),
            strategy: spec.strategy,
            allocated_capital_usdt: spec.allocated_capital_usdt.max(0.0),
            trade_amount_usdt: spec.trade_amount_usdt.max(0.0),
            status: BotStatus::Stopped,
            created_at: Utc::now(),
            realized_pnl_usdt: 0.0,
        };
        state.bots.push(bot.clone());
        self.persist(&state)?;

        info!(id, name = %bot.name, symbol = %bot.symbol, strategy = %bot.strategy, "bot created");
        Ok(bot)
    }

    pub fn get(&self, id: u64) -> Option<Bot> {
        self.state.lock().bots.iter().find(|b| b.id == id).cloned()
    }

    pub fn list(&self) -> Vec<Bot> {
        self.state.lock().bots.clone()
    }

    /// Remove a bot from the roster. The caller is responsible for ensuring
    /// the worker is stopped.
    pub fn remove(&self, id: u64) -> Result<Bot> {
        let mut state = self.state.lock();
        let idx = state
            .bots
            .iter()
            .position(|b| b.id == id)
            .with_context(|| format!("bot {id} not found"))?;
        let bot = state.bots.remove(idx);
        state.in_flight.remove(&id);
        self.persist(&state)?;
        info!(id, name = %bot.name, "bot removed");
        Ok(bot)
    }

    /// Apply `mutate` to the bot and persist. Returns the updated copy.
    pub fn update<F: FnOnce(&mut Bot)>(&self, id: u64, mutate: F) -> Result<Bot> {
        let mut state = self.state.lock();
        let bot = state
            .bots
            .iter_mut()
            .find(|b| b.id == id)
            .with_context(|| format!("bot {id} not found"))?;
        mutate(bot);
        let updated = bot.clone();
        self.persist(&state)?;
        Ok(updated)
    }

    pub fn set_status(&self, id: u64, status: BotStatus) -> Result<Bot> {
        self.update(id, |bot| bot.status = status)
    }

    pub fn set_symbol(&self, id: u64, symbol: &str) -> Result<Bot> {
        let symbol = symbol.to_uppercase();
        self.update(id, |bot| bot.symbol = symbol)
    }

    pub fn add_funds(&self, id: u64, usdt: f64) -> Result<Bot> {
        if usdt <= 0.0 || !usdt.is_finite() {
            bail!("add-funds amount must be positive");
        }
        self.update(id, |bot| bot.allocated_capital_usdt += usdt)
    }

    /// Symbols currently owned by bots in `running` state, for the advisory
    /// uniqueness check.
    pub fn running_symbols(&self) -> Vec<String> {
        self.state
            .lock()
            .bots
            .iter()
            .filter(|b| b.status == BotStatus::Running)
            .map(|b| b.symbol.clone())
            .collect()
    }

    // -------------------------------------------------------------------------
    // Capital ledger
    // -------------------------------------------------------------------------

    /// Reserve USDT for a buy. Grants `min(requested, quota, wallet_free -
    /// everyone else's in-flight spend)`, debits the quota, and records the
    /// in-flight amount — all under one lock acquisition.
    ///
    /// Returns the granted amount (possibly 0.0, which callers must treat as
    /// "no buy").
    pub fn reserve_spend(&self, id: u64, requested: f64, wallet_free_usdt: f64) -> Result<f64> {
        let mut state = self.state.lock();

        let others_in_flight: f64 = state
            .in_flight
            .iter()
            .filter(|(bot_id, _)| **bot_id != id)
            .map(|(_, amt)| amt)
            .sum();
        let wallet_available = (wallet_free_usdt - others_in_flight).max(0.0);

        let bot = state
            .bots
            .iter_mut()
            .find(|b| b.id == id)
            .with_context(|| format!("bot {id} not found"))?;

        let granted = requested
            .min(bot.allocated_capital_usdt)
            .min(wallet_available)
            .max(0.0);

        if granted <= 0.0 {
            debug!(
                id,
                requested,
                quota = bot.allocated_capital_usdt,
                wallet_available,
                "reservation yielded nothing"
            );
            return Ok(0.0);
        }

        bot.allocated_capital_usdt -= granted;
        *state.in_flight.entry(id).or_insert(0.0) += granted;
        self.persist(&state)?;

        debug!(id, granted, "buy reservation committed");
        Ok(granted)
    }

    /// The order filled for `actual_spent`; release the reservation and
    /// refund whatever was not spent.
    pub fn confirm_spend(&self, id: u64, reserved: f64, actual_spent: f64) -> Result<()> {
        let mut state = self.state.lock();
        release_in_flight(&mut state.in_flight, id, reserved);

        let refund = (reserved - actual_spent).max(0.0);
        if refund > 0.0 {
            if let Some(bot) = state.bots.iter_mut().find(|b| b.id == id) {
                bot.allocated_capital_usdt += refund;
            }
        }
        self.persist(&state)?;
        debug!(id, reserved, actual_spent, refund, "buy reservation confirmed");
        Ok(())
    }

    /// The order failed; restore the full reservation to the quota.
    pub fn rollback_spend(&self, id: u64, reserved: f64) -> Result<()> {
        let mut state = self.state.lock();
        release_in_flight(&mut state.in_flight, id, reserved);
        if let Some(bot) = state.bots.iter_mut().find(|b| b.id == id) {
            bot.allocated_capital_usdt += reserved;
        }
        self.persist(&state)?;
        debug!(id, reserved, "buy reservation rolled back");
        Ok(())
    }

    /// A sell realized `proceeds`; credit them back to the quota and record
    /// the realized P&L on the roster entry.
    pub fn credit_sale(&self, id: u64, proceeds: f64, pnl: f64) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(bot) = state.bots.iter_mut().find(|b| b.id == id) {
            bot.allocated_capital_usdt += proceeds;
            bot.realized_pnl_usdt += pnl;
        }
        self.persist(&state)?;
        info!(id, proceeds, pnl, "sale credited to quota");
        Ok(())
    }

    /// Total in-flight spend across all bots (dashboard diagnostics).
    pub fn total_in_flight(&self) -> f64 {
        self.state.lock().in_flight.values().sum()
    }
}

fn release_in_flight(in_flight: &mut HashMap<u64, f64>, id: u64, amount: f64) {
    if let Some(entry) = in_flight.get_mut(&id) {
        *entry -= amount;
        if *entry <= 1e-9 {
            in_flight.remove(&id);
        }
    }
}

impl std::fmt::Debug for BotRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BotRegistry")
            .field("bots", &state.bots.len())
            .field("in_flight", &state.in_flight.len())
            .finish()
    }
}
