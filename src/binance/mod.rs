pub mod client;
pub mod rate_limit;
pub mod symbols;

pub use client::{BinanceClient, OrderResult, SymbolRules};
pub use symbols::SymbolCache;
