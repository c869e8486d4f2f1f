//! Strategy evaluator: buy and sell decision functions.
//!
//! Everything here is pure. Thresholds come from config and are never
//! mutated; the engine supplies the facts (trade events, profiles, quotes).

pub mod buy;
pub mod sell;

use serde::Deserialize;

use buy::BuyStrategy;
use sell::SellStrategy;

/// Buy and sell thresholds for one strategy profile.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct StrategyConfig {
    pub buy: BuyStrategy,
    pub sell: SellStrategy,
}
