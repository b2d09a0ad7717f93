pub use super::item_price_candle::Entity as ItemPriceCandle;
pub use super::item_price_history::Entity as ItemPriceHistory;
pub use super::live_stats::Entity as LiveStats;
