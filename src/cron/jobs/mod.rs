pub mod prune_live_store;
pub mod refresh_key_prices;
