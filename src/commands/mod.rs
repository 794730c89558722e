pub mod export_market_data;
pub mod strategies;
pub mod sweep;
