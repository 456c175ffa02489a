pub mod ohlc;
pub mod signal;
pub mod tvl;

pub use ohlc::OhlcBuilder;
pub use signal::ActivitySignal;
pub use tvl::TvlCalculator;
