pub mod feed;
pub mod store;

pub use feed::{CandleSource, FeedError, FeedSettings, KrakenOhlcFeed, KRAKEN_PUBLIC_API};
pub use store::CandleStore;
