pub mod actions;
pub mod adapters;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod gateway;
pub mod realtime;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use config::{load_config, IntelligenceOptions, SyncConfig};
pub use error::{CollectionError, GatewayError, MutationError};
pub use gateway::IntelligenceGateway;
pub use session::{
    Availability, IntelligenceContext, IntelligenceSession, RegionAnalyticsFeed,
    RepAnalyticsFeed, TickerFeed,
};
pub use state::IntelligenceView;
pub use types::Collection;
