pub mod app_config;
pub mod database;
pub mod memory;
pub mod pg_gateway;

pub use app_config::{BookingRules, Config, MatchingConfig, StoreBackend};
pub use database::DbClient;
pub use memory::MemoryStore;
pub use pg_gateway::PgGateway;
