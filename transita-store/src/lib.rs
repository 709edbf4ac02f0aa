pub mod app_config;
pub mod database;
pub mod memory;
pub mod pg;

pub use app_config::Config;
pub use database::DbClient;
pub use memory::{MemoryBookingStore, MemoryScheduleDirectory, MemorySeatStore};
pub use pg::{PgBookingStore, PgScheduleDirectory, PgSeatStore};
