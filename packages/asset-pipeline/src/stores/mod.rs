//! Cache store implementations.
//!
//! Available backends:
//! - `MemoryStore` - In-memory storage (always available)
//! - `SqliteStore` - SQLite file-based storage (requires `sqlite` feature)

pub mod memory;
pub mod single_flight;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;
pub use single_flight::{FlightGuard, SingleFlight};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
