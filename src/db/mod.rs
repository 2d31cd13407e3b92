//! Warehouse access: the client seam, its Postgres and in-memory
//! implementations, and the tabular result type both produce.

pub mod models;
pub mod postgres;

mod memory;
mod tabular;
mod warehouse;

pub use memory::InMemoryWarehouse;
pub use postgres::PostgresWarehouse;
pub use tabular::{Column, ColumnSpec, SemanticType, TabularResult, Value};
pub use warehouse::WarehouseClient;
