mod client;
mod ops;

pub use client::PostgresWarehouse;
