pub mod config;
pub mod engine;
pub mod interval;
pub mod limits;
pub mod model;
pub mod observability;
pub mod registry;
pub mod store;
pub mod wal;
pub mod wire;
