pub mod connection;
pub mod migrations;
pub mod models;
pub mod repositories;

pub use connection::Database;
pub use models::Analysis;
