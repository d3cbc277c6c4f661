pub mod connection;
pub mod rows;

pub use connection::{connect, DbPool};
pub use rows::{row_to_json, rows_to_json};
