pub mod directory;
pub mod engine;
pub mod error;
pub mod history;
pub mod notify;
pub mod query;
pub mod state;
pub mod store;
pub mod ticket;
pub mod types;
pub mod utils;
