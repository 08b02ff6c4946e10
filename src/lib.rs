pub mod assistant;
pub mod catalog;
pub mod config;
pub mod encoding;
pub mod errors;
pub mod index;
pub mod logging;
pub mod search;
