pub mod api;
pub mod chain;
pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod schema;
pub mod util;
pub mod validation;
