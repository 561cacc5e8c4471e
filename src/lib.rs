pub mod auth;
pub mod config;
pub mod conversations;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod schema;
pub mod state;
pub mod status;
pub mod utils;
