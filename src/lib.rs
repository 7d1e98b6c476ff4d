pub mod categorizer;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod providers;
pub mod repos;
pub mod routes;
pub mod services;
pub mod state;
pub mod vault;
