pub mod connection_service;
pub mod sync_service;
pub mod token_service;
