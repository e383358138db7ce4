pub mod config;
pub mod data_service;
pub mod error;
pub mod in_memory_data_service;
