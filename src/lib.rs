pub mod config;
pub mod errors;
pub mod manifest;
pub mod observability;
pub mod services;
pub mod utils;
pub mod web;
