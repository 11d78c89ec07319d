pub mod backend;
pub mod config;
pub mod engine;
pub mod fast;
pub mod mask;
pub mod quote;
pub mod reader;
pub mod report;
pub mod suite;
pub mod types;
pub mod value;
