pub mod api_connection;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod error;
pub mod grocery;
pub mod optim;
pub mod pricing;
pub mod profile;
pub mod prompts;
pub mod response_parser;
