pub mod config;
pub mod dedup;
pub mod error;
pub mod inbound;
pub mod lifecycle;
pub mod monitor;
pub mod name_matcher;
pub mod page_parser;
pub mod page_source;
pub mod player_finder;
pub mod search_client;
pub mod session;
pub mod sms;
pub mod store;
pub mod subscribers;
pub mod types;
pub mod web;
