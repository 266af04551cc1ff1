pub mod activity;
pub mod cli;
pub mod config;
pub mod error;
pub mod fleet;
pub mod identity;
pub mod logging;
pub mod remote;
pub mod storage;
