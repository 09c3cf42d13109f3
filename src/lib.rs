pub mod config;
pub mod controller;
pub mod db;
pub mod error;
pub mod export;
pub mod filter;
pub mod ipc;
pub mod logging;
pub mod model;
pub mod provisioning;
pub mod reconcile;
pub mod store;
pub mod taxonomy;
