//! Core modules shared by the hierarchy engine and the registries.
//!
//! Everything that touches the store goes through [`broker::DbBroker`].

pub mod actor;
pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod output;
pub mod pool;
pub mod schemas;
pub mod store;
pub mod time;
