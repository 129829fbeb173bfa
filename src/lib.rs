//! Chat backend with durable, reconciling conversation storage.
//!
//! The interesting part lives in [`store`]: a [`store::ChatStore`] contract
//! with a file-per-chat implementation (atomic rename writes) and a
//! relational one (transactional insert/update/delete reconcile), both
//! keeping derived title/preview metadata consistent with the message set.

pub mod agent;
pub mod chat_id;
pub mod codec;
pub mod config;
pub mod errors;
pub mod models;
pub mod routes;
pub mod service;
pub mod store;
pub mod title;
