//! HTTP control API
//!
//! Lets an operator create, inspect and cancel campaigns, reset a
//! campaign's recovery budget and download its consolidated dataset.

pub mod auth;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod types;

pub use server::HttpServer;
