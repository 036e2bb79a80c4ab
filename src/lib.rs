//! `LeadFlow`: lead-management dashboard service.
//!
//! ARCHITECTURE
//! ============
//! Route handlers translate HTTP/WS into calls on service modules. Services
//! own the flows (profile, avatar pipeline, chat, calendar, notifications)
//! and reach the managed backend only through the trait seams in [`store`],
//! [`blob`] and [`mail`], so a Postgres/filesystem deployment and an
//! in-memory deployment run the same code paths.

pub mod blob;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod frame;
pub mod mail;
pub mod model;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
