//! Domain services used by HTTP, websocket routes and the dashboard widgets.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic and backend calls so route handlers
//! can stay focused on protocol translation and auth plumbing. Every service
//! takes `&AppState` and returns its own `thiserror` enum.

pub mod auth;
pub mod avatar;
pub mod calendar;
pub mod chat;
pub mod notifications;
pub mod password_reset;
pub mod profile;
pub mod session;
