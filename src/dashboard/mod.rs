//! Client-side widget state for the dashboard.
//!
//! SYSTEM CONTEXT
//! ==============
//! Widgets hold the local projection a dashboard panel renders from and
//! drive the backend through a narrow async API trait. Every write is
//! followed by a re-fetch; the widget never patches its message list
//! optimistically.

pub mod chat_widget;
