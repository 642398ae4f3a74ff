//! Multi-tenant freelance time tracking with weekly timesheet approval.

pub mod aggregate;
pub mod auth;
pub mod config;
pub mod dates;
pub mod db;
pub mod error;
pub mod gate;
pub mod http;
pub mod lifecycle;
pub mod model;
pub mod services;
pub mod store;
