//! CSDT access server.
//!
//! This crate exposes the session and authorization layer over HTTP:
//! bearer-token extraction, per-route requirements, Postgres-backed
//! sessions and audit log.

pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
