//! Student Hub - student, parent and holiday management backend
//!
//! This library provides the HTTP API, storage and services behind the
//! `student-hub` server.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
