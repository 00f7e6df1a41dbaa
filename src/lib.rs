//! OCR Server Library
//!
//! This crate exposes the modules needed for integration testing.
//! The main server binary is in main.rs.
//!
//! # Modules
//!
//! - `ocr`: Engine pool, recognition service and result types
//! - `routes`: HTTP endpoints and request validation
//! - `config` / `state`: Configuration and shared application state

pub mod config;
pub mod ocr;
pub mod routes;
pub mod state;
