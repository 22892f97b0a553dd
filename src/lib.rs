//! PII masking client
//!
//! Submits identity documents to a PII masking job service, follows each job
//! to completion, renders the masked result with its detections, and collects
//! the reviewer's mask/keep decisions for low-confidence findings.

pub mod config;
pub mod models;
pub mod services;
pub mod session;
