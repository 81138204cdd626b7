//! eFIR - incident report filing and tracking service
//!
//! Citizens register, file incident reports and follow their status; police
//! officers review every report and move it through its lifecycle. The
//! library exposes all modules so integration tests can drive them directly.

pub mod authz;
pub mod entities;
pub mod errors;
pub mod keys;
pub mod reports;
pub mod session;
pub mod settings;
pub mod storage;
pub mod user_sync;
pub mod web;
