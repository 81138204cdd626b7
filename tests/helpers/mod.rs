#![allow(dead_code)]

pub mod builders;
pub mod db;
pub mod http;

pub use builders::{ReportBuilder, UserBuilder};
pub use db::TestDb;
pub use http::TestApp;
