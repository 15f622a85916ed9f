pub mod batch;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod output;
pub mod query;
pub mod reader;
