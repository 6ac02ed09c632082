#![forbid(unsafe_code)]

pub mod app;
pub mod build;
pub mod cli;
pub mod config;
pub mod content;
pub mod epub;
pub mod error;
pub mod logging;
pub mod scrape;
pub mod source;
pub mod translate;
