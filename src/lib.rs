pub mod cache;
pub mod cli;
pub mod cmds;
pub mod config;
pub mod error;
pub mod http;
pub mod io;
pub mod logging;
pub mod manifest;
pub mod time;
pub mod worker;
pub mod writer;
pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;

#[macro_use]
extern crate log;

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate derive_builder;

pub const DEFAULT_OFFLINE_FALLBACK: &str = "/index.html";
