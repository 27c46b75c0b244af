pub mod btc;
pub mod cc;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod event;
pub mod index;
pub mod query;
pub mod service;
pub mod status;
pub mod tool;

#[macro_use]
extern crate log;
