#[macro_use]
extern crate log;
#[macro_use]
extern crate derive_builder;
#[macro_use]
extern crate lazy_static;

pub mod browser_controller;
pub mod crawler;
pub mod runner;
pub mod session;
pub mod store;
pub mod types;
pub mod utils;
