pub mod autoscaling;
mod backoff;
mod command;
mod config;
mod context;
pub mod controllers;
pub mod database;
pub mod domain;
mod error;
mod job;
mod operator_config;
mod password;
mod reconciler;
mod resources;
mod service;
pub mod storage;
mod trace;
mod utils;

pub use config::Config;
pub use context::Context;
pub use error::{ControllerError, ControllerResult, Error, Result};
pub use utils::ControllerStreamExt;
