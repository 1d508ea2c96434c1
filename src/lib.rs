pub mod cache;
pub mod cli;
pub mod config;
pub mod lister;
pub mod model;
pub mod prefetch;
pub mod progress;
pub mod repository;
pub mod resolver;
pub mod version;

mod api;
mod flock;

pub use api::{Gomodnix, GomodnixBuilder};
