pub mod config;
pub mod contracts;
pub mod db;
pub mod formats;
pub mod health;
pub mod money;
pub mod repos;
pub mod routes;
pub mod services;
pub mod validation;

pub use routes::{router, AppState};
