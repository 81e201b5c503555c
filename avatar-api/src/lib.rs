pub mod app_state;
pub mod auth;
pub mod config;
pub mod domain;
pub mod repositories;
pub mod router;
pub mod routes;
pub mod services;
