pub mod admin;
pub mod completions;
pub mod health;
pub mod models;
