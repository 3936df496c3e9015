pub mod app;
pub mod commands;
