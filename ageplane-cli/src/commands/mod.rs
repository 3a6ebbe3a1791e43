//! Subcommand handlers

pub mod customer;
pub mod health;
pub mod settings;
