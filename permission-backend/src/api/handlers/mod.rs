// src/api/handlers/mod.rs
pub mod permission_change_handler;
