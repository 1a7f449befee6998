// src/service/mod.rs
pub mod permission_change_service;
pub mod permission_engine;
