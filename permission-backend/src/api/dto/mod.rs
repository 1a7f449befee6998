// src/api/dto/mod.rs
pub mod permission_change_dto;
