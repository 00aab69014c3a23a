// src/handlers/mod.rs

pub mod admin;
pub mod auth;
pub mod courses;
pub mod exams;
pub mod progress;
pub mod reviews;
