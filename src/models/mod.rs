// src/models/mod.rs

pub mod attempt;
pub mod content;
pub mod course;
pub mod question;
pub mod user;
