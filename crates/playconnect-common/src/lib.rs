pub mod models;
pub mod token;
