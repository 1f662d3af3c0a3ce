pub mod deadlines;
pub mod models;
pub mod presentation;
