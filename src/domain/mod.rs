pub mod drag;
pub mod models;
pub mod ordering;
