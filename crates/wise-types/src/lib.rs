pub mod api;
pub mod models;
pub mod session;
pub mod validation;

pub use validation::ValidationError;
