//! Data models for My FODMAP

mod category;
mod credential;
mod document;
mod food;

pub use category::Category;
pub use credential::Credential;
pub use document::{next_modified, Document};
pub use food::{compute_rating, Food, Outcome};
