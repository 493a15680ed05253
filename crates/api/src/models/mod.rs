//! Domain and response types for the API.
//!
//! Row types (`*Row`) mirror SQL result sets; the public types are what
//! handlers serialize. JSON fields are camelCase throughout.

pub mod cart;
pub mod order;
pub mod product;
pub mod review;
pub mod user;
