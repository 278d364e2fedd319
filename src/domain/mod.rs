pub mod identity;
pub mod resource;
