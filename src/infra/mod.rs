pub mod cache;
pub mod db;
pub mod error;
pub mod images;
pub mod memory;
pub mod metadata;
pub mod storage;
