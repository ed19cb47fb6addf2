//! Stores for evaluation outputs and per-tree services

pub mod dispose;
pub mod data_store;
pub mod type_store;

pub use dispose::Disposable;
pub use data_store::{DataStore, StringStore};
pub use type_store::{StoreService, TypeStore};
