pub mod executor;
pub mod scope;
