pub mod executor;
pub mod factory;
pub mod provider;
