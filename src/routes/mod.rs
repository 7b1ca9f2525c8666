pub mod auth;
pub mod catalogs;
pub mod collections;
pub mod groups;
pub mod packages;
