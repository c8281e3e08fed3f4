pub mod audit_service;
pub mod auth;
pub mod catalog_service;
pub mod image_provider;
pub mod image_search;
pub mod media;
