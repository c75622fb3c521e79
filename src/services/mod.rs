pub mod availability_service;
pub mod booking_service;
pub mod catalog_service;
pub mod timespan;
