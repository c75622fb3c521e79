pub mod availability_repository;
pub mod booking_repository;
pub mod service_repository;
