pub mod repo;
pub mod scenario;
