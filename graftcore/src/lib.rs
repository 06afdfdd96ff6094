pub mod commit;
pub mod error;
pub mod patch;
pub mod path;
