pub mod field;
pub mod log;
pub mod record;
