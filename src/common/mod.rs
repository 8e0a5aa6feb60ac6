// Shared constants and small process/filesystem helpers
pub mod constants;
pub mod utils;
