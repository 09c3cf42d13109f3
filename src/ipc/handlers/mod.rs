pub mod backups;
pub mod core;
pub mod schools;
