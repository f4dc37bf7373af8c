pub mod application;
pub mod application_manager;
pub mod constraints;
pub mod recipe;
pub mod working_mode;
