pub mod activities;
pub mod analytics;
pub mod classrooms;
pub mod core;
pub mod exchange;
pub mod grades;
pub mod groups;
pub mod roster;
pub mod students;
