pub mod driver;
pub mod files;
pub mod outcome;
