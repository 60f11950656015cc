pub mod database;
pub mod session;
