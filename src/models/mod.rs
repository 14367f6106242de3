pub mod driver;
pub mod expense;
pub mod maintenance;
pub mod trip;
pub mod user;
pub mod vehicle;
