pub mod route;
pub mod target;
