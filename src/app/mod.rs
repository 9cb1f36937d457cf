pub mod ads;
pub mod auth;
pub mod cities;
pub mod csrf;
pub mod images;
pub mod session;
pub mod users;
pub mod validation;
