pub mod ad;
pub mod city;
pub mod context;
pub mod error;
pub mod session;
pub mod user;
