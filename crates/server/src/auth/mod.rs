pub mod admin;
pub mod jwt;
pub mod middleware;
pub mod oauth;
