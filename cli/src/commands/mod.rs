pub mod api;
pub mod auth;
pub mod classify;
pub mod prompt;
pub mod run;
pub mod token;
