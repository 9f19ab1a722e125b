pub mod config;
pub mod domain;
pub mod post;
pub mod run;
pub mod server;
pub mod site;
pub mod tick;
pub mod triggers;
