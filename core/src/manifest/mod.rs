pub mod core;
pub mod credentials;
pub mod yaml;
