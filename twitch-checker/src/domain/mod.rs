//! Domain value objects.

pub mod login;

pub use login::Login;
