pub mod token;
pub mod user;

pub use token::{TokenRepository, TokenStore};
pub use user::UserRepository;
