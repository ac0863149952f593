pub mod confirm_email;
pub mod health;
pub mod login;
pub mod password_reset;
pub mod register;
pub mod users;

pub use confirm_email::confirm_email;
pub use health::health_check;
pub use login::login;
pub use password_reset::{request_password_reset, reset_password_confirm};
pub use register::register;
pub use users::{
    deactivate_user, delete_user, get_user, list_users, list_users_by_role, update_profile,
};
