pub mod report;
pub mod status_update;
pub mod user;

pub use report::Entity as Report;
pub use status_update::Entity as StatusUpdate;
pub use user::Entity as User;
