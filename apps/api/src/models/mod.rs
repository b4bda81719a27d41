pub mod company;
pub mod permission;
pub mod record;
pub mod resume;
pub mod role;
pub mod user;

pub use company::Company;
pub use permission::{Permission, Scope};
pub use record::{Document, Entity, Meta, Record};
pub use resume::Resume;
pub use role::Role;
pub use user::User;
