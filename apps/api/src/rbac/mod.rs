pub mod principal;
pub mod resolver;

pub use principal::{Principal, PrincipalLoader};
pub use resolver::{RbacResolver, ScopeSet};

/// Actions a permission can grant.
pub const READ: &str = "read";
pub const WRITE: &str = "write";
pub const MANAGE: &str = "manage";
