pub mod filter;
pub mod merge;
pub mod pagination;
pub mod sort;

pub use filter::{Condition, Filter, Predicate, Range};
pub use merge::merge;
pub use pagination::{Pagination, PaginationError};
pub use sort::{Direction, Sort};
