pub mod error_handling;
pub mod pagination;

pub use error_handling::is_unique_violation;
pub use pagination::{PaginationParams, create_param_refs, order_by_clause};
