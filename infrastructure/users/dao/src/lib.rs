pub mod memory;
pub mod migrations;
pub mod postgres;
pub mod store;

pub use memory::MemoryUserStore;
pub use postgres::UserDao;
pub use store::UserStore;
