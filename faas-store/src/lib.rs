pub mod error;
pub mod object;
pub mod tasks;

pub use error::StoreError;
pub use object::{KeyLayout, ObjectStore};
pub use tasks::{TaskStore, TaskUpdate};
