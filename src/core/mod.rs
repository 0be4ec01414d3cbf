// Core modules implementing the note model, storage backends, and error modeling.
pub mod collection;
pub mod connection;
pub mod error;
pub mod memory;
pub mod note;
pub mod object_id;
pub mod store;
