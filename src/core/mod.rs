pub mod dispatcher;
pub mod error;
pub mod events;
pub mod hub;
pub mod scheduler;
pub mod store;
pub mod voice;
