//! Domain types shared by the queue and its collaborators

mod priority;

pub use priority::Priority;
