pub mod presence_store;

pub use presence_store::PresenceStore;
