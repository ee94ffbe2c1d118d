mod keys;
mod user_state;

pub use keys::MemoryKeyStore;
pub use user_state::UserStateStore;
