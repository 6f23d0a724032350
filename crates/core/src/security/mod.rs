pub mod keys;

pub use keys::{generate_api_key, ApiKeyHasher, API_KEY_PREFIX};
