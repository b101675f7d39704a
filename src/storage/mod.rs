pub mod encoded_key;
pub mod keys;
pub mod kv;
pub mod memory;
