pub mod chunks;
pub mod info;
pub mod validate;
