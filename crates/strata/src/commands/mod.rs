pub mod down;
pub mod outputs;
pub mod plan;
pub mod up;
pub mod validate;
