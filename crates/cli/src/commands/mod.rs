pub mod replay;
pub mod status;
pub mod trigger;
pub mod validate;
