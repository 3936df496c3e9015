pub mod hash;
pub mod phone;
pub mod time;
