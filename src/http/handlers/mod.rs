pub mod admin;
pub mod dictionary;
pub mod staff;
