pub mod fetch;
pub mod offline;
pub mod records;
pub mod register;
pub mod verify;
