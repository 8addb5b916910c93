pub mod colorize;
pub mod form;
pub mod health;
pub mod session_files;
pub mod suggest;
