pub mod deploy;
pub mod join;
pub mod timeout;
pub mod win;
