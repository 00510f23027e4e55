pub mod bid;
pub mod deploy;
pub mod end;
pub mod start;
pub mod withdraw;
