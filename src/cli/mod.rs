pub mod cache;
pub mod check;
pub mod run;
