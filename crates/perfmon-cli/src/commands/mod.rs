pub mod check;
pub mod poll;
