pub mod company;
pub mod market;
