pub mod cart;
pub mod errors;
pub mod order;
pub mod principal;
pub mod product;
