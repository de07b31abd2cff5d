pub mod cards;
pub mod transfer;
