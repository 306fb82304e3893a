pub mod carts;
pub mod inventory;
pub mod pending_payments;
pub mod promotions;
pub mod reclaimer;
pub mod settlement;
