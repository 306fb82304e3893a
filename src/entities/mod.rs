pub mod cart;
pub mod cart_item;
pub mod order;
pub mod order_item;
pub mod pending_payment;
pub mod product;
pub mod promotion;
pub mod promotion_usage;
pub mod shipment;
