pub mod vnpay;

pub use vnpay::VnpayGateway;
