use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sha2::Sha512;
use tracing::warn;

use crate::config::VnpayConfig;
use crate::errors::ServiceError;

type HmacSha512 = Hmac<Sha512>;

/// Response code the gateway sends on a successful payment.
pub const SUCCESS_RESPONSE_CODE: &str = "00";

pub const PARAM_TXN_REF: &str = "vnp_TxnRef";
pub const PARAM_RESPONSE_CODE: &str = "vnp_ResponseCode";
pub const PARAM_TRANSACTION_NO: &str = "vnp_TransactionNo";
pub const PARAM_SECURE_HASH: &str = "vnp_SecureHash";
pub const PARAM_SECURE_HASH_TYPE: &str = "vnp_SecureHashType";

const DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// Signed-redirect adapter for the VNPay gateway. The settlement engine only
/// depends on the two public operations; the signature scheme stays in here.
#[derive(Clone)]
pub struct VnpayGateway {
    cfg: VnpayConfig,
}

impl VnpayGateway {
    pub fn new(cfg: VnpayConfig) -> Self {
        Self { cfg }
    }

    /// Storefront page that renders the final checkout result.
    pub fn result_url(&self) -> &str {
        &self.cfg.result_url
    }

    /// Builds the outbound payment URL: canonical sorted query, amount
    /// scaled to the gateway's minor unit, HMAC-SHA512 signature appended.
    pub fn build_redirect_url(
        &self,
        order_ref: &str,
        amount: Decimal,
        client_ip: &str,
        order_info: &str,
        now: DateTime<Utc>,
    ) -> Result<String, ServiceError> {
        let scaled = (amount * Decimal::from(100)).trunc();
        let minor_amount = scaled.to_i64().filter(|v| *v >= 0).ok_or_else(|| {
            ServiceError::InternalError(format!("amount {} not representable for gateway", amount))
        })?;

        let expire = now + Duration::minutes(15);

        let mut params = BTreeMap::new();
        params.insert("vnp_Version", "2.1.0".to_string());
        params.insert("vnp_Command", "pay".to_string());
        params.insert("vnp_TmnCode", self.cfg.tmn_code.clone());
        params.insert("vnp_Amount", minor_amount.to_string());
        params.insert("vnp_CurrCode", "VND".to_string());
        params.insert(PARAM_TXN_REF, order_ref.to_string());
        params.insert("vnp_OrderInfo", order_info.to_string());
        params.insert("vnp_OrderType", "other".to_string());
        params.insert("vnp_Locale", "vn".to_string());
        params.insert("vnp_ReturnUrl", self.cfg.return_url.clone());
        params.insert("vnp_IpAddr", client_ip.to_string());
        params.insert("vnp_CreateDate", now.format(DATE_FORMAT).to_string());
        params.insert("vnp_ExpireDate", expire.format(DATE_FORMAT).to_string());

        let canonical = canonical_query(params.iter().map(|(k, v)| (*k, v.as_str())));
        let signature = self.sign(&canonical);

        Ok(format!(
            "{}?{}&{}={}",
            self.cfg.pay_url, canonical, PARAM_SECURE_HASH, signature
        ))
    }

    /// Verifies an inbound callback: recomputes the signature over every
    /// parameter except the hash fields themselves and compares in constant
    /// time. Any mismatch is a hard reject.
    pub fn verify_callback(&self, params: &HashMap<String, String>) -> bool {
        let Some(received) = params.get(PARAM_SECURE_HASH) else {
            warn!("Gateway callback carried no signature");
            return false;
        };

        let canonical = canonical_query(
            params
                .iter()
                .filter(|(k, _)| *k != PARAM_SECURE_HASH && *k != PARAM_SECURE_HASH_TYPE)
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect::<BTreeMap<_, _>>()
                .into_iter(),
        );
        let expected = self.sign(&canonical);

        constant_time_eq(&expected, received)
    }

    fn sign(&self, canonical: &str) -> String {
        let mut mac = HmacSha512::new_from_slice(self.cfg.hash_secret.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
        mac.update(canonical.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// `k=v` pairs joined by `&`, keys in ascending order, values form-encoded.
fn canonical_query<'a>(sorted: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    sorted
        .map(|(k, v)| format!("{}={}", k, encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
