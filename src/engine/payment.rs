use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use rust_decimal::Decimal;

const VIETQR_BASE: &str = "https://img.vietqr.io/image";

/// Bank-transfer QR image link for a ticket payment.
pub fn vietqr_url(bank_id: &str, bank_account: &str, amount: Decimal, plate: &str) -> String {
    let description = format!("Thanh toan ve xe {plate}");
    format!(
        "{VIETQR_BASE}/{bank_id}-{bank_account}-compact2.png?amount={}&addInfo={}",
        amount.trunc(),
        utf8_percent_encode(&description, NON_ALPHANUMERIC)
    )
}
