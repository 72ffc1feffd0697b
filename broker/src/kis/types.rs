//! Brokerage open-API response shapes and pure parsing helpers.

use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use folio::Exchange;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::error::BrokerError;
use crate::types::{BalanceEntry, Credential, OrderAck, Reply};

/// Message codes the gateway answers with when the bearer token is stale.
pub const EXPIRED_MESSAGE_CODES: [&str; 2] = ["EGW00123", "EGW00121"];

/// Common response envelope: `rt_cd`, `msg_cd`, `msg1`, and the outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub rt_cd: String,
    pub msg_cd: String,
    pub msg1: String,
    pub body: Value,
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let body: Value = serde_json::from_str(text)?;
        let field = |k: &str| {
            body.get(k)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string()
        };
        Ok(Self {
            rt_cd: field("rt_cd"),
            msg_cd: field("msg_cd"),
            msg1: field("msg1"),
            body,
        })
    }

    pub fn is_success(&self) -> bool {
        self.rt_cd == OrderAck::SUCCESS
    }

    pub fn is_expired(&self) -> bool {
        EXPIRED_MESSAGE_CODES.contains(&self.msg_cd.as_str())
    }

    /// Deserialize `output` (or `output1`/`output2`) into a typed shape.
    pub fn output<T: for<'de> Deserialize<'de>>(
        &self,
        key: &str,
    ) -> Result<Option<T>, BrokerError> {
        match self.body.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
        }
    }

    /// Convert an order response into an acknowledgement.
    pub fn into_ack(self) -> OrderAck {
        let order_no = self
            .body
            .get("output")
            .and_then(|o| o.get("ODNO"))
            .and_then(Value::as_str)
            .map(str::to_string);
        OrderAck {
            status_code: self.rt_cd,
            message_code: self.msg_cd,
            message: self.msg1,
            order_no,
            raw: self.body,
        }
    }
}

/// Classify a raw HTTP answer into the explicit reply boundary.
///
/// The gateway signals an expired token with an error status and a JSON
/// body carrying one of [`EXPIRED_MESSAGE_CODES`], so the body is inspected
/// before the status.
pub fn classify(status: u16, text: &str) -> Result<Reply<Envelope>, BrokerError> {
    let ok = (200..300).contains(&status);
    let envelope = match Envelope::parse(text) {
        Ok(e) => e,
        Err(e) if ok => return Err(BrokerError::InvalidPayload(e.to_string())),
        Err(_) => {
            return Err(BrokerError::Connection(format!("HTTP {status}: {text}")));
        }
    };
    if envelope.is_expired() {
        return Ok(Reply::Expired);
    }
    if !ok {
        return Err(BrokerError::Connection(format!(
            "HTTP {status}: {} {}",
            envelope.msg_cd, envelope.msg1
        )));
    }
    Ok(Reply::Data(envelope))
}

/// Parse a decimal string field; empty or malformed strings are `None`.
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(s).ok()
}

fn parse_yyyymmdd(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y%m%d").ok()
}

/// Token endpoint answer.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenResponse {
    pub fn into_credential(self, now: DateTime<Utc>) -> Result<Credential, BrokerError> {
        if self.access_token.is_empty() {
            return Err(BrokerError::Auth(format!(
                "{}: {}",
                self.error_code.unwrap_or_else(|| "no token".into()),
                self.error_description.unwrap_or_default()
            )));
        }
        if self.expires_in <= 0 {
            return Err(BrokerError::InvalidPayload(format!(
                "token lifetime {} is not positive",
                self.expires_in
            )));
        }
        Ok(Credential::new(
            self.access_token,
            now + Duration::seconds(self.expires_in),
        ))
    }
}

/// Domestic current price (`inquire-price`).
#[derive(Debug, Deserialize)]
pub struct DomesticPrice {
    #[serde(default)]
    pub stck_prpr: String,
}

/// Foreign current price (`price-detail`).
#[derive(Debug, Deserialize)]
pub struct ForeignPrice {
    #[serde(default)]
    pub last: String,
    #[serde(default)]
    pub curr: String,
}

/// Domestic product info (`search-stock-info`).
#[derive(Debug, Deserialize)]
pub struct DomesticInfo {
    #[serde(default)]
    pub prdt_abrv_name: String,
}

/// Foreign product info (`search-info`).
#[derive(Debug, Deserialize)]
pub struct ForeignInfo {
    #[serde(default)]
    pub prdt_eng_name: String,
}

/// One row of the domestic daily chart.
#[derive(Debug, Deserialize)]
pub struct DomesticDaily {
    #[serde(default)]
    pub stck_bsop_date: String,
    #[serde(default)]
    pub stck_clpr: String,
}

/// One row of the foreign daily price list.
#[derive(Debug, Deserialize)]
pub struct ForeignDaily {
    #[serde(default)]
    pub xymd: String,
    #[serde(default)]
    pub clos: String,
}

/// Latest close on or before `date` among `(date, close)` rows in any order.
pub fn close_on_or_before<I>(rows: I, date: NaiveDate) -> Option<Decimal>
where
    I: IntoIterator<Item = (String, String)>,
{
    rows.into_iter()
        .filter_map(|(d, c)| Some((parse_yyyymmdd(&d)?, parse_decimal(&c)?)))
        .filter(|(d, c)| *d <= date && !c.is_zero())
        .max_by_key(|(d, _)| *d)
        .map(|(_, c)| c)
}

/// Domestic balance row (`inquire-balance`, `output1`).
#[derive(Debug, Deserialize)]
pub struct DomesticHolding {
    pub pdno: String,
    #[serde(default)]
    pub prdt_name: String,
    #[serde(default)]
    pub hldg_qty: String,
}

impl DomesticHolding {
    pub fn into_entry(self) -> BalanceEntry {
        BalanceEntry {
            quantity: parse_decimal(&self.hldg_qty).unwrap_or_default(),
            ticker: self.pdno,
            name: self.prdt_name,
            exchange: None,
        }
    }
}

/// Foreign balance row (`inquire-balance`, `output1`).
#[derive(Debug, Deserialize)]
pub struct ForeignHolding {
    pub ovrs_pdno: String,
    #[serde(default)]
    pub ovrs_item_name: String,
    #[serde(default)]
    pub ovrs_cblc_qty: String,
    #[serde(default)]
    pub ovrs_excg_cd: String,
}

impl ForeignHolding {
    pub fn into_entry(self) -> BalanceEntry {
        BalanceEntry {
            quantity: parse_decimal(&self.ovrs_cblc_qty).unwrap_or_default(),
            exchange: self.ovrs_excg_cd.parse::<Exchange>().ok(),
            ticker: self.ovrs_pdno,
            name: self.ovrs_item_name,
        }
    }
}

/// Product type code the foreign info lookup expects per exchange.
pub fn product_type_code(exchange: Exchange) -> &'static str {
    match exchange {
        Exchange::Nasdaq => "512",
        Exchange::Nyse => "513",
        Exchange::Amex => "529",
    }
}
