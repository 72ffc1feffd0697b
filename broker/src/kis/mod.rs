//! Brokerage open-API implementation of the collaborator traits.
//!
//! Blocking (sync) via reqwest::blocking. Read paths (quotes, names, closes,
//! balances) refresh the credential once on an expired-token answer; order
//! placement returns `Reply::Expired` untouched so the caller decides.

pub mod auth;
pub mod client;
pub mod types;

use chrono::{Duration, NaiveDate};
use folio::{Exchange, Market, Side};
use log::{debug, warn};
use rust_decimal::Decimal;
use serde_json::json;

use crate::credential::Credentials;
use crate::error::BrokerError;
use crate::types::*;
use crate::{BalanceSource, OrderPlacement, QuoteSource};
use client::KisClient;
use types::*;

/// Unwrap `Reply::Data`, returning any other reply from the enclosing fn.
macro_rules! data_or_return {
    ($reply:expr) => {
        match $reply {
            Reply::Data(data) => data,
            Reply::Empty => return Ok(Reply::Empty),
            Reply::Expired => return Ok(Reply::Expired),
        }
    };
}

/// Account number pair the trading endpoints require.
#[derive(Debug, Clone)]
pub struct KisAccount {
    /// 8-digit account number (`CANO`).
    pub number: String,
    /// 2-digit product code (`ACNT_PRDT_CD`).
    pub product_code: String,
}

/// Quote source, order placement, and balance source over the open API.
pub struct KisBroker {
    client: KisClient,
    credentials: Credentials,
    account: KisAccount,
}

impl KisBroker {
    pub fn new(client: KisClient, credentials: Credentials, account: KisAccount) -> Self {
        Self {
            client,
            credentials,
            account,
        }
    }

    /// Run a read call with the current token, refreshing once if rejected.
    fn read<T>(
        &self,
        call: impl Fn(&str) -> Result<Reply<T>, BrokerError>,
    ) -> Result<Reply<T>, BrokerError> {
        let token = self.credentials.token()?;
        match call(&token)? {
            Reply::Expired => {
                warn!("Token rejected on read, refreshing once");
                let token = self.credentials.refresh()?;
                call(&token)
            }
            reply => Ok(reply),
        }
    }

    fn domestic_price(&self, token: &str, ticker: &str) -> Result<Reply<RawQuote>, BrokerError> {
        let reply = self.client.get(
            token,
            "/uapi/domestic-stock/v1/quotations/inquire-price",
            "FHKST01010100",
            &[("FID_COND_MRKT_DIV_CODE", "J"), ("FID_INPUT_ISCD", ticker)],
        )?;
        let env = data_or_return!(reply);
        if !env.is_success() {
            debug!("{ticker}: {} {}", env.msg_cd, env.msg1);
            return Ok(Reply::Empty);
        }
        let price = env
            .output::<DomesticPrice>("output")?
            .and_then(|o| parse_decimal(&o.stck_prpr));
        Ok(match price {
            Some(price) => Reply::Data(RawQuote {
                // inquire-price carries no display name
                name: String::new(),
                price,
                currency: Some(folio::DOMESTIC_CURRENCY.to_string()),
            }),
            None => Reply::Empty,
        })
    }

    fn foreign_price(
        &self,
        token: &str,
        ticker: &str,
        exchange: Exchange,
    ) -> Result<Reply<RawQuote>, BrokerError> {
        let reply = self.client.get(
            token,
            "/uapi/overseas-price/v1/quotations/price-detail",
            "HHDFS76200200",
            &[("AUTH", ""), ("EXCD", exchange.quote_code()), ("SYMB", ticker)],
        )?;
        let env = data_or_return!(reply);
        if !env.is_success() {
            return Ok(Reply::Empty);
        }
        let Some(detail) = env.output::<ForeignPrice>("output")? else {
            return Ok(Reply::Empty);
        };
        let Some(price) = parse_decimal(&detail.last) else {
            return Ok(Reply::Empty);
        };
        let currency = if detail.curr.is_empty() {
            folio::FOREIGN_CURRENCY.to_string()
        } else {
            detail.curr
        };
        let name = match self.foreign_name(token, ticker, exchange) {
            Ok(Reply::Data(name)) => name,
            Ok(_) => String::new(),
            Err(e) => {
                debug!("{ticker}@{exchange}: name lookup failed: {e}");
                String::new()
            }
        };
        Ok(Reply::Data(RawQuote {
            name,
            price,
            currency: Some(currency),
        }))
    }

    fn foreign_name(
        &self,
        token: &str,
        ticker: &str,
        exchange: Exchange,
    ) -> Result<Reply<String>, BrokerError> {
        let reply = self.client.get(
            token,
            "/uapi/overseas-price/v1/quotations/search-info",
            "CTPF1702R",
            &[("PRDT_TYPE_CD", product_type_code(exchange)), ("PDNO", ticker)],
        )?;
        Ok(match reply {
            Reply::Data(env) if env.is_success() => env
                .output::<ForeignInfo>("output")?
                .map(|o| o.prdt_eng_name.trim().to_string())
                .filter(|n| !n.is_empty())
                .map_or(Reply::Empty, Reply::Data),
            Reply::Expired => Reply::Expired,
            _ => Reply::Empty,
        })
    }

    fn domestic_close(
        &self,
        token: &str,
        ticker: &str,
        date: NaiveDate,
    ) -> Result<Reply<Decimal>, BrokerError> {
        // A two-week window covers holidays before `date`.
        let from = (date - Duration::days(14)).format("%Y%m%d").to_string();
        let to = date.format("%Y%m%d").to_string();
        let reply = self.client.get(
            token,
            "/uapi/domestic-stock/v1/quotations/inquire-daily-itemchartprice",
            "FHKST03010100",
            &[
                ("FID_COND_MRKT_DIV_CODE", "J"),
                ("FID_INPUT_ISCD", ticker),
                ("FID_INPUT_DATE_1", from.as_str()),
                ("FID_INPUT_DATE_2", to.as_str()),
                ("FID_PERIOD_DIV_CODE", "D"),
                ("FID_ORG_ADJ_PRC", "0"),
            ],
        )?;
        let env = data_or_return!(reply);
        let rows = env.output::<Vec<DomesticDaily>>("output2")?.unwrap_or_default();
        let close = close_on_or_before(
            rows.into_iter().map(|r| (r.stck_bsop_date, r.stck_clpr)),
            date,
        );
        Ok(close.map_or(Reply::Empty, Reply::Data))
    }

    fn foreign_close(
        &self,
        token: &str,
        ticker: &str,
        exchange: Exchange,
        date: NaiveDate,
    ) -> Result<Reply<Decimal>, BrokerError> {
        let bymd = date.format("%Y%m%d").to_string();
        let reply = self.client.get(
            token,
            "/uapi/overseas-price/v1/quotations/dailyprice",
            "HHDFS76240000",
            &[
                ("AUTH", ""),
                ("EXCD", exchange.quote_code()),
                ("SYMB", ticker),
                ("GUBN", "0"),
                ("BYMD", bymd.as_str()),
                ("MODP", "1"),
            ],
        )?;
        let env = data_or_return!(reply);
        let rows = env.output::<Vec<ForeignDaily>>("output2")?.unwrap_or_default();
        let close = close_on_or_before(rows.into_iter().map(|r| (r.xymd, r.clos)), date);
        Ok(close.map_or(Reply::Empty, Reply::Data))
    }

    fn domestic_balances(&self, token: &str) -> Result<Reply<Vec<BalanceEntry>>, BrokerError> {
        let reply = self.client.get(
            token,
            "/uapi/domestic-stock/v1/trading/inquire-balance",
            "TTTC8434R",
            &[
                ("CANO", self.account.number.as_str()),
                ("ACNT_PRDT_CD", self.account.product_code.as_str()),
                ("AFHR_FLPR_YN", "N"),
                ("OFL_YN", ""),
                ("INQR_DVSN", "02"),
                ("UNPR_DVSN", "01"),
                ("FUND_STTL_ICLD_YN", "N"),
                ("FNCG_AMT_AUTO_RDPT_YN", "N"),
                ("PRCS_DVSN", "00"),
                ("CTX_AREA_FK100", ""),
                ("CTX_AREA_NK100", ""),
            ],
        )?;
        let env = data_or_return!(reply);
        if !env.is_success() {
            return Err(BrokerError::Rejected {
                code: env.msg_cd,
                message: env.msg1,
            });
        }
        let rows = env.output::<Vec<DomesticHolding>>("output1")?.unwrap_or_default();
        Ok(Reply::Data(rows.into_iter().map(DomesticHolding::into_entry).collect()))
    }

    fn foreign_balances(
        &self,
        token: &str,
        exchange: Exchange,
    ) -> Result<Reply<Vec<BalanceEntry>>, BrokerError> {
        let reply = self.client.get(
            token,
            "/uapi/overseas-stock/v1/trading/inquire-balance",
            "TTTS3012R",
            &[
                ("CANO", self.account.number.as_str()),
                ("ACNT_PRDT_CD", self.account.product_code.as_str()),
                ("OVRS_EXCG_CD", exchange.order_code()),
                ("TR_CRCY_CD", folio::FOREIGN_CURRENCY),
                ("CTX_AREA_FK200", ""),
                ("CTX_AREA_NK200", ""),
            ],
        )?;
        let env = data_or_return!(reply);
        if !env.is_success() {
            return Err(BrokerError::Rejected {
                code: env.msg_cd,
                message: env.msg1,
            });
        }
        let rows = env.output::<Vec<ForeignHolding>>("output1")?.unwrap_or_default();
        Ok(Reply::Data(
            rows.into_iter()
                .map(|row| {
                    let mut entry = row.into_entry();
                    entry.exchange.get_or_insert(exchange);
                    entry
                })
                .collect(),
        ))
    }
}

impl QuoteSource for KisBroker {
    fn fetch(&self, id: &QuoteId) -> Result<Reply<RawQuote>, BrokerError> {
        match id {
            QuoteId::Domestic(ticker) => self.read(|t| self.domestic_price(t, ticker)),
            QuoteId::Foreign { ticker, exchange } => {
                self.read(|t| self.foreign_price(t, ticker, *exchange))
            }
        }
    }

    fn fetch_historical(
        &self,
        id: &QuoteId,
        date: NaiveDate,
    ) -> Result<Reply<Decimal>, BrokerError> {
        match id {
            QuoteId::Domestic(ticker) => self.read(|t| self.domestic_close(t, ticker, date)),
            QuoteId::Foreign { ticker, exchange } => {
                self.read(|t| self.foreign_close(t, ticker, *exchange, date))
            }
        }
    }

    fn lookup_name(&self, ticker: &str) -> Result<Reply<String>, BrokerError> {
        self.read(|token| {
            let reply = self.client.get(
                token,
                "/uapi/domestic-stock/v1/quotations/search-stock-info",
                "CTPF1002R",
                &[("PRDT_TYPE_CD", "300"), ("PDNO", ticker)],
            )?;
            Ok(match reply {
                Reply::Data(env) if env.is_success() => env
                    .output::<DomesticInfo>("output")?
                    .map(|o| o.prdt_abrv_name.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .map_or(Reply::Empty, Reply::Data),
                Reply::Expired => Reply::Expired,
                _ => Reply::Empty,
            })
        })
    }
}

impl OrderPlacement for KisBroker {
    fn place_order(&self, order: &OrderRequest) -> Result<Reply<OrderAck>, BrokerError> {
        let token = self.credentials.token()?;
        let qty = order.quantity.to_string();

        let foreign = order.exchange.is_some() || Market::classify(&order.ticker).is_foreign();
        let reply = if foreign {
            let exchange = order.exchange.unwrap_or(Exchange::DEFAULT_ROUTE);
            let tr_id = match order.side {
                Side::Buy => "TTTT1002U",
                Side::Sell => "TTTT1006U",
            };
            let body = json!({
                "CANO": self.account.number,
                "ACNT_PRDT_CD": self.account.product_code,
                "OVRS_EXCG_CD": exchange.order_code(),
                "PDNO": order.ticker,
                "ORD_QTY": qty,
                "OVRS_ORD_UNPR": "0",
                "ORD_SVR_DVSN_CD": "0",
                "ORD_DVSN": "00",
            });
            self.client
                .post(&token, "/uapi/overseas-stock/v1/trading/order", tr_id, &body)
        } else {
            let tr_id = match order.side {
                Side::Buy => "TTTC0802U",
                Side::Sell => "TTTC0801U",
            };
            // ORD_DVSN 01: market order
            let body = json!({
                "CANO": self.account.number,
                "ACNT_PRDT_CD": self.account.product_code,
                "PDNO": order.ticker,
                "ORD_DVSN": "01",
                "ORD_QTY": qty,
                "ORD_UNPR": "0",
            });
            self.client
                .post(&token, "/uapi/domestic-stock/v1/trading/order-cash", tr_id, &body)
        };

        match reply {
            Ok(reply) => Ok(reply.map(Envelope::into_ack)),
            Err(BrokerError::Connection(msg)) => Err(BrokerError::Order(msg)),
            Err(e) => Err(e),
        }
    }
}

impl BalanceSource for KisBroker {
    fn balances(&self) -> Result<Vec<BalanceEntry>, BrokerError> {
        let mut entries = match self.read(|t| self.domestic_balances(t))? {
            Reply::Data(rows) => rows,
            Reply::Empty => Vec::new(),
            Reply::Expired => return Err(BrokerError::CredentialExpired),
        };
        for exchange in Exchange::DEFAULT_SCAN {
            match self.read(|t| self.foreign_balances(t, exchange))? {
                Reply::Data(rows) => entries.extend(rows),
                Reply::Empty => {}
                Reply::Expired => return Err(BrokerError::CredentialExpired),
            }
        }
        Ok(entries
            .into_iter()
            .filter(|e| !e.quantity.is_zero())
            .collect())
    }
}
