//! Mock brokerage for testing: scripted replies with call recording.
//!
//! Use this in integration tests to simulate upstream responses without
//! network calls.
//!
//! ```ignore
//! use folio::Exchange;
//! use folio_broker::mock::{MockBroker, OrderScript};
//!
//! let broker = MockBroker::builder()
//!     .with_domestic_quote("005930", "Samsung Electronics", 71_000)
//!     .with_quote_failure(
//!         QuoteId::Foreign { ticker: "SPY".into(), exchange: Exchange::Nasdaq },
//!         "timeout",
//!     )
//!     .with_order_script("SPY", OrderScript::Expire)
//!     .build();
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::credential::Credentials;
use crate::error::BrokerError;
use crate::types::*;
use crate::{AccountSync, AuthClient, BalanceSource, OrderPlacement, QuoteSource};

type Scripted<T> = Result<Reply<T>, String>;

fn play<T: Clone>(script: Option<&Scripted<T>>) -> Result<Reply<T>, BrokerError> {
    match script {
        Some(Ok(reply)) => Ok(reply.clone()),
        Some(Err(msg)) => Err(BrokerError::Connection(format!("mock: {msg}"))),
        None => Ok(Reply::Empty),
    }
}

/// How the mock answers one order submission.
#[derive(Clone, Debug)]
pub enum OrderScript {
    /// Accepted with status code `"0"`.
    Accept,
    /// Answered with a non-success status code.
    Reject { code: String, message: String },
    /// Token rejected as expired.
    Expire,
    /// Transport failure.
    Fail(String),
}

/// A recorded order submission for assertion in tests.
#[derive(Clone, Debug)]
pub struct RecordedOrder {
    pub order: OrderRequest,
    /// Token the order was authorized with, when credentials are attached.
    pub token: Option<String>,
}

/// Builder for `MockBroker`.
#[derive(Default)]
pub struct MockBrokerBuilder {
    quotes: HashMap<QuoteId, Scripted<RawQuote>>,
    closes: HashMap<(QuoteId, NaiveDate), Scripted<Decimal>>,
    names: HashMap<String, Scripted<String>>,
    orders: HashMap<String, VecDeque<OrderScript>>,
    balances: Vec<BalanceEntry>,
    sync_failure: Option<String>,
    credentials: Option<Credentials>,
}

impl MockBrokerBuilder {
    pub fn with_quote(mut self, id: QuoteId, name: &str, price: Decimal) -> Self {
        self.quotes.insert(
            id,
            Ok(Reply::Data(RawQuote {
                name: name.to_string(),
                price,
                currency: None,
            })),
        );
        self
    }

    pub fn with_domestic_quote(self, ticker: &str, name: &str, price: i64) -> Self {
        self.with_quote(QuoteId::Domestic(ticker.to_string()), name, Decimal::from(price))
    }

    pub fn with_quote_reply(mut self, id: QuoteId, reply: Reply<RawQuote>) -> Self {
        self.quotes.insert(id, Ok(reply));
        self
    }

    pub fn with_quote_failure(mut self, id: QuoteId, message: &str) -> Self {
        self.quotes.insert(id, Err(message.to_string()));
        self
    }

    pub fn with_close(mut self, id: QuoteId, date: NaiveDate, close: Decimal) -> Self {
        self.closes.insert((id, date), Ok(Reply::Data(close)));
        self
    }

    pub fn with_close_failure(mut self, id: QuoteId, date: NaiveDate, message: &str) -> Self {
        self.closes.insert((id, date), Err(message.to_string()));
        self
    }

    pub fn with_name(mut self, ticker: &str, name: &str) -> Self {
        self.names
            .insert(ticker.to_string(), Ok(Reply::Data(name.to_string())));
        self
    }

    pub fn with_name_failure(mut self, ticker: &str, message: &str) -> Self {
        self.names
            .insert(ticker.to_string(), Err(message.to_string()));
        self
    }

    /// Queue an outcome for the next submission of `ticker`. Unscripted
    /// submissions are accepted.
    pub fn with_order_script(mut self, ticker: &str, script: OrderScript) -> Self {
        self.orders
            .entry(ticker.to_string())
            .or_default()
            .push_back(script);
        self
    }

    pub fn with_balance(mut self, ticker: &str, quantity: Decimal) -> Self {
        self.balances.push(BalanceEntry {
            ticker: ticker.to_string(),
            name: String::new(),
            quantity,
            exchange: None,
        });
        self
    }

    pub fn sync_fails(mut self, message: &str) -> Self {
        self.sync_failure = Some(message.to_string());
        self
    }

    /// Authorize orders through `credentials` and record the token used.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn build(self) -> MockBroker {
        MockBroker {
            quotes: self.quotes,
            closes: self.closes,
            names: self.names,
            order_scripts: Mutex::new(self.orders),
            balances: self.balances,
            sync_failure: self.sync_failure,
            credentials: self.credentials,
            next_order_no: AtomicU32::new(1),
            quote_calls: Mutex::new(Vec::new()),
            historical_calls: Mutex::new(Vec::new()),
            name_calls: Mutex::new(Vec::new()),
            submitted_orders: Mutex::new(Vec::new()),
            sync_calls: AtomicU32::new(0),
        }
    }
}

/// A mock brokerage that records every call and returns scripted replies.
///
/// Unscripted quotes, closes, and names answer `Reply::Empty`.
pub struct MockBroker {
    quotes: HashMap<QuoteId, Scripted<RawQuote>>,
    closes: HashMap<(QuoteId, NaiveDate), Scripted<Decimal>>,
    names: HashMap<String, Scripted<String>>,
    order_scripts: Mutex<HashMap<String, VecDeque<OrderScript>>>,
    balances: Vec<BalanceEntry>,
    sync_failure: Option<String>,
    credentials: Option<Credentials>,
    next_order_no: AtomicU32,
    quote_calls: Mutex<Vec<QuoteId>>,
    historical_calls: Mutex<Vec<(QuoteId, NaiveDate)>>,
    name_calls: Mutex<Vec<String>>,
    submitted_orders: Mutex<Vec<RecordedOrder>>,
    sync_calls: AtomicU32,
}

impl MockBroker {
    pub fn builder() -> MockBrokerBuilder {
        MockBrokerBuilder::default()
    }

    /// Every current-price request, in order.
    pub fn quote_calls(&self) -> Vec<QuoteId> {
        self.quote_calls.lock().unwrap().clone()
    }

    pub fn historical_calls(&self) -> Vec<(QuoteId, NaiveDate)> {
        self.historical_calls.lock().unwrap().clone()
    }

    pub fn name_calls(&self) -> Vec<String> {
        self.name_calls.lock().unwrap().clone()
    }

    /// All submissions, including ones answered with a failure.
    pub fn submitted_orders(&self) -> Vec<RecordedOrder> {
        self.submitted_orders.lock().unwrap().clone()
    }

    pub fn sync_calls(&self) -> u32 {
        self.sync_calls.load(Ordering::SeqCst)
    }

    fn accepted(&self, order: &OrderRequest) -> OrderAck {
        let no = self.next_order_no.fetch_add(1, Ordering::SeqCst);
        let order_no = format!("{no:010}");
        OrderAck {
            status_code: OrderAck::SUCCESS.to_string(),
            message_code: "APBK0013".to_string(),
            message: "order accepted".to_string(),
            order_no: Some(order_no.clone()),
            raw: serde_json::json!({
                "rt_cd": "0",
                "output": { "ODNO": order_no, "PDNO": order.ticker },
            }),
        }
    }
}

impl QuoteSource for MockBroker {
    fn fetch(&self, id: &QuoteId) -> Result<Reply<RawQuote>, BrokerError> {
        self.quote_calls.lock().unwrap().push(id.clone());
        play(self.quotes.get(id))
    }

    fn fetch_historical(
        &self,
        id: &QuoteId,
        date: NaiveDate,
    ) -> Result<Reply<Decimal>, BrokerError> {
        self.historical_calls
            .lock()
            .unwrap()
            .push((id.clone(), date));
        play(self.closes.get(&(id.clone(), date)))
    }

    fn lookup_name(&self, ticker: &str) -> Result<Reply<String>, BrokerError> {
        self.name_calls.lock().unwrap().push(ticker.to_string());
        play(self.names.get(ticker))
    }
}

impl OrderPlacement for MockBroker {
    fn place_order(&self, order: &OrderRequest) -> Result<Reply<OrderAck>, BrokerError> {
        let token = match &self.credentials {
            Some(creds) => Some(creds.token()?),
            None => None,
        };
        self.submitted_orders.lock().unwrap().push(RecordedOrder {
            order: order.clone(),
            token,
        });

        let script = self
            .order_scripts
            .lock()
            .unwrap()
            .get_mut(&order.ticker)
            .and_then(VecDeque::pop_front)
            .unwrap_or(OrderScript::Accept);

        match script {
            OrderScript::Accept => Ok(Reply::Data(self.accepted(order))),
            OrderScript::Reject { code, message } => Ok(Reply::Data(OrderAck {
                status_code: "1".to_string(),
                message_code: code.clone(),
                message: message.clone(),
                order_no: None,
                raw: serde_json::json!({ "rt_cd": "1", "msg_cd": code, "msg1": message }),
            })),
            OrderScript::Expire => Ok(Reply::Expired),
            OrderScript::Fail(msg) => Err(BrokerError::Order(format!("mock: {msg}"))),
        }
    }
}

impl BalanceSource for MockBroker {
    fn balances(&self) -> Result<Vec<BalanceEntry>, BrokerError> {
        Ok(self.balances.clone())
    }
}

impl AccountSync for MockBroker {
    fn sync_account(&self) -> Result<(), BrokerError> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        match &self.sync_failure {
            Some(msg) => Err(BrokerError::Connection(format!("mock: {msg}"))),
            None => Ok(()),
        }
    }
}

/// Authentication double issuing `token-1`, `token-2`, ... and counting calls.
///
/// Clones share the counter, so a test can keep one handle while the other
/// lives inside a credential manager.
#[derive(Clone, Debug)]
pub struct MockAuth {
    calls: Arc<AtomicU32>,
    valid_for: Duration,
    fail: bool,
}

impl MockAuth {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            valid_for: Duration::hours(24),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn valid_for(mut self, valid_for: Duration) -> Self {
        self.valid_for = valid_for;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthClient for MockAuth {
    fn request_credential(&self) -> Result<Credential, BrokerError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            return Err(BrokerError::Auth("mock: credentials rejected".into()));
        }
        Ok(Credential::new(format!("token-{n}"), Utc::now() + self.valid_for))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio::{Exchange, Side};
    use rust_decimal_macros::dec;

    fn spy_nas() -> QuoteId {
        QuoteId::Foreign {
            ticker: "SPY".into(),
            exchange: Exchange::Nasdaq,
        }
    }

    fn order(ticker: &str) -> OrderRequest {
        OrderRequest {
            ticker: ticker.into(),
            side: Side::Buy,
            quantity: 3,
            currency: "USD".into(),
            exchange: Some(Exchange::Nasdaq),
        }
    }

    #[test]
    fn scripted_quotes_and_recording() {
        let broker = MockBroker::builder()
            .with_quote(spy_nas(), "SPDR S&P 500", dec!(512.30))
            .with_quote_failure(QuoteId::Domestic("005930".into()), "timeout")
            .build();

        let reply = broker.fetch(&spy_nas()).unwrap();
        assert_eq!(reply.data().unwrap().price, dec!(512.30));
        assert!(broker.fetch(&QuoteId::Domestic("005930".into())).is_err());
        assert_eq!(
            broker.fetch(&QuoteId::Domestic("000660".into())).unwrap(),
            Reply::Empty
        );
        assert_eq!(broker.quote_calls().len(), 3);
    }

    #[test]
    fn order_scripts_play_in_sequence() {
        let broker = MockBroker::builder()
            .with_order_script("SPY", OrderScript::Expire)
            .with_order_script(
                "SPY",
                OrderScript::Reject {
                    code: "APBK0919".into(),
                    message: "insufficient cash".into(),
                },
            )
            .build();

        assert!(broker.place_order(&order("SPY")).unwrap().is_expired());
        let ack = broker.place_order(&order("SPY")).unwrap().data().unwrap();
        assert!(!ack.is_success());
        let ack = broker.place_order(&order("SPY")).unwrap().data().unwrap();
        assert!(ack.is_success());
        assert_eq!(broker.submitted_orders().len(), 3);
    }

    #[test]
    fn transport_failure() {
        let broker = MockBroker::builder()
            .with_order_script("QQQ", OrderScript::Fail("reset by peer".into()))
            .build();
        assert!(matches!(
            broker.place_order(&order("QQQ")),
            Err(BrokerError::Order(_))
        ));
    }

    #[test]
    fn sync_failure_counts_call() {
        let broker = MockBroker::builder().sync_fails("gateway down").build();
        assert!(broker.sync_account().is_err());
        assert_eq!(broker.sync_calls(), 1);
    }

    #[test]
    fn mock_auth_counts_and_numbers_tokens() {
        let auth = MockAuth::new();
        let handle = auth.clone();
        assert_eq!(auth.request_credential().unwrap().token, "token-1");
        assert_eq!(auth.request_credential().unwrap().token, "token-2");
        assert_eq!(handle.calls(), 2);
        assert!(MockAuth::failing().request_credential().is_err());
    }
}
