//! Order gateway used by rebalancer execution.

use folio_broker::{BrokerError, Credentials, OrderAck, OrderPlacement, OrderRequest, Reply};
use log::{info, warn};

pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// Minimal order API needed by the executor.
pub trait OrderGateway {
    /// Submit one order. An acknowledgement with a non-success status is
    /// still `Ok`; the caller inspects it.
    fn submit(&self, order: &OrderRequest) -> BrokerResult<OrderAck>;
}

/// Wraps an order placement client with the single expired-credential retry:
/// on `Reply::Expired` it refreshes once and resubmits the identical request
/// once. A second failure of any kind is returned as is.
pub struct RefreshingGateway<P> {
    placement: P,
    credentials: Credentials,
}

impl<P: OrderPlacement> RefreshingGateway<P> {
    pub fn new(placement: P, credentials: Credentials) -> Self {
        Self {
            placement,
            credentials,
        }
    }

    pub fn placement(&self) -> &P {
        &self.placement
    }
}

fn into_ack(reply: Reply<OrderAck>, order: &OrderRequest) -> BrokerResult<OrderAck> {
    match reply {
        Reply::Data(ack) => Ok(ack),
        Reply::Empty => Err(BrokerError::InvalidPayload(format!(
            "empty order response for {}",
            order.ticker
        ))),
        Reply::Expired => Err(BrokerError::CredentialExpired),
    }
}

impl<P: OrderPlacement> OrderGateway for RefreshingGateway<P> {
    fn submit(&self, order: &OrderRequest) -> BrokerResult<OrderAck> {
        match self.placement.place_order(order)? {
            Reply::Expired => {
                info!("Credential expired placing {}, refreshing once", order.ticker);
                self.credentials.refresh()?;
                let reply = self.placement.place_order(order)?;
                if reply.is_expired() {
                    warn!("Credential rejected again for {}", order.ticker);
                }
                into_ack(reply, order)
            }
            reply => into_ack(reply, order),
        }
    }
}

impl<T: OrderGateway + ?Sized> OrderGateway for &T {
    fn submit(&self, order: &OrderRequest) -> BrokerResult<OrderAck> {
        (**self).submit(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio::{Exchange, Side};
    use folio_broker::mock::{MockAuth, MockBroker, OrderScript};
    use folio_broker::{CredentialManager, MemoryCredentialStore};

    fn order() -> OrderRequest {
        OrderRequest {
            ticker: "SPY".into(),
            side: Side::Sell,
            quantity: 1,
            currency: "USD".into(),
            exchange: Some(Exchange::Nyse),
        }
    }

    fn creds(auth: &MockAuth) -> Credentials {
        Credentials::new(CredentialManager::new(
            auth.clone(),
            MemoryCredentialStore::new(),
        ))
    }

    #[test]
    fn expired_then_success_refreshes_once() {
        let auth = MockAuth::new();
        let creds = creds(&auth);
        let broker = MockBroker::builder()
            .with_credentials(creds.clone())
            .with_order_script("SPY", OrderScript::Expire)
            .build();
        let gateway = RefreshingGateway::new(&broker, creds);

        let ack = gateway.submit(&order()).unwrap();
        assert!(ack.is_success());
        assert_eq!(auth.calls(), 2, "initial issue plus one refresh");
        let tokens: Vec<_> = broker
            .submitted_orders()
            .into_iter()
            .map(|r| r.token.unwrap())
            .collect();
        assert_eq!(tokens, vec!["token-1", "token-2"]);
    }

    #[test]
    fn expired_twice_is_not_retried_again() {
        let auth = MockAuth::new();
        let creds = creds(&auth);
        let broker = MockBroker::builder()
            .with_credentials(creds.clone())
            .with_order_script("SPY", OrderScript::Expire)
            .with_order_script("SPY", OrderScript::Expire)
            .build();
        let gateway = RefreshingGateway::new(&broker, creds);

        let err = gateway.submit(&order()).unwrap_err();
        assert!(matches!(err, BrokerError::CredentialExpired));
        assert_eq!(broker.submitted_orders().len(), 2);
        assert_eq!(auth.calls(), 2);
    }

    #[test]
    fn transport_error_not_retried() {
        let auth = MockAuth::new();
        let broker = MockBroker::builder()
            .with_order_script("SPY", OrderScript::Fail("reset".into()))
            .build();
        let gateway = RefreshingGateway::new(&broker, creds(&auth));

        assert!(gateway.submit(&order()).is_err());
        assert_eq!(broker.submitted_orders().len(), 1);
        assert_eq!(auth.calls(), 0);
    }

    #[test]
    fn rejection_is_returned_as_ack() {
        let auth = MockAuth::new();
        let broker = MockBroker::builder()
            .with_order_script(
                "SPY",
                OrderScript::Reject {
                    code: "APBK0400".into(),
                    message: "market closed".into(),
                },
            )
            .build();
        let gateway = RefreshingGateway::new(&broker, creds(&auth));

        let ack = gateway.submit(&order()).unwrap();
        assert!(!ack.is_success());
        assert_eq!(ack.message, "market closed");
    }
}
