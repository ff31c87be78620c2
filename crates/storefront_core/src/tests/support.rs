//! Scripted transport: every call is handed to the test, which decides when
//! and how it resolves.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::{json, Value};
use shared::{
    domain::{CartLineId, UserId},
    protocol::{AddCartLineRequest, UpdateCartLineRequest},
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::{
    error::TransportError,
    transport::{CatalogRequest, CommerceTransport},
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Catalog(CatalogRequest),
    Cart(UserId),
    Add(AddCartLineRequest),
    Update(CartLineId, UpdateCartLineRequest),
    Remove(CartLineId),
}

pub(crate) struct PendingCall {
    pub call: Call,
    pub cancel: Option<CancellationToken>,
    respond: oneshot::Sender<Result<Value, TransportError>>,
}

impl PendingCall {
    pub fn ok(self, body: Value) {
        let _ = self.respond.send(Ok(body));
    }

    pub fn fail(self, error: TransportError) {
        let _ = self.respond.send(Err(error));
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    pub fn catalog(&self) -> &CatalogRequest {
        match &self.call {
            Call::Catalog(request) => request,
            other => panic!("expected catalog call, got {other:?}"),
        }
    }
}

pub(crate) struct ScriptedTransport {
    calls: mpsc::UnboundedSender<PendingCall>,
}

impl ScriptedTransport {
    pub fn new() -> (Arc<Self>, Script) {
        let (calls, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { calls }), Script { rx })
    }

    async fn dispatch(
        &self,
        call: Call,
        cancel: Option<CancellationToken>,
    ) -> Result<Value, TransportError> {
        let (respond, response) = oneshot::channel();
        self.calls
            .send(PendingCall {
                call,
                cancel: cancel.clone(),
                respond,
            })
            .map_err(|_| TransportError::Connect("script closed".into()))?;
        let cancel = cancel.unwrap_or_default();
        tokio::select! {
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            response = response => response
                .unwrap_or_else(|_| Err(TransportError::Connect("call dropped".into()))),
        }
    }
}

#[async_trait]
impl CommerceTransport for ScriptedTransport {
    async fn fetch_catalog(
        &self,
        request: &CatalogRequest,
        cancel: CancellationToken,
    ) -> Result<Value, TransportError> {
        self.dispatch(Call::Catalog(request.clone()), Some(cancel))
            .await
    }

    async fn fetch_cart(&self, user_id: &UserId) -> Result<Value, TransportError> {
        self.dispatch(Call::Cart(user_id.clone()), None).await
    }

    async fn add_cart_line(&self, request: &AddCartLineRequest) -> Result<Value, TransportError> {
        self.dispatch(Call::Add(request.clone()), None).await
    }

    async fn update_cart_line(
        &self,
        line_id: &CartLineId,
        request: &UpdateCartLineRequest,
    ) -> Result<Value, TransportError> {
        self.dispatch(Call::Update(line_id.clone(), request.clone()), None)
            .await
    }

    async fn remove_cart_line(&self, line_id: &CartLineId) -> Result<Value, TransportError> {
        self.dispatch(Call::Remove(line_id.clone()), None).await
    }
}

pub(crate) struct Script {
    rx: mpsc::UnboundedReceiver<PendingCall>,
}

impl Script {
    pub async fn next(&mut self) -> PendingCall {
        tokio::time::timeout(Duration::from_secs(2), self.rx.recv())
            .await
            .expect("transport call in time")
            .expect("transport alive")
    }

    /// Lets spawned tasks run, then asserts nothing reached the transport.
    pub async fn assert_idle(&mut self) {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        if let Ok(pending) = self.rx.try_recv() {
            panic!("unexpected transport call: {:?}", pending.call);
        }
    }
}

pub(crate) fn product_json(id: &str, price: u64) -> Value {
    json!({ "_id": id, "name": format!("product {id}"), "price": price })
}

pub(crate) fn line_json(id: &str, product_id: &str, quantity: u32, price: u64) -> Value {
    json!({
        "_id": id,
        "productId": product_id,
        "quantity": quantity,
        "price": price,
        "subTotal": price * u64::from(quantity),
    })
}
