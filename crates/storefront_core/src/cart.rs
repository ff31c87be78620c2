//! Optimistic cart mutations reconciled against the remote cart.
//!
//! Every line owns a FIFO queue. At most one network mutation per line is in
//! flight; the next one is applied to the snapshot only once its predecessor
//! settled, so a rollback never discards a later edit. Different lines
//! proceed independently.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde_json::Value;
use shared::{
    domain::{CartLineId, Money, ProductId, UserId},
    protocol::{AddCartLineRequest, CartLineRecord, Product, UpdateCartLineRequest},
};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{ClientError, TransportError},
    normalize::{normalize_list, normalize_record, RecordOutcome},
    transport::CommerceTransport,
    StorefrontEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalLineId(u64);

impl LocalLineId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LocalLineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line-{}", self.0)
    }
}

/// What the UI knows about a product when it adds it to the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRef {
    pub id: ProductId,
    pub unit_price: Money,
    pub title: Option<String>,
}

impl ProductRef {
    pub fn new(id: ProductId, unit_price: Money) -> Self {
        Self {
            id,
            unit_price,
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

impl From<&Product> for ProductRef {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.clone(),
            unit_price: product.price,
            title: Some(product.name.clone()).filter(|name| !name.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub local_id: LocalLineId,
    pub server_line_id: Option<CartLineId>,
    pub product_id: ProductId,
    pub title: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
}

impl CartLine {
    fn new(local_id: LocalLineId, product: &ProductRef, quantity: u32) -> Self {
        let mut line = Self {
            local_id,
            server_line_id: None,
            product_id: product.id.clone(),
            title: product.title.clone(),
            quantity,
            unit_price: product.unit_price,
            subtotal: Money::ZERO,
        };
        line.set_quantity(quantity);
        line
    }

    fn from_record(local_id: LocalLineId, record: &CartLineRecord) -> Self {
        // older carts only store the line total
        let unit_price = if record.price == Money::ZERO && record.quantity > 0 {
            Money(record.sub_total.0 / u64::from(record.quantity))
        } else {
            record.price
        };
        let mut line = Self {
            local_id,
            server_line_id: Some(record.id.clone()),
            product_id: record.product_id.clone(),
            title: record.product_title.clone(),
            quantity: record.quantity,
            unit_price,
            subtotal: Money::ZERO,
        };
        line.set_quantity(record.quantity);
        line
    }

    /// Keeps `subtotal == floor(unit_price * quantity)`.
    fn set_quantity(&mut self, quantity: u32) {
        self.quantity = quantity;
        self.subtotal = self.unit_price.times(quantity);
    }

    /// The server is authoritative for line id, price and granted quantity.
    fn adopt(&mut self, record: &CartLineRecord) {
        self.server_line_id = Some(record.id.clone());
        if record.price > Money::ZERO {
            self.unit_price = record.price;
        }
        if record.product_title.is_some() {
            self.title = record.product_title.clone();
        }
        let quantity = if record.quantity > 0 {
            record.quantity
        } else {
            self.quantity
        };
        self.set_quantity(quantity);
    }
}

/// Local view of the cart. `total` always equals the sum of line subtotals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartSnapshot {
    lines: BTreeMap<LocalLineId, CartLine>,
    total: Money,
}

impl CartSnapshot {
    pub fn lines(&self) -> impl Iterator<Item = &CartLine> + '_ {
        self.lines.values()
    }

    pub fn line(&self, local_id: LocalLineId) -> Option<&CartLine> {
        self.lines.get(&local_id)
    }

    pub fn line_for_product(&self, product_id: &ProductId) -> Option<&CartLine> {
        self.lines.values().find(|line| &line.product_id == product_id)
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn is_consistent(&self) -> bool {
        let lines_ok = self
            .lines
            .values()
            .all(|line| line.subtotal == line.unit_price.times(line.quantity) && line.quantity > 0);
        lines_ok && self.total == self.lines.values().map(|line| line.subtotal).sum()
    }

    fn put(&mut self, line: CartLine) {
        self.lines.insert(line.local_id, line);
        self.recompute_total();
    }

    fn take(&mut self, local_id: LocalLineId) -> Option<CartLine> {
        let removed = self.lines.remove(&local_id);
        self.recompute_total();
        removed
    }

    fn modify(&mut self, local_id: LocalLineId, change: impl FnOnce(&mut CartLine)) {
        if let Some(line) = self.lines.get_mut(&local_id) {
            change(line);
        }
        self.recompute_total();
    }

    fn replace(&mut self, lines: BTreeMap<LocalLineId, CartLine>) {
        self.lines = lines;
        self.recompute_total();
    }

    fn recompute_total(&mut self) {
        self.total = self.lines.values().map(|line| line.subtotal).sum();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Add,
    Update,
    Remove,
}

#[derive(Debug, Clone)]
enum Payload {
    Add { product: ProductRef, quantity: u32 },
    Update { quantity: u32 },
    Remove,
}

type Settlement = Result<CartSnapshot, ClientError>;

/// Last settlement of a line, as seen by listings fetched before it.
struct SettledLine {
    epoch: u64,
    server_line_id: Option<CartLineId>,
    product_id: ProductId,
}

struct Mutation {
    id: Uuid,
    local_id: LocalLineId,
    payload: Payload,
    reply: oneshot::Sender<Settlement>,
}

impl Mutation {
    fn kind(&self) -> MutationKind {
        match self.payload {
            Payload::Add { .. } => MutationKind::Add,
            Payload::Update { .. } => MutationKind::Update,
            Payload::Remove => MutationKind::Remove,
        }
    }
}

/// How a call addresses the remote line.
#[derive(Debug, Clone)]
enum LineTarget {
    Known(CartLineId),
    /// The add was acknowledged without an id; find the line by product.
    Lookup(ProductId),
}

enum CartCall {
    Add(AddCartLineRequest),
    Update(LineTarget, UpdateCartLineRequest),
    Remove(LineTarget),
}

/// What a successful call revealed about the remote line.
enum Confirmed {
    Record(CartLineRecord),
    LineId(CartLineId),
    Nothing,
}

/// Head-of-queue mutation already applied to the snapshot.
struct InFlight {
    mutation: Mutation,
    prior: Option<CartLine>,
    call: CartCall,
}

enum Staged {
    Send(CartCall),
    Done,
    Reject(String),
}

/// Handle to one cart mutation.
#[derive(Debug)]
pub struct MutationTicket {
    local_id: LocalLineId,
    mutation_id: Uuid,
    kind: MutationKind,
    settled: oneshot::Receiver<Settlement>,
}

impl MutationTicket {
    pub fn local_id(&self) -> LocalLineId {
        self.local_id
    }

    pub fn mutation_id(&self) -> Uuid {
        self.mutation_id
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    /// Resolves once the mutation was confirmed or rolled back.
    pub async fn settled(self) -> Settlement {
        self.settled.await.unwrap_or(Err(ClientError::Cancelled))
    }
}

#[derive(Default)]
struct CartState {
    snapshot: CartSnapshot,
    /// Present while a mutation for the line is in flight; holds the ones
    /// waiting behind it.
    queues: HashMap<LocalLineId, VecDeque<Mutation>>,
    next_local_id: u64,
    /// Lines the server accepted without reporting their id.
    unresolved: HashSet<LocalLineId>,
    /// Bumped on every settlement.
    epoch: u64,
    settled: HashMap<LocalLineId, SettledLine>,
}

impl CartState {
    fn allocate_local_id(&mut self) -> LocalLineId {
        self.next_local_id += 1;
        LocalLineId(self.next_local_id)
    }

    fn record_settled(&mut self, local_id: LocalLineId, line: Option<CartLine>) {
        self.epoch += 1;
        if let Some(line) = line {
            self.settled.insert(
                local_id,
                SettledLine {
                    epoch: self.epoch,
                    server_line_id: line.server_line_id,
                    product_id: line.product_id,
                },
            );
        }
    }

    /// Where a call for `line` should go, or `None` when the server never
    /// accepted the line.
    fn remote_target(&self, line: &CartLine) -> Option<LineTarget> {
        match &line.server_line_id {
            Some(line_id) => Some(LineTarget::Known(line_id.clone())),
            None if self.unresolved.contains(&line.local_id) => {
                Some(LineTarget::Lookup(line.product_id.clone()))
            }
            None => None,
        }
    }

    fn ensure_known(&self, local_id: LocalLineId) -> Result<(), ClientError> {
        if self.snapshot.line(local_id).is_none() && !self.queues.contains_key(&local_id) {
            return Err(ClientError::validation(format!("unknown cart line {local_id}")));
        }
        Ok(())
    }
}

fn validate_quantity(quantity: u32) -> Result<(), ClientError> {
    if quantity == 0 {
        return Err(ClientError::validation(
            "quantity must be a positive integer",
        ));
    }
    Ok(())
}

fn classify(local_id: LocalLineId, err: TransportError) -> ClientError {
    if err.is_rejection() {
        ClientError::ReconciliationConflict {
            local_id,
            reason: err.to_string(),
        }
    } else {
        ClientError::from(err)
    }
}

fn rejected(local_id: LocalLineId, reason: Option<String>) -> ClientError {
    ClientError::ReconciliationConflict {
        local_id,
        reason: reason.unwrap_or_else(|| "rejected by server".to_string()),
    }
}

pub struct CartReconciler {
    transport: Arc<dyn CommerceTransport>,
    user_id: UserId,
    state: Mutex<CartState>,
    events: broadcast::Sender<StorefrontEvent>,
}

impl CartReconciler {
    pub fn new(
        transport: Arc<dyn CommerceTransport>,
        user_id: UserId,
        events: broadcast::Sender<StorefrontEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            user_id,
            state: Mutex::new(CartState::default()),
            events,
        })
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn snapshot(&self) -> CartSnapshot {
        self.lock_state().snapshot.clone()
    }

    /// True when no mutation is queued or in flight.
    pub fn is_idle(&self) -> bool {
        self.lock_state().queues.is_empty()
    }

    /// Adding a product already in the cart raises that line's quantity.
    pub fn add_line(
        self: &Arc<Self>,
        product: ProductRef,
        quantity: u32,
    ) -> Result<MutationTicket, ClientError> {
        validate_quantity(quantity)?;
        let mut state = self.lock_state();
        let existing = state
            .snapshot
            .line_for_product(&product.id)
            .map(|line| line.local_id);
        let local_id = match existing {
            Some(local_id) => local_id,
            None => state.allocate_local_id(),
        };
        Ok(self.enqueue(&mut state, local_id, Payload::Add { product, quantity }))
    }

    pub fn update_line(
        self: &Arc<Self>,
        local_id: LocalLineId,
        quantity: u32,
    ) -> Result<MutationTicket, ClientError> {
        validate_quantity(quantity)?;
        let mut state = self.lock_state();
        state.ensure_known(local_id)?;
        Ok(self.enqueue(&mut state, local_id, Payload::Update { quantity }))
    }

    pub fn remove_line(
        self: &Arc<Self>,
        local_id: LocalLineId,
    ) -> Result<MutationTicket, ClientError> {
        let mut state = self.lock_state();
        state.ensure_known(local_id)?;
        Ok(self.enqueue(&mut state, local_id, Payload::Remove))
    }

    /// Merges the remote cart into the snapshot. Lines with pending
    /// mutations, and lines settled after the listing was requested, keep
    /// their local state.
    pub async fn load(&self) -> Result<CartSnapshot, ClientError> {
        let since = self.lock_state().epoch;
        let raw = self.transport.fetch_cart(&self.user_id).await?;
        let records: Vec<CartLineRecord> = normalize_list(&raw);

        let mut guard = self.lock_state();
        let state = &mut *guard;
        let mut held: HashSet<LocalLineId> = state.queues.keys().copied().collect();
        let mut held_server_ids: HashSet<CartLineId> = HashSet::new();
        let mut held_products: HashSet<ProductId> = HashSet::new();
        for (local_id, settled) in &state.settled {
            if settled.epoch > since {
                held.insert(*local_id);
                held_server_ids.extend(settled.server_line_id.clone());
                held_products.insert(settled.product_id.clone());
            }
        }
        for line in state.snapshot.lines().filter(|line| held.contains(&line.local_id)) {
            held_server_ids.extend(line.server_line_id.clone());
            held_products.insert(line.product_id.clone());
        }
        let known: HashMap<CartLineId, LocalLineId> = state
            .snapshot
            .lines()
            .filter_map(|line| line.server_line_id.clone().map(|id| (id, line.local_id)))
            .collect();
        let unresolved: HashMap<ProductId, LocalLineId> = state
            .snapshot
            .lines()
            .filter(|line| state.unresolved.contains(&line.local_id))
            .map(|line| (line.product_id.clone(), line.local_id))
            .collect();

        let mut lines: BTreeMap<LocalLineId, CartLine> = state
            .snapshot
            .lines()
            .filter(|line| held.contains(&line.local_id))
            .map(|line| (line.local_id, line.clone()))
            .collect();
        for record in records.iter().filter(|record| record.quantity > 0) {
            if held_server_ids.contains(&record.id) || held_products.contains(&record.product_id) {
                continue;
            }
            let local_id = match known
                .get(&record.id)
                .or_else(|| unresolved.get(&record.product_id))
            {
                Some(local_id) => *local_id,
                None => state.allocate_local_id(),
            };
            lines.insert(local_id, CartLine::from_record(local_id, record));
        }
        state.snapshot.replace(lines);
        let CartState {
            snapshot,
            unresolved: pending_lookup,
            ..
        } = &mut *state;
        pending_lookup.retain(|local_id| {
            snapshot
                .line(*local_id)
                .is_some_and(|line| line.server_line_id.is_none())
        });
        info!(
            user_id = %self.user_id,
            lines = state.snapshot.len(),
            total = %state.snapshot.total(),
            "cart: loaded remote cart"
        );
        self.publish(state);
        Ok(state.snapshot.clone())
    }

    fn enqueue(
        self: &Arc<Self>,
        state: &mut CartState,
        local_id: LocalLineId,
        payload: Payload,
    ) -> MutationTicket {
        let (reply, settled) = oneshot::channel();
        let mutation = Mutation {
            id: Uuid::new_v4(),
            local_id,
            payload,
            reply,
        };
        let ticket = MutationTicket {
            local_id,
            mutation_id: mutation.id,
            kind: mutation.kind(),
            settled,
        };

        if let Some(waiting) = state.queues.get_mut(&local_id) {
            waiting.push_back(mutation);
            debug!(
                %local_id,
                mutation_id = %ticket.mutation_id,
                waiting = waiting.len(),
                "cart: mutation queued behind in-flight one"
            );
            return ticket;
        }

        state.queues.insert(local_id, VecDeque::new());
        if let Some(in_flight) = self.advance(state, local_id, Some(mutation)) {
            tokio::spawn(Arc::clone(self).drive_line(local_id, in_flight));
        }
        ticket
    }

    /// Stages queued mutations until one needs the network. Releases the
    /// line's queue when nothing is left.
    fn advance(
        &self,
        state: &mut CartState,
        local_id: LocalLineId,
        mut next: Option<Mutation>,
    ) -> Option<InFlight> {
        while let Some(mutation) = next {
            if let Some(in_flight) = self.begin(state, mutation) {
                return Some(in_flight);
            }
            next = state.queues.get_mut(&local_id).and_then(VecDeque::pop_front);
        }
        state.queues.remove(&local_id);
        None
    }

    /// Applies `mutation` optimistically. Returns `None` when it settled
    /// without a network call.
    fn begin(&self, state: &mut CartState, mutation: Mutation) -> Option<InFlight> {
        let local_id = mutation.local_id;
        let prior = state.snapshot.line(local_id).cloned();

        let staged = match (&mutation.payload, &prior) {
            (Payload::Add { product, quantity }, None) => {
                let line = CartLine::new(local_id, product, *quantity);
                let request = AddCartLineRequest {
                    product_id: product.id.clone(),
                    quantity: *quantity,
                    user_id: self.user_id.clone(),
                    price: line.unit_price,
                    sub_total: line.subtotal,
                    product_title: product.title.clone(),
                    mutation_id: mutation.id,
                };
                state.snapshot.put(line);
                Staged::Send(CartCall::Add(request))
            }
            (Payload::Add { quantity, .. }, Some(line)) => {
                let merged = line.quantity.saturating_add(*quantity);
                stage_update(state, line, merged, mutation.id)
            }
            (Payload::Update { quantity }, Some(line)) => {
                stage_update(state, line, *quantity, mutation.id)
            }
            (Payload::Update { .. }, None) => {
                Staged::Reject("line is no longer in the cart".to_string())
            }
            (Payload::Remove, Some(line)) => {
                state.snapshot.take(local_id);
                match state.remote_target(line) {
                    Some(target) => Staged::Send(CartCall::Remove(target)),
                    None => Staged::Done,
                }
            }
            (Payload::Remove, None) => Staged::Done,
        };

        match staged {
            Staged::Send(call) => {
                debug!(%local_id, mutation_id = %mutation.id, kind = ?mutation.kind(), "cart: applied optimistically");
                self.publish(state);
                Some(InFlight {
                    mutation,
                    prior,
                    call,
                })
            }
            Staged::Done => {
                state.unresolved.remove(&local_id);
                let current = state.snapshot.line(local_id).cloned();
                state.record_settled(local_id, current.or(prior));
                self.publish(state);
                let _ = mutation.reply.send(Ok(state.snapshot.clone()));
                None
            }
            Staged::Reject(reason) => {
                let error = ClientError::ReconciliationConflict { local_id, reason };
                warn!(%local_id, mutation_id = %mutation.id, %error, "cart: mutation rejected locally");
                let _ = self.events.send(StorefrontEvent::CartMutationFailed {
                    local_id,
                    mutation_id: mutation.id,
                    error: error.clone(),
                });
                let _ = mutation.reply.send(Err(error));
                None
            }
        }
    }

    async fn drive_line(self: Arc<Self>, local_id: LocalLineId, mut in_flight: InFlight) {
        loop {
            let response = self.send(&in_flight).await;
            let next = {
                let mut state = self.lock_state();
                self.settle(&mut state, in_flight, response);
                let queued = state.queues.get_mut(&local_id).and_then(VecDeque::pop_front);
                self.advance(&mut state, local_id, queued)
            };
            match next {
                Some(staged) => in_flight = staged,
                None => break,
            }
        }
    }

    async fn send(&self, in_flight: &InFlight) -> Result<Confirmed, ClientError> {
        let local_id = in_flight.mutation.local_id;
        match &in_flight.call {
            CartCall::Add(request) => {
                let raw = self
                    .transport
                    .add_cart_line(request)
                    .await
                    .map_err(|err| classify(local_id, err))?;
                match normalize_record::<CartLineRecord>(&raw) {
                    RecordOutcome::Record(record) => Ok(Confirmed::Record(record)),
                    RecordOutcome::Rejected(reason) => Err(rejected(local_id, reason)),
                    // accepted; a later change looks the line up again
                    RecordOutcome::Unrecognized => match self
                        .find_server_line(&request.product_id)
                        .await
                    {
                        Ok(Some(record)) => Ok(Confirmed::Record(record)),
                        Ok(None) => Ok(Confirmed::Nothing),
                        Err(err) => {
                            warn!(%local_id, error = %err, "cart: could not look up confirmed line");
                            Ok(Confirmed::Nothing)
                        }
                    },
                }
            }
            CartCall::Update(target, request) => {
                let Some(line_id) = self.resolve(local_id, target).await? else {
                    return Err(rejected(
                        local_id,
                        Some("line is not in the remote cart".to_string()),
                    ));
                };
                let raw = self
                    .transport
                    .update_cart_line(&line_id, request)
                    .await
                    .map_err(|err| classify(local_id, err))?;
                match normalize_record::<CartLineRecord>(&raw) {
                    RecordOutcome::Record(record) => Ok(Confirmed::Record(record)),
                    RecordOutcome::Rejected(reason) => Err(rejected(local_id, reason)),
                    RecordOutcome::Unrecognized => Ok(Confirmed::LineId(line_id)),
                }
            }
            CartCall::Remove(target) => {
                let Some(line_id) = self.resolve(local_id, target).await? else {
                    return Ok(Confirmed::Nothing);
                };
                match self.transport.remove_cart_line(&line_id).await {
                    Ok(raw) => match normalize_record::<Value>(&raw) {
                        RecordOutcome::Rejected(reason) => Err(rejected(local_id, reason)),
                        _ => Ok(Confirmed::Nothing),
                    },
                    // already gone on the server
                    Err(TransportError::Status { status: 404, .. }) => Ok(Confirmed::Nothing),
                    Err(err) => Err(classify(local_id, err)),
                }
            }
        }
    }

    async fn resolve(
        &self,
        local_id: LocalLineId,
        target: &LineTarget,
    ) -> Result<Option<CartLineId>, ClientError> {
        match target {
            LineTarget::Known(line_id) => Ok(Some(line_id.clone())),
            LineTarget::Lookup(product_id) => {
                let record = self
                    .find_server_line(product_id)
                    .await
                    .map_err(|err| classify(local_id, err))?;
                Ok(record.map(|record| record.id))
            }
        }
    }

    async fn find_server_line(
        &self,
        product_id: &ProductId,
    ) -> Result<Option<CartLineRecord>, TransportError> {
        let raw = self.transport.fetch_cart(&self.user_id).await?;
        Ok(normalize_list::<CartLineRecord>(&raw)
            .into_iter()
            .find(|record| &record.product_id == product_id))
    }

    fn settle(
        &self,
        state: &mut CartState,
        in_flight: InFlight,
        response: Result<Confirmed, ClientError>,
    ) {
        let InFlight {
            mutation, prior, ..
        } = in_flight;
        let local_id = mutation.local_id;

        match response {
            Ok(confirmed) => {
                match &confirmed {
                    Confirmed::Record(record) => {
                        state.snapshot.modify(local_id, |line| line.adopt(record))
                    }
                    Confirmed::LineId(line_id) => state.snapshot.modify(local_id, |line| {
                        line.server_line_id = Some(line_id.clone())
                    }),
                    Confirmed::Nothing => {}
                }
                let current = state.snapshot.line(local_id).cloned();
                match current.as_ref().map(|line| line.server_line_id.is_some()) {
                    Some(false) => {
                        warn!(%local_id, mutation_id = %mutation.id, "cart: line id unknown, will look it up");
                        state.unresolved.insert(local_id);
                    }
                    _ => {
                        state.unresolved.remove(&local_id);
                    }
                }
                state.record_settled(local_id, current.or(prior));
                info!(
                    %local_id,
                    mutation_id = %mutation.id,
                    kind = ?mutation.kind(),
                    total = %state.snapshot.total(),
                    "cart: mutation confirmed"
                );
                self.publish(state);
                let _ = mutation.reply.send(Ok(state.snapshot.clone()));
            }
            Err(error) => {
                match prior {
                    Some(line) => state.snapshot.put(line),
                    None => {
                        state.snapshot.take(local_id);
                    }
                }
                let current = state.snapshot.line(local_id).cloned();
                state.record_settled(local_id, current);
                warn!(%local_id, mutation_id = %mutation.id, %error, "cart: mutation failed, rolled back");
                let _ = self.events.send(StorefrontEvent::CartMutationFailed {
                    local_id,
                    mutation_id: mutation.id,
                    error: error.clone(),
                });
                self.publish(state);
                let _ = mutation.reply.send(Err(error));
            }
        }
    }

    fn publish(&self, state: &CartState) {
        let _ = self
            .events
            .send(StorefrontEvent::CartChanged(state.snapshot.clone()));
    }

    fn lock_state(&self) -> MutexGuard<'_, CartState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn stage_update(
    state: &mut CartState,
    line: &CartLine,
    quantity: u32,
    mutation_id: Uuid,
) -> Staged {
    let Some(target) = state.remote_target(line) else {
        return Staged::Reject("line has not been confirmed by the server".to_string());
    };
    let mut next = line.clone();
    next.set_quantity(quantity);
    let request = UpdateCartLineRequest {
        quantity,
        sub_total: next.subtotal,
        mutation_id,
    };
    state.snapshot.put(next);
    Staged::Send(CartCall::Update(target, request))
}

#[cfg(test)]
#[path = "tests/cart_tests.rs"]
mod tests;
