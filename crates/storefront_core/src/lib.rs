use std::sync::Arc;

use anyhow::Result;
use shared::domain::UserId;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod cart;
pub mod config;
pub mod error;
pub mod filter;
pub mod generation;
pub mod normalize;
pub mod query;
pub mod transport;

pub use cart::{
    CartLine, CartReconciler, CartSnapshot, LocalLineId, MutationKind, MutationTicket, ProductRef,
};
pub use config::{load_config, StorefrontConfig};
pub use error::{ClientError, TransportError};
pub use filter::{CatalogScope, FilterMode, FilterState, PageState};
pub use generation::{GenerationToken, RequestGenerationTracker};
pub use normalize::{normalize, QueryResult};
pub use query::{QueryController, QueryOutcome, QueryStatus, QueryTask, QueryView};
pub use transport::{CommerceTransport, HttpTransport, MissingTransport};

const EVENT_CAPACITY: usize = 256;

/// Committed state changes, published for presentation layers. Superseded
/// queries never produce an event.
#[derive(Debug, Clone)]
pub enum StorefrontEvent {
    CatalogLoading {
        token: GenerationToken,
    },
    CatalogCommitted {
        token: GenerationToken,
        result: QueryResult,
    },
    CatalogFailed {
        token: GenerationToken,
        error: ClientError,
    },
    CartChanged(CartSnapshot),
    CartMutationFailed {
        local_id: LocalLineId,
        mutation_id: Uuid,
        error: ClientError,
    },
}

/// Entry point wiring controllers to one transport and one event channel.
pub struct StorefrontClient {
    transport: Arc<dyn CommerceTransport>,
    config: StorefrontConfig,
    events: broadcast::Sender<StorefrontEvent>,
}

impl StorefrontClient {
    pub fn new(config: StorefrontConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::from_config(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: StorefrontConfig, transport: Arc<dyn CommerceTransport>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            config,
            events,
        }
    }

    pub fn config(&self) -> &StorefrontConfig {
        &self.config
    }

    /// A new, independent query stream (one per catalog screen or search box).
    pub fn catalog(&self) -> Result<Arc<QueryController>, ClientError> {
        let page = PageState::first(self.config.default_per_page)?;
        let filter = FilterState::all().with_location(self.config.location.clone());
        Ok(self.catalog_with(filter, page))
    }

    /// Query stream starting from an explicit filter and page. Nothing is
    /// fetched until the first intent or [`QueryController::refresh`].
    pub fn catalog_with(&self, filter: FilterState, page: PageState) -> Arc<QueryController> {
        QueryController::new(
            Arc::clone(&self.transport),
            filter,
            page,
            self.events.clone(),
        )
    }

    /// Cart for the configured user.
    pub fn cart(&self) -> Result<Arc<CartReconciler>, ClientError> {
        let user_id = self
            .config
            .user_id
            .clone()
            .ok_or_else(|| ClientError::validation("no user id configured for the cart"))?;
        Ok(self.cart_for(UserId::new(user_id)))
    }

    pub fn cart_for(&self, user_id: UserId) -> Arc<CartReconciler> {
        CartReconciler::new(Arc::clone(&self.transport), user_id, self.events.clone())
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StorefrontEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
