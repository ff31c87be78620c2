//! Generation tokens for a single catalog query stream.
//!
//! Every new intent (filter, page or page-size change) takes a fresh token and
//! cancels the signal handed out with the previous one. A response may only be
//! committed while its token is still current.

use std::fmt;

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationToken(u64);

impl GenerationToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GenerationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A freshly issued token together with the signal the transport observes.
#[derive(Debug, Clone)]
pub struct Generation {
    pub token: GenerationToken,
    pub cancel: CancellationToken,
}

#[derive(Debug, Default)]
pub struct RequestGenerationTracker {
    current: GenerationToken,
    in_flight: Option<CancellationToken>,
}

impl RequestGenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_token(&mut self) -> Generation {
        self.cancel_current();
        self.current = GenerationToken(self.current.0.wrapping_add(1));
        let cancel = CancellationToken::new();
        self.in_flight = Some(cancel.clone());
        Generation {
            token: self.current,
            cancel,
        }
    }

    pub fn is_current(&self, token: GenerationToken) -> bool {
        self.current == token
    }

    pub fn current(&self) -> GenerationToken {
        self.current
    }

    /// Signals cancellation to the request tied to the current token without
    /// issuing a new one.
    pub fn cancel_current(&mut self) {
        if let Some(previous) = self.in_flight.take() {
            previous.cancel();
        }
    }
}
