//! A small `Account` domain to commit in tests.
//!
//! `Account` is type code [`ACCOUNT_TYPE_CODE`] and understands two events,
//! `AccountOpened.v1` and `Deposited.v1`.

#![allow(clippy::unwrap_used)] // Fixtures are built from known-good values
#![allow(clippy::missing_panics_doc)]

use crate::mocks::{
    InMemoryAggregateStorage, InMemoryEventStore, RecordingExecuteContext, StaticTypeRegistry,
    TestCommand, test_clock,
};
use commitflow_core::aggregate::{AggregateRoot, AggregateType, replay_events};
use commitflow_core::command::ProcessingCommand;
use commitflow_core::context::EventProcessingContext;
use commitflow_core::environment::Clock;
use commitflow_core::event::{Event, EventError, SerializedEvent};
use commitflow_core::event_stream::EventStream;
use commitflow_core::stream::{AggregateRootId, CommitId, Version};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Type code of [`Account`]
pub const ACCOUNT_TYPE_CODE: i32 = 1;

/// Type name of [`Account`]
pub const ACCOUNT_TYPE_NAME: &str = "Account";

/// Account events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountEvent {
    /// The account was opened
    Opened {
        /// Account holder
        owner: String,
    },
    /// Money was deposited
    Deposited {
        /// Amount in cents
        amount: u64,
    },
}

impl AccountEvent {
    /// `Opened` event
    #[must_use]
    pub fn opened(owner: &str) -> Self {
        Self::Opened {
            owner: owner.to_string(),
        }
    }

    /// `Deposited` event
    #[must_use]
    pub const fn deposited(amount: u64) -> Self {
        Self::Deposited { amount }
    }
}

impl Event for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Opened { .. } => "AccountOpened.v1",
            Self::Deposited { .. } => "Deposited.v1",
        }
    }
}

/// Event-sourced bank account
#[derive(Debug, Clone)]
pub struct Account {
    id: AggregateRootId,
    version: Version,
    owner: Option<String>,
    balance: u64,
}

impl Account {
    /// Empty account at version 0
    #[must_use]
    pub fn new(id: impl Into<AggregateRootId>) -> Self {
        Self {
            id: id.into(),
            version: Version::INITIAL,
            owner: None,
            balance: 0,
        }
    }

    /// Account holder, once opened
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Current balance
    #[must_use]
    pub const fn balance(&self) -> u64 {
        self.balance
    }
}

impl AggregateRoot for Account {
    fn unique_id(&self) -> &AggregateRootId {
        &self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn type_name(&self) -> &'static str {
        ACCOUNT_TYPE_NAME
    }

    fn apply_event(&mut self, event: &SerializedEvent) -> Result<(), EventError> {
        if !matches!(event.event_type.as_str(), "AccountOpened.v1" | "Deposited.v1") {
            return Err(EventError::UnknownEventType(event.event_type.clone()));
        }
        match event.decode::<AccountEvent>()? {
            AccountEvent::Opened { owner } => self.owner = Some(owner),
            AccountEvent::Deposited { amount } => self.balance += amount,
        }
        Ok(())
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn boxed_clone(&self) -> Box<dyn AggregateRoot> {
        Box::new(self.clone())
    }
}

/// Empty account
#[must_use]
pub fn new_account(id: &str) -> Account {
    Account::new(id)
}

/// Account rebuilt from every stream the store holds for it
#[must_use]
pub fn stored_account(store: &InMemoryEventStore, id: &str) -> Account {
    let mut account = Account::new(id);
    replay_events(&mut account, &store.streams(&AggregateRootId::new(id))).unwrap();
    account
}

/// The `Account` type descriptor
#[must_use]
pub fn account_type() -> AggregateType {
    AggregateType::new(ACCOUNT_TYPE_CODE, ACCOUNT_TYPE_NAME)
}

/// Registry that knows `Account`
#[must_use]
pub fn account_type_registry() -> StaticTypeRegistry {
    StaticTypeRegistry::new().with(account_type())
}

/// Storage able to rebuild accounts from `store`
#[must_use]
pub fn account_storage(store: Arc<InMemoryEventStore>) -> InMemoryAggregateStorage {
    InMemoryAggregateStorage::new(store)
        .with_factory(ACCOUNT_TYPE_CODE, |id| Box::new(Account::new(id)))
}

/// Serialize account events
#[must_use]
pub fn serialize(events: &[AccountEvent]) -> Vec<SerializedEvent> {
    events
        .iter()
        .map(|event| SerializedEvent::from_event(event, None).unwrap())
        .collect()
}

/// Account stream stamped with the test clock
#[must_use]
pub fn account_stream(id: &str, commit_id: &str, version: u64, events: Vec<AccountEvent>) -> EventStream {
    EventStream::new(
        CommitId::new(commit_id),
        AggregateRootId::new(id),
        ACCOUNT_TYPE_CODE,
        Version::new(version),
        test_clock().now(),
        serialize(&events),
    )
    .unwrap()
}

/// A [`TestCommand`] in a [`RecordingExecuteContext`]
#[must_use]
pub fn processing_command(id: &str, max_retry_count: u32) -> ProcessingCommand {
    ProcessingCommand::new(
        Arc::new(TestCommand::new(id, max_retry_count)),
        Arc::new(RecordingExecuteContext::new()),
    )
}

/// Context for `stream`, produced by command `cmd-1` with a retry budget of 3
#[must_use]
pub fn context(stream: EventStream, aggregate: impl AggregateRoot + 'static) -> EventProcessingContext {
    EventProcessingContext::new(stream, Arc::new(aggregate), processing_command("cmd-1", 3))
}

/// Strategy for non-empty batches of deposits
pub fn deposits() -> impl Strategy<Value = Vec<AccountEvent>> {
    prop::collection::vec((1u64..10_000).prop_map(AccountEvent::deposited), 1..4)
}
