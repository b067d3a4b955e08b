//! Conversational order resolution for hotel room service.
//!
//! Free text goes in, and a validated, stock-checked order comes out after
//! as many clarifying turns as it takes. Ambiguous items and modifications
//! are never dropped. Each one is either bound to the menu or held as a
//! pending question for the guest.
//!
//! Layout, leaves first:
//! - [`catalog`], [`ledger`]: the menu and the shared stock counter
//! - [`matching`], [`resolver`], [`inventory`], [`validation`]: one
//!   validation pass over a draft
//! - [`context`], [`interpreter`], [`controller`]: the per-session dialog
//! - [`finalizer`]: pricing and the atomic stock commit
//! - [`session`]: the registry of live sessions
//! - [`nlu`]: the language-understanding provider seam

pub mod catalog;
pub mod config;
pub mod context;
pub mod controller;
pub mod draft;
pub mod engine;
pub mod finalizer;
pub mod format;
pub mod inquiry;
pub mod interpreter;
pub mod inventory;
pub mod ledger;
pub mod matching;
pub mod nlu;
pub mod resolver;
pub mod session;
pub mod validation;

pub use catalog::{Catalog, CatalogEntry, CatalogError, Category};
pub use config::{load_config, ConfigError, EngineConfig, NluProviderKind};
pub use context::{ContextStore, ContextUpdate, ConversationContext};
pub use controller::{DialogController, TurnInput, TurnOutcome};
pub use draft::{LineItem, OrderDraft};
pub use engine::{EngineError, EngineSettings, OrderEngine};
pub use finalizer::{FinalizeError, Finalizer, OrderConfirmation, OrderStatus};
pub use interpreter::{ReplyDecision, ResponseInterpreter};
pub use ledger::{Availability, Ledger, LedgerError, StockConflict};
pub use matching::MatchPolicy;
pub use nlu::{Intent, NluError, NluProvider};
pub use session::{SessionError, SessionManager};
pub use validation::{OrderValidator, ValidationResult};

pub use roomservice_dialog::{DialogState, PendingQuery, QueryKind};
pub use roomservice_ids::{OrderId, SessionId};
