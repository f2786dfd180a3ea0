//! dcgen core - relationship resolution, sibling sorting and clipboard
//! orchestration for declaratively configured record types.
//!
//! A [`Definition`] describes how record types relate. On top of it:
//!
//! - [`RelationshipManager`] writes and checks parent/root relationships
//! - [`SortingManager`] computes gap-based sorting values
//! - [`ModelCollector`] locates parents, siblings and children
//! - [`TreeCollector`] builds lazily expanded trees
//! - [`Orchestrator`] executes create/cut/copy/deep-copy pastes

pub mod clipboard;
pub mod collector;
pub mod config;
pub mod definition;
pub mod error;
pub mod events;
pub mod filter;
pub mod panel;
pub mod paste;
pub mod record;
pub mod relationship;
pub mod sorting;
pub mod store;
pub mod tree;

pub use clipboard::{
    Clipboard, ClipboardAction, ClipboardFilter, ClipboardItem, ClipboardStore, ParentScope,
};
pub use collector::ModelCollector;
pub use config::{PasteConfig, StoreConfig};
pub use definition::{
    Definition, InverseRule, Mode, Operand, ParentChildCondition, PropertyFlags, RelationFilter,
    RootCondition, SetOn,
};
pub use error::Error;
pub use events::{LoggingListener, PersistEvent, PersistListener, PersistPhase, RecordingListener};
pub use panel::{Panel, PanelSettings};
pub use paste::{Orchestrator, PasteResult, PasteTarget};
pub use record::{Record, RecordMeta};
pub use relationship::RelationshipManager;
pub use sorting::{Placement, SortOutcome, SortingManager, SORTING_STEP};
pub use store::{DataStore, DataStores, MemoryStore, SledStorage, SledStore};
pub use tree::{NodeStateStore, TreeCollector, TreeNode, TreeNodeStates};

/// Re-export protocol types.
pub use dcgen_proto as proto;
