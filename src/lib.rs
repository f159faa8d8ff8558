//! Keeps petitions readable and writable while their storage moves from a
//! document store to a relational store.
//!
//! [`controller::PetitionController`] routes every save, load and delete
//! according to the migration [`phase`] in force at the time of the call.

pub mod config;
pub mod controller;
pub mod db;
pub mod docstore;
pub mod error;
pub mod identity;
pub mod model;
pub mod phase;
pub mod shortener;

pub use controller::{DeleteOutcome, PetitionController, SaveOutcome};
pub use error::{PetitionError, Warning};
pub use model::{PetitionItem, PetitionRef, PetitionStatus};
pub use phase::{Phase, PhaseRegistry};
