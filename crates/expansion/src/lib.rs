//! RefGraph expansion engine
//!
//! Recursive reference extraction and acquisition:
//! - [`parser`]: raw document text to citation candidates
//! - [`resolver`]: candidate to existing node or new signature
//! - [`sources`]: ordered external providers behind the source gateway
//! - [`coordinator`]: resolved candidate to node (content or stub)
//! - [`controller`]: depth-bounded, cycle-safe breadth-first expansion

pub mod cancel;
pub mod controller;
pub mod coordinator;
pub mod errors;
pub mod parser;
pub mod resolver;
pub mod seed;
pub mod sources;

pub use cancel::{CancelHandle, CancelSignal};
pub use controller::{
    ExpansionController, ExpansionReport, ExpansionRequest, ProgressSnapshot, RunFailure,
    RunHandle, RunState,
};
pub use coordinator::{AcquisitionCoordinator, Materialized};
pub use errors::{ExpansionError, Result};
pub use parser::{CitationCandidate, CitationFamily, CitationParser};
pub use resolver::{EntityResolver, InFlightMap, MatchRule, Resolution};
pub use seed::{register_seed, SeedDocument, SeedRegistration};
pub use sources::{
    AcquiredContent, AcquisitionQuery, CanonicalMetadata, ContentProvider, GatewayOutcome,
    ProviderOutcome, SourceGateway,
};
