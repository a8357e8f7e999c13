//! Citadel Routing
//!
//! Link-state routing over the Citadel hexagonal mesh.
//!
//! # Architecture
//!
//! - **LinkStateDatabase**: one shared map of router id to its latest
//!   advertisement, with a single version bumped on every change
//! - **AdjacencyTracker**: per router, diffs topology probes and publishes
//!   only when the direct adjacency moved
//! - **Route builder**: Dijkstra over a database snapshot, propagating a
//!   capability-blocking bit along each path
//! - **CostIndex**: lazily built ascending-cost ordering of destinations
//! - **Scheduler**: a bounded worker pool with at most one recompute job per
//!   router, newer versions superseding queued jobs
//! - **RoutingDomain**: owns all of the above plus the router registry
//!
//! # Example
//!
//! ```
//! use citadel_routing::{Direction, Exit, Locator, RoutingConfig, RoutingDomain, StaticTopology};
//!
//! let domain = RoutingDomain::new(RoutingConfig::synchronous()).unwrap();
//! let topology = StaticTopology::new();
//!
//! let a = domain.create(Locator::ORIGIN);
//! let b = domain.create(Locator::ORIGIN.step(Direction::EAST));
//! topology.place(a.locator(), a.id());
//! topology.place(b.locator(), b.id());
//! topology.link(a.locator(), b.locator(), 3, false);
//!
//! domain.update_all(&topology, true);
//! assert_eq!(a.exit_for(&b.id()), Some(Exit::Toward(Direction::EAST)));
//! assert_eq!(a.cost_to(&b.id()), Some(3));
//! ```

mod adjacency;
mod builder;
mod config;
mod cost_index;
mod domain;
mod events;
mod id;
mod locator;
mod lsa;
mod router;
pub mod error;
pub mod lsdb;
pub mod scheduler;
pub mod topology;

pub use adjacency::{AdjacencyChange, AdjacencyTracker};
pub use builder::{build_route_tables, RouteCost, RouteTables};
pub use config::RoutingConfig;
pub use cost_index::CostIndex;
pub use domain::RoutingDomain;
pub use error::{Error, Result};
pub use events::RoutingEvent;
pub use id::{NodeId, ProviderId};
pub use locator::{Direction, Exit, Locator, EXIT_COUNT};
pub use lsa::{ExitRoute, LinkMetric, LinkStateAdvertisement};
pub use lsdb::{LinkStateDatabase, LsdbSnapshot};
pub use router::Router;
pub use topology::{ProbedNeighbor, StaticTopology, Topology};
