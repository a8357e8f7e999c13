//! Citadel Route
//!
//! Assemble a hexagonal disk of routers and print what the center router
//! learned.
//!
//! Usage: `citadel-route [radius] [seed] [--destroy] [--json]`
//!
//! `--destroy` removes the router east of the center after the mesh has
//! converged and prints the tables as they stand afterwards, along with the
//! routers that reacted to the removal.

use std::collections::{BTreeSet, HashMap};
use std::env;
use std::sync::Arc;
use std::time::Duration;

use citadel_routing::{
    Direction, Exit, Locator, NodeId, ProviderId, Router, RoutingConfig, RoutingDomain,
    RoutingEvent, StaticTopology,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Serialize)]
struct RouteEntry {
    node: String,
    locator: Locator,
    exit: Exit,
    cost: u64,
    blocks_capability: bool,
}

#[derive(Debug, Serialize)]
struct Report {
    origin: String,
    version: u64,
    routers: usize,
    routes: Vec<RouteEntry>,
    capabilities: Vec<ProviderId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    affected: Vec<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "citadel_routing=info,citadel_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Parse command line args
    let args: Vec<String> = env::args().skip(1).collect();
    let json = args.iter().any(|a| a == "--json");
    let destroy = args.iter().any(|a| a == "--destroy");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();

    let radius: i64 = positional
        .first()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3);
    let seed: u64 = positional
        .get(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(42);

    let config = RoutingConfig::from_env()?;
    let domain = RoutingDomain::new(config)?;
    let topology = StaticTopology::new();
    let mut rng = StdRng::seed_from_u64(seed);

    let locators = disk(radius);
    let mut routers: HashMap<Locator, Arc<Router>> = HashMap::new();
    for at in &locators {
        let router = domain.create(*at);
        topology.place(*at, router.id());
        if rng.gen_bool(0.1) {
            topology.attach_provider(at, ProviderId(rng.gen()));
        }
        routers.insert(*at, router);
    }
    for at in &locators {
        // Half the planar directions cover every undirected pair once.
        for direction in [Direction::EAST, Direction::NORTHEAST, Direction::NORTHWEST] {
            let next = at.step(direction);
            if routers.contains_key(&next) {
                topology.link(*at, next, rng.gen_range(1..10), rng.gen_bool(0.15));
            }
        }
    }
    tracing::info!(routers = domain.len(), radius, seed, "Mesh assembled");

    domain.update_all(&topology, true);
    domain.set_bulk_build_done(true);
    domain.update_all(&topology, false);
    if !domain.wait_idle(Duration::from_secs(30)) {
        tracing::warn!("Recompute queue did not drain in time");
    }

    let origin = routers
        .get(&Locator::ORIGIN)
        .ok_or("radius must be non-negative")?
        .clone();

    let mut affected = Vec::new();
    if destroy {
        let east = Locator::ORIGIN.step(Direction::EAST);
        if let Some(victim) = routers.remove(&east) {
            let mut events = domain.subscribe();
            domain.destroy(&victim.id())?;
            topology.remove(&east);
            tracing::info!("Destroyed relay {} at {}", victim.id(), east);

            let mut touched = BTreeSet::new();
            while let Ok(event) = events.try_recv() {
                if matches!(event, RoutingEvent::LsaPublished { .. }) {
                    touched.insert(event.node());
                }
            }
            affected = touched.iter().map(|id| id.to_string()).collect();
        }
    }

    let mut report = report(&origin, &domain, &routers);
    report.affected = affected;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text(&report);
    }

    Ok(())
}

/// Cells within `radius` of the origin on layer 0.
fn disk(radius: i64) -> Vec<Locator> {
    let mut cells = Vec::new();
    for q in -radius..=radius {
        for r in -radius..=radius {
            let at = Locator::planar(q, r);
            if at.hex_distance(&Locator::ORIGIN) <= radius.unsigned_abs() {
                cells.push(at);
            }
        }
    }
    cells
}

fn report(
    origin: &Router,
    domain: &RoutingDomain,
    routers: &HashMap<Locator, Arc<Router>>,
) -> Report {
    let locator_of: HashMap<NodeId, Locator> =
        routers.iter().map(|(at, r)| (r.id(), *at)).collect();

    let order = origin.nodes_by_ascending_cost();
    let tables = origin.tables();
    let routes = order
        .iter()
        .filter_map(|id| {
            let exit = tables.exit_for(id)?;
            let cost = tables.cost_table.get(id);
            Some(RouteEntry {
                node: id.to_string(),
                locator: locator_of.get(id).copied().unwrap_or_default(),
                exit,
                cost: cost.map_or(0, |c| c.cost),
                blocks_capability: cost.is_some_and(|c| c.blocks_capability),
            })
        })
        .collect();

    Report {
        origin: origin.id().to_string(),
        version: tables.version,
        routers: domain.len(),
        routes,
        capabilities: tables.capabilities.iter().copied().collect(),
        affected: Vec::new(),
    }
}

fn print_text(report: &Report) {
    println!("Citadel Route");
    println!("=============");
    println!();
    println!("Origin:   {}", report.origin);
    println!("Routers:  {}", report.routers);
    println!("Version:  {}", report.version);
    println!();
    println!("{:<34} {:>14} {:<16} {:>6} {}", "node", "locator", "exit", "cost", "blocked");
    for route in &report.routes {
        println!(
            "{:<34} {:>14} {:<16} {:>6} {}",
            route.node,
            route.locator.to_string(),
            route.exit.to_string(),
            route.cost,
            if route.blocks_capability { "yes" } else { "" }
        );
    }
    println!();
    if report.capabilities.is_empty() {
        println!("No capability providers reachable.");
    } else {
        let names: Vec<String> = report.capabilities.iter().map(|p| p.to_string()).collect();
        println!("Capabilities: {}", names.join(", "));
    }
    if !report.affected.is_empty() {
        println!("Republished after destroy: {}", report.affected.join(", "));
    }
}
