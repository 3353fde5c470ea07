//! Outlet relinking after merge-back.
//!
//! Merged cells inherit outlets that name fine cells which no longer exist.
//! Each such outlet is rewritten to the merged cell that now owns the fine
//! cell. When that owner is the cell itself, the original routing chain is
//! followed downstream until it leaves the cell.

use std::collections::{HashMap, HashSet};

use crate::cell::{Cell, SinkKind, UNROUTED};
use crate::subcatchment::Subcatchment;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelinkStats {
    /// Outlets pointed at a different target
    pub rewritten: usize,
    /// Cells whose routing never left the cell and became sinks
    pub sinks: usize,
}

#[derive(Debug, PartialEq)]
enum Target {
    Unchanged,
    Merged(String),
    External { name: String, id: i64, coord: (f64, f64) },
    Unrouted,
}

/// Rewrite outlets of `cells` that name absorbed original cells.
///
/// `ownership` maps original cell names to the merged cell that owns them;
/// `original` supplies the pre-dissolve routing chain.
pub fn relink_outlets(
    cells: &mut [Cell],
    ownership: &HashMap<String, String>,
    original: &[Subcatchment],
) -> RelinkStats {
    let sources: HashMap<&str, &Subcatchment> = original.iter().map(|s| (s.name.as_str(), s)).collect();
    let positions: HashMap<String, (usize, (f64, f64))> = cells
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name.clone(), (i, (c.center_x, c.center_y))))
        .collect();

    let mut stats = RelinkStats::default();
    for cell in cells.iter_mut() {
        if !cell.is_routed() {
            continue;
        }
        match resolve(&cell.name, &cell.outlet, ownership, &sources) {
            Target::Unchanged => {}
            Target::Merged(owner) => {
                let (id, coord) = positions
                    .get(&owner)
                    .map(|&(i, xy)| (i as i64, xy))
                    .unwrap_or((cell.outlet_id, cell.outlet_coord));
                cell.set_outlet(&owner, id, coord);
                stats.rewritten += 1;
            }
            Target::External { name, id, coord } => {
                cell.set_outlet(&name, id, coord);
                stats.rewritten += 1;
            }
            Target::Unrouted => {
                cell.clear_outlet();
                cell.is_sink = SinkKind::Sink;
                stats.sinks += 1;
            }
        }
    }
    stats
}

fn resolve(
    cell_name: &str,
    outlet: &str,
    ownership: &HashMap<String, String>,
    sources: &HashMap<&str, &Subcatchment>,
) -> Target {
    let mut current = outlet.to_string();
    let mut via: Option<&Subcatchment> = None;
    let mut seen: HashSet<String> = HashSet::new();
    loop {
        if current == UNROUTED {
            return Target::Unrouted;
        }
        match ownership.get(&current) {
            None => {
                return match via {
                    None => Target::Unchanged,
                    Some(src) => Target::External {
                        name: current,
                        id: src.outlet_id,
                        coord: src.outlet_coord,
                    },
                }
            }
            Some(owner) if owner != cell_name => return Target::Merged(owner.clone()),
            Some(_) => {
                let Some(src) = sources.get(current.as_str()).copied() else {
                    return Target::Unrouted;
                };
                if !seen.insert(current) {
                    return Target::Unrouted;
                }
                via = Some(src);
                current = src.outlet.clone();
            }
        }
    }
}
