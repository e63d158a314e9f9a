//! Cycle detection over the dependency graph.

use crate::{Graph, ResolveError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Fail if any cycle exists anywhere in the graph.
///
/// Three-color depth-first search: reaching a gray node means the current
/// path loops back onto itself.
pub fn detect_cycles(graph: &Graph) -> Result<()> {
    let mut colors = vec![Color::White; graph.len()];
    let mut path = Vec::new();

    for start in 0..graph.len() {
        if colors[start] == Color::White {
            if let Some(cycle) = find_cycle(graph, start, &mut colors, &mut path) {
                let mut names: Vec<String> = cycle.iter().map(|&i| graph.node(i).name.clone()).collect();
                names.push(graph.node(cycle[0]).name.clone());
                return Err(ResolveError::Cycle { path: names });
            }
        }
    }

    Ok(())
}

/// Find a cycle reachable from `node`.
fn find_cycle(
    graph: &Graph,
    node: usize,
    colors: &mut [Color],
    path: &mut Vec<usize>,
) -> Option<Vec<usize>> {
    colors[node] = Color::Gray;
    path.push(node);

    for &dep in &graph.node(node).dependencies {
        match colors[dep] {
            Color::White => {
                if let Some(cycle) = find_cycle(graph, dep, colors, path) {
                    return Some(cycle);
                }
            }
            Color::Gray => {
                // dep is on the current path
                let start = path.iter().position(|&id| id == dep).unwrap_or(0);
                return Some(path[start..].to_vec());
            }
            Color::Black => {}
        }
    }

    path.pop();
    colors[node] = Color::Black;
    None
}
