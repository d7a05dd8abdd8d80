
use std::io::{self, Write};

use crate::node::{Node, NodeState};
use crate::sim::Sim;

/// Write the per-tick status report: one line per node plus the per-state
/// rosters
///
/// This is the operator-facing state dump; the event trace goes through the
/// `log` facade instead.
pub fn write_status<W: Write, R>(w: &mut W, sim: &Sim<R>) -> io::Result<()> {
    writeln!(
        w,
        "tick {} (slot {}) ready {}/{}",
        sim.tick(),
        sim.config().slot_at(sim.tick().max(1)),
        sim.ready_count(),
        sim.len()
    )?;

    for node in sim.nodes() {
        write_node(w, node)?;
    }

    for state in &[NodeState::NotReady, NodeState::Waiting, NodeState::Ready] {
        let roster: Vec<String> = sim
            .nodes()
            .filter(|n| n.state == *state)
            .map(|n| n.id.to_string())
            .collect();
        writeln!(w, "  {}: [{}]", state, roster.join(" "))?;
    }

    Ok(())
}

fn write_node<W: Write>(w: &mut W, node: &Node) -> io::Result<()> {
    write!(
        w,
        "  node {} {} slot={} hello={} error={}",
        node.id, node.state, node.slot, node.snd_hello, node.snd_error
    )?;

    match node.ready_time {
        Some(t) => write!(w, " ready_at={}", t)?,
        None => write!(w, " ready_at=-")?,
    }

    let neighbors: Vec<String> = node.neighbors.iter().map(|n| n.to_string()).collect();
    write!(w, " neighbors=[{}]", neighbors.join(" "))?;

    let markings: Vec<String> = node
        .markings
        .iter()
        .map(|(slot, owner)| format!("{}->{}", slot, owner))
        .collect();
    writeln!(w, " vectors={{{}}}", markings.join(" "))
}
