//! Tree stats — summarize a published story snapshot.
//!
//! Usage: tree_stats [--file <story_state.json>]
//!
//! Prints scene/choice totals, per-depth fan-out, and the pending-leaf
//! frontier so a long run can be checked at a glance while it grows.

use std::path::Path;

use storyloom::core::snapshot::Snapshot;
use storyloom::schema::story::SceneSnapshot;

#[derive(Default)]
struct Stats {
    scenes: usize,
    choices: usize,
    pending: usize,
    /// (scene count, total choices) indexed by depth - 1.
    per_depth: Vec<(usize, usize)>,
}

fn walk(scene: &SceneSnapshot, depth: usize, stats: &mut Stats) {
    stats.scenes += 1;
    if stats.per_depth.len() < depth {
        stats.per_depth.resize(depth, (0, 0));
    }
    stats.per_depth[depth - 1].0 += 1;
    stats.per_depth[depth - 1].1 += scene.child_choices.len();

    for choice in &scene.child_choices {
        stats.choices += 1;
        match &choice.child_scene {
            Some(child) => walk(child, depth + 1, stats),
            None => stats.pending += 1,
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let mut file = "story_state.json".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--file" if i + 1 < args.len() => {
                i += 1;
                file = args[i].clone();
            }
            "--help" | "-h" => {
                println!("Usage: tree_stats [--file <story_state.json>]");
                return;
            }
            other => {
                eprintln!("Unknown argument: {other}");
                eprintln!("Usage: tree_stats [--file <story_state.json>]");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let snapshot = match Snapshot::load(Path::new(&file)) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            eprintln!("Error reading snapshot '{file}': {e}");
            std::process::exit(1);
        }
    };

    let mut stats = Stats::default();
    walk(&snapshot.story_tree, 1, &mut stats);

    println!("Snapshot: {file}");
    println!("  published at: {} (unix)", snapshot.metadata.timestamp);
    if let Some(id) = snapshot.metadata.current_id {
        println!("  cursor: current={id} last_added={:?}", snapshot.metadata.last_added_id);
    }
    println!("  scenes: {}", stats.scenes);
    println!("  choices: {}", stats.choices);
    println!("  pending leaves: {}", stats.pending);
    println!("  per depth:");
    for (i, (scenes, choices)) in stats.per_depth.iter().enumerate() {
        let avg = if *scenes > 0 {
            *choices as f64 / *scenes as f64
        } else {
            0.0
        };
        println!(
            "    depth {}: {} scene(s), {} choice(s), avg fan-out {:.2}",
            i + 1,
            scenes,
            choices,
            avg
        );
    }
}
