//! Reflexion analysis CLI.
//!
//! Loads a facts file (implementation graph, architecture graph and mapping
//! as a TOON document), runs the analysis once and reports convergences,
//! absences and divergences.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use incremental_reflexion::facts::{read_facts, FactsError};
use incremental_reflexion::{EdgeState, NodeId, Reflexion, ReflexionGraph, Snapshot, TracingObserver};

/// Check an implementation against its architecture.
#[derive(Parser)]
#[command(name = "reflexion", about = "Reflexion analysis of an implementation against its architecture")]
struct Cli {
    /// Path to the facts file.
    facts: PathBuf,

    /// Treat dependencies onto enclosing components as divergences.
    #[arg(long)]
    no_parent_dependencies: bool,

    /// Print the full snapshot as JSON instead of the report.
    #[arg(long)]
    json: bool,

    /// Exit with status 2 when any violation is found.
    #[arg(long)]
    fail_on_violations: bool,
}

fn main() {
    //stdout carries the report or the JSON snapshot, logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let cli = Cli::parse();
    process::exit(run(&cli, &mut io::stdout().lock()));
}

/// Returns exit code: 0 = success, 1 = invalid facts, 2 = violations found
/// (only with `--fail-on-violations`), 3 = I/O error.
fn run(cli: &Cli, out: &mut impl Write) -> i32 {
    let facts = match read_facts(&cli.facts) {
        Ok(f) => f,
        Err(FactsError::Io { path, source }) => {
            eprintln!("Error: failed to read '{}': {}", path.display(), source);
            return 3;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let graph = match facts.load() {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let mut config = facts.config.clone();
    if cli.no_parent_dependencies {
        config.allow_dependencies_to_parents = false;
    }

    let mut reflexion = Reflexion::new(graph, config);
    reflexion.register(TracingObserver);
    if let Err(e) = reflexion.run() {
        eprintln!("Error: {}", e);
        return 1;
    }

    let snapshot = reflexion.snapshot();
    let written = if cli.json {
        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => writeln!(out, "{}", json),
            Err(e) => {
                eprintln!("Error: failed to serialize snapshot: {}", e);
                return 1;
            }
        }
    } else {
        print_report(out, &reflexion, &snapshot)
    };
    if let Err(e) = written {
        eprintln!("Error: failed to write output: {}", e);
        return 3;
    }

    if cli.fail_on_violations && reflexion.count_violations() > 0 {
        2
    } else {
        0
    }
}

fn print_report(out: &mut impl Write, reflexion: &Reflexion, snapshot: &Snapshot) -> io::Result<()> {
    let g = reflexion.graph();

    for entry in &snapshot.architecture {
        let label = match entry.state {
            EdgeState::Convergent => "convergence",
            EdgeState::Absent => "absence",
            EdgeState::AllowedAbsent => "allowed absence",
            _ => continue,
        };
        writeln!(
            out,
            "{label}: {} -[{}]-> {} ({} dependencies)",
            name(g, entry.from),
            entry.kind,
            name(g, entry.to),
            entry.counter
        )?;
    }

    for entry in snapshot.propagated.iter().filter(|p| p.state == EdgeState::Divergent) {
        writeln!(
            out,
            "divergence: {} -[{}]-> {} ({} dependencies)",
            name(g, entry.key.from),
            entry.key.kind,
            name(g, entry.key.to),
            entry.multiplicity
        )?;
        for cause in entry.causes.iter().filter_map(|id| g.edge(*id)) {
            writeln!(out, "    {} -> {}", name(g, cause.from), name(g, cause.to))?;
        }
    }

    let summary = snapshot.summary();
    writeln!(
        out,
        "{} convergent, {} absent, {} divergent, {} allowed, {} implicitly allowed, {} unmapped",
        summary.convergent,
        summary.absent,
        summary.divergent,
        summary.allowed,
        summary.implicitly_allowed,
        summary.unmapped
    )
}

fn name(g: &ReflexionGraph, id: NodeId) -> &str {
    g.node(id).map_or("?", |n| n.name.as_str())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use incremental_reflexion::facts::{to_toon, EdgeFact, Facts, MappingFact, NodeFact};
    use incremental_reflexion::SubgraphKind;

    use super::*;

    fn shop() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/shop.toon")
    }

    fn cli(facts: PathBuf) -> Cli {
        Cli {
            facts,
            no_parent_dependencies: false,
            json: false,
            fail_on_violations: false,
        }
    }

    fn run_captured(cli: &Cli) -> (i32, String) {
        let mut out = Vec::new();
        let code = run(cli, &mut out);
        (code, String::from_utf8(out).unwrap())
    }

    fn node(name: &str, graph: SubgraphKind, parent: Option<&str>) -> NodeFact {
        NodeFact {
            name: name.to_string(),
            graph,
            node_type: String::new(),
            parent: parent.map(str::to_string),
        }
    }

    //Page (in Web) calls Shell (in Frontend), and Web sits inside Frontend
    fn upward_dependency() -> Facts {
        Facts {
            nodes: vec![
                node("Frontend", SubgraphKind::Architecture, None),
                node("Web", SubgraphKind::Architecture, Some("Frontend")),
                node("Page", SubgraphKind::Implementation, None),
                node("Shell", SubgraphKind::Implementation, None),
            ],
            edges: vec![EdgeFact {
                from: "Page".into(),
                to: "Shell".into(),
                graph: SubgraphKind::Implementation,
                kind: "call".into(),
                optional: false,
            }],
            mapping: vec![
                MappingFact { from: "Page".into(), to: "Web".into() },
                MappingFact { from: "Shell".into(), to: "Frontend".into() },
            ],
            ..Facts::default()
        }
    }

    #[test]
    fn report_lists_convergences_and_divergences_with_causes() {
        let (code, out) = run_captured(&cli(shop()));
        assert_eq!(code, 0);
        assert!(out.contains("convergence: Frontend -[call]-> Billing (2 dependencies)"));
        assert!(out.contains("allowed absence: Billing -[call]-> Storage (0 dependencies)"));
        assert!(out.contains("divergence: Billing -[call]-> Web (1 dependencies)"));
        assert!(out.contains("    Ledger -> Checkout"));
        assert!(out.contains("divergence: Storage -[call]-> Billing (1 dependencies)"));
        assert!(out.ends_with("1 convergent, 0 absent, 2 divergent, 1 allowed, 0 implicitly allowed, 0 unmapped\n"));
    }

    #[test]
    fn json_output_is_a_parseable_snapshot() {
        let mut args = cli(shop());
        args.json = true;
        let (code, out) = run_captured(&args);
        assert_eq!(code, 0);

        let snapshot: Snapshot = serde_json::from_str(&out).unwrap();
        let summary = snapshot.summary();
        assert_eq!(summary.divergent, 2);
        assert_eq!(summary.allowed_absent, 1);
        assert_eq!(snapshot.propagated.len(), 3);
    }

    #[test]
    fn violations_only_fail_the_run_when_asked() {
        let mut args = cli(shop());
        args.fail_on_violations = true;
        assert_eq!(run_captured(&args).0, 2);
    }

    #[test]
    fn no_parent_dependencies_turns_upward_dependencies_into_violations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upward.toon");
        fs::write(&path, to_toon(&upward_dependency()).unwrap()).unwrap();

        let mut args = cli(path);
        args.fail_on_violations = true;
        let (code, out) = run_captured(&args);
        assert_eq!(code, 0);
        assert!(out.contains("0 divergent, 0 allowed, 1 implicitly allowed"));

        args.no_parent_dependencies = true;
        let (code, out) = run_captured(&args);
        assert_eq!(code, 2);
        assert!(out.contains("divergence: Web -[call]-> Frontend (1 dependencies)"));
    }

    #[test]
    fn invalid_facts_exit_with_1_and_missing_files_with_3() {
        let dir = tempfile::tempdir().unwrap();
        let mut facts = upward_dependency();
        facts.mapping.push(MappingFact { from: "Page".into(), to: "Nowhere".into() });
        let unknown = dir.path().join("unknown.toon");
        fs::write(&unknown, to_toon(&facts).unwrap()).unwrap();
        assert_eq!(run_captured(&cli(unknown)).0, 1);

        let (code, out) = run_captured(&cli(dir.path().join("missing.toon")));
        assert_eq!(code, 3);
        assert!(out.is_empty());
    }
}
