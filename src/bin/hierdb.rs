//! hierdb - command line access to the hierarchy stores
//!
//! Keys are strings. Results are printed to stdout as JSON, logs go to stderr.

use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context};
use serde_json::{json, Value};

use hierdb::{HierarchyIndex, StoreConfig};

fn usage() -> ! {
    eprintln!("Usage: hierdb [--config <file>] [--db <path>] <store> <command> [args]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <file>   JSON config file (HIERDB_* variables override it)");
    eprintln!("  --db <path>       Database path (default: hierarchy.hierdb)");
    eprintln!("  --graph <id>      DAG partition");
    eprintln!("  --tree-type <t>   Interval tree forest");
    eprintln!();
    eprintln!("DAG commands:");
    eprintln!("  dag add <start> <end>          Insert a direct edge");
    eprintln!("  dag remove <start> <end>       Remove a direct edge and its derived rows");
    eprintln!("  dag remove-vertex <v>          Remove every direct edge touching v");
    eprintln!("  dag in <v>                     Vertices that reach v");
    eprintln!("  dag out <v>                    Vertices reachable from v");
    eprintln!("  dag verify                     Check the closure against the direct edges");
    eprintln!();
    eprintln!("Tree commands:");
    eprintln!("  tree add <parent> <child>      Attach child under parent");
    eprintln!("  tree remove <parent> <child> [--keep-leaf]");
    eprintln!("                                 Detach child (a leaf is deleted unless --keep-leaf)");
    eprintln!("  tree move <new-parent> <child> Re-parent child with its subtree");
    eprintln!("  tree delete <node>             Delete node, promoting inner children");
    eprintln!("  tree subtree <node>            Descendants in pre-order");
    eprintln!("  tree children <node>           Direct children");
    eprintln!("  tree parent <node>             Direct parent");
    eprintln!("  tree ancestors <node>          Ancestors, nearest first");
    eprintln!("  tree roots                     Roots of the forest");
    eprintln!("  tree verify <tree-id>          Check interval numbering of one tree");
    process::exit(1);
}

struct Args {
    config: Option<PathBuf>,
    db: Option<PathBuf>,
    graph: Option<String>,
    tree_type: Option<String>,
    command: Vec<String>,
}

fn parse_args() -> Args {
    let mut args = Args {
        config: None,
        db: None,
        graph: None,
        tree_type: None,
        command: Vec::new(),
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config = Some(iter.next().unwrap_or_else(|| usage()).into()),
            "--db" => args.db = Some(iter.next().unwrap_or_else(|| usage()).into()),
            "--graph" => args.graph = Some(iter.next().unwrap_or_else(|| usage())),
            "--tree-type" => args.tree_type = Some(iter.next().unwrap_or_else(|| usage())),
            "-h" | "--help" => usage(),
            _ => args.command.push(arg),
        }
    }

    if args.command.len() < 2 {
        usage();
    }
    args
}

fn arg<'a>(command: &'a [String], i: usize, name: &str) -> anyhow::Result<&'a String> {
    command.get(i).with_context(|| format!("missing argument <{}>", name))
}

fn run_dag(config: &StoreConfig, db: &sled::Db, command: &[String]) -> anyhow::Result<Value> {
    let dag = config.dag_store::<String>(db)?;

    let out = match command[0].as_str() {
        "add" => {
            let edge = dag.add_edges(arg(command, 1, "start")?, arg(command, 2, "end")?)?;
            json!({ "id": edge.id, "start": edge.start_vertex, "end": edge.end_vertex })
        }
        "remove" => {
            let removed = dag.remove_edges(arg(command, 1, "start")?, arg(command, 2, "end")?)?;
            json!({ "removed": removed })
        }
        "remove-vertex" => {
            let removed = dag.remove_edges_of_vertex(arg(command, 1, "vertex")?)?;
            json!({ "removed": removed })
        }
        "in" => json!(dag.find_incoming_vertices(arg(command, 1, "vertex")?)?),
        "out" => json!(dag.find_outgoing_vertices(arg(command, 1, "vertex")?)?),
        "verify" => {
            dag.verify_closure()?;
            json!({ "ok": true, "rows": dag.edges()?.len() })
        }
        other => bail!("unknown dag command: {}", other),
    };
    Ok(out)
}

fn run_tree(config: &StoreConfig, db: &sled::Db, command: &[String]) -> anyhow::Result<Value> {
    let tree = config.tree_store::<String>(db)?;

    let out = match command[0].as_str() {
        "add" => {
            tree.link(arg(command, 1, "parent")?, arg(command, 2, "child")?)?;
            json!({ "ok": true })
        }
        "remove" => {
            let keep_leaf = command.iter().any(|a| a == "--keep-leaf");
            tree.remove_child(arg(command, 1, "parent")?, arg(command, 2, "child")?, !keep_leaf)?;
            json!({ "ok": true })
        }
        "move" => {
            tree.move_node(arg(command, 1, "new-parent")?, arg(command, 2, "child")?)?;
            json!({ "ok": true })
        }
        "delete" => {
            tree.delete(arg(command, 1, "node")?)?;
            json!({ "ok": true })
        }
        "subtree" => json!(tree.get_sub_tree(arg(command, 1, "node")?)?),
        "children" => json!(tree.get_children(arg(command, 1, "node")?)?),
        "parent" => json!(tree.get_parent(arg(command, 1, "node")?)?),
        "ancestors" => json!(tree.get_ancestors(arg(command, 1, "node")?)?),
        "roots" => json!(tree.get_roots()?),
        "verify" => {
            tree.verify_tree(arg(command, 1, "tree-id")?)?;
            json!({ "ok": true })
        }
        other => bail!("unknown tree command: {}", other),
    };
    Ok(out)
}

fn main() -> anyhow::Result<()> {
    let args = parse_args();

    let mut config = StoreConfig::load(args.config.as_deref())?;
    if let Some(db) = args.db {
        config.path = db;
    }
    if let Some(graph) = args.graph {
        config.graph_id = graph;
    }
    if let Some(tree_type) = args.tree_type {
        config.tree_type = tree_type;
    }

    let level: tracing::Level = config
        .log_level
        .parse()
        .with_context(|| format!("invalid log level: {}", config.log_level))?;
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    let db = config.open_db()?;

    let (store, command) = (args.command[0].as_str(), &args.command[1..]);
    let out = match store {
        "dag" => run_dag(&config, &db, command)?,
        "tree" => run_tree(&config, &db, command)?,
        other => bail!("unknown store: {} (expected dag or tree)", other),
    };

    db.flush().context("flush database")?;
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
