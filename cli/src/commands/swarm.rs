// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Swarm commands
//!
//! Commands: list, show, launch, inject, terminate, watch

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::collections::HashMap;
use std::io::Write;

use codeswarm_core::domain::protocol::NodeTarget;
use codeswarm_sdk::{ClientStore, CodeswarmClient, Dashboard, LaunchRequest};
use codeswarm_swarm::domain::{SwarmRecord, SwarmStatus};

use crate::daemon::backend_url;

#[derive(Subcommand)]
pub enum SwarmCommand {
    /// List registered swarms
    List,

    /// Show one swarm
    Show {
        /// Swarm alias
        alias: String,
    },

    /// Launch a new swarm
    Launch {
        /// Number of nodes
        #[arg(short, long, default_value_t = 1)]
        nodes: u32,

        /// System prompt for every node
        #[arg(short, long)]
        prompt: String,

        /// Alias to register the swarm under (default: swarm-<id prefix>)
        #[arg(short, long)]
        alias: Option<String>,
    },

    /// Send a prompt to a running swarm
    Inject {
        /// Swarm alias
        alias: String,

        #[arg(short, long)]
        prompt: String,

        /// Target node index, or "all"
        #[arg(short, long, default_value = "all")]
        nodes: NodeTarget,
    },

    /// Terminate a swarm
    Terminate {
        /// Swarm alias
        alias: String,
    },

    /// Stream reconciled conversation turns as they arrive
    Watch {
        /// Only show this swarm
        alias: Option<String>,
    },
}

pub async fn handle_command(command: SwarmCommand, host: &str, port: u16) -> Result<()> {
    let client = CodeswarmClient::new(&backend_url(host, port))?;

    match command {
        SwarmCommand::List => list(&client).await,
        SwarmCommand::Show { alias } => show(&client, &alias).await,
        SwarmCommand::Launch {
            nodes,
            prompt,
            alias,
        } => launch(&client, nodes, prompt, alias).await,
        SwarmCommand::Inject {
            alias,
            prompt,
            nodes,
        } => inject(&client, &alias, &prompt, nodes).await,
        SwarmCommand::Terminate { alias } => terminate(&client, &alias).await,
        SwarmCommand::Watch { alias } => watch(client, alias).await,
    }
}

async fn list(client: &CodeswarmClient) -> Result<()> {
    let swarms = client
        .list_swarms()
        .await
        .context("Failed to list swarms")?;

    if swarms.is_empty() {
        println!("{}", "No swarms registered".yellow());
        return Ok(());
    }

    println!(
        "{:<20} {:<14} {:<8} {:<6} {:<12} {}",
        "ALIAS".bold(),
        "SWARM ID".bold(),
        "JOB".bold(),
        "NODES".bold(),
        "STATUS".bold(),
        "SCHEDULER".bold()
    );
    for swarm in &swarms {
        println!(
            "{:<20} {:<14} {:<8} {:<6} {:<12} {}",
            swarm.alias,
            short_id(swarm.swarm_id.as_str()),
            swarm.job_id.as_deref().unwrap_or("-"),
            swarm.node_count,
            colored_status(&swarm.status),
            swarm.slurm_state.as_deref().unwrap_or("-").dimmed()
        );
    }
    Ok(())
}

async fn show(client: &CodeswarmClient, alias: &str) -> Result<()> {
    let swarm = client
        .get_swarm(alias)
        .await
        .with_context(|| format!("Failed to fetch swarm '{}'", alias))?;
    print_record(&swarm);
    Ok(())
}

async fn launch(
    client: &CodeswarmClient,
    nodes: u32,
    prompt: String,
    alias: Option<String>,
) -> Result<()> {
    let accepted = client
        .launch(&LaunchRequest {
            nodes,
            prompt,
            alias,
        })
        .await
        .context("Failed to launch swarm")?;

    println!(
        "{}",
        format!("✓ Launch requested (request {})", accepted.request_id).green()
    );
    if let Some(alias) = accepted.alias {
        println!("  Alias: {}", alias.bold());
    }
    println!(
        "  {}",
        "The swarm appears in `codeswarm swarm list` once the router confirms it.".dimmed()
    );
    Ok(())
}

async fn inject(
    client: &CodeswarmClient,
    alias: &str,
    prompt: &str,
    nodes: NodeTarget,
) -> Result<()> {
    let accepted = client
        .inject(alias, prompt, nodes)
        .await
        .with_context(|| format!("Failed to inject into '{}'", alias))?;
    println!(
        "{}",
        format!(
            "✓ Prompt sent to {} (nodes: {}, request {})",
            alias, nodes, accepted.request_id
        )
        .green()
    );
    Ok(())
}

async fn terminate(client: &CodeswarmClient, alias: &str) -> Result<()> {
    let accepted = client
        .terminate(alias)
        .await
        .with_context(|| format!("Failed to terminate '{}'", alias))?;
    println!(
        "{}",
        format!("✓ Termination requested for {} (request {})", alias, accepted.request_id).green()
    );
    Ok(())
}

async fn watch(client: CodeswarmClient, alias: Option<String>) -> Result<()> {
    let dashboard = Dashboard::connect(client);
    let mut changes = dashboard.store().subscribe();
    let mut feed_status = dashboard.status();
    let mut printer = TurnPrinter::new(alias);

    println!("{}", "Watching swarms (Ctrl+C to stop)".bold());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = feed_status.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *feed_status.borrow_and_update();
                println!("{}", format!("-- feed {}", status).dimmed());
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                changes.borrow_and_update();
                dashboard.store().read(|store| printer.render(store));
            }
        }
    }

    dashboard.close().await;
    Ok(())
}

/// Prints only what is new in each turn since the last render.
struct TurnPrinter {
    alias: Option<String>,
    /// (swarm, node, injection) -> (deltas printed, completion printed)
    seen: HashMap<(String, u32, String), (usize, bool)>,
    errors: (Option<String>, Option<String>),
}

impl TurnPrinter {
    fn new(alias: Option<String>) -> Self {
        Self {
            alias: alias.map(|a| a.to_lowercase()),
            seen: HashMap::new(),
            errors: (None, None),
        }
    }

    fn render(&mut self, store: &ClientStore) {
        let errors = (
            store.launch_error().map(str::to_string),
            store.inject_error().map(str::to_string),
        );
        if errors != self.errors {
            if let Some(e) = &errors.0 {
                println!("{}", format!("✗ Launch rejected: {}", e).red());
            }
            if let Some(e) = &errors.1 {
                println!("{}", format!("✗ Injection rejected: {}", e).red());
            }
            self.errors = errors;
        }

        for swarm in store.swarms() {
            if swarm.is_provisional() {
                continue;
            }
            if let Some(alias) = &self.alias {
                if swarm.alias.to_lowercase() != *alias {
                    continue;
                }
            }
            for node in swarm.nodes.values() {
                let prefix = format!("[{}:{}]", swarm.alias, node.node_id);
                for turn in node.turns.iter().filter(|t| !t.is_provisional()) {
                    let key = (
                        swarm.swarm_id.clone(),
                        node.node_id,
                        turn.injection_id.clone(),
                    );
                    let (printed, done) = self.seen.entry(key).or_insert((0, false));
                    if *printed == 0 && !*done && turn.deltas.is_empty() && !turn.completed {
                        continue;
                    }
                    if *printed == 0 && !*done {
                        println!("{} {} {}", prefix.cyan(), ">".bold(), turn.prompt);
                    }
                    if turn.deltas.len() > *printed {
                        let text = turn.deltas[*printed..].concat();
                        print!("{}", text);
                        let _ = std::io::stdout().flush();
                        *printed = turn.deltas.len();
                    }
                    if turn.completed && !*done {
                        println!();
                        println!("{} {}", prefix.cyan(), "✓ turn complete".green());
                        *done = true;
                    }
                }
            }
        }
    }
}

fn print_record(swarm: &SwarmRecord) {
    println!("{}", swarm.alias.bold());
    println!("  Swarm ID:  {}", swarm.swarm_id);
    println!("  Job ID:    {}", swarm.job_id.as_deref().unwrap_or("-"));
    println!("  Nodes:     {}", swarm.node_count);
    println!("  Status:    {}", colored_status(&swarm.status));
    if let Some(state) = &swarm.slurm_state {
        println!("  Scheduler: {}", state);
    }
    println!(
        "  Created:   {}",
        swarm.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}

fn colored_status(status: &SwarmStatus) -> colored::ColoredString {
    let text = status.as_str();
    match status {
        SwarmStatus::Running => text.green(),
        SwarmStatus::Pending => text.yellow(),
        SwarmStatus::Completed => text.blue(),
        SwarmStatus::Failed => text.red(),
        SwarmStatus::Terminated => text.dimmed(),
        SwarmStatus::Other(_) => text.normal(),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
