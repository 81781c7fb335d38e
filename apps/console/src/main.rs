mod config;
mod context;
mod controller;
mod render;

use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use shared::domain::{UserFilters, UserId};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    context::AppContext,
    controller::{
        events::UiEvent,
        orchestration::Controller,
        reducer::{FormValues, ViewState},
    },
};

#[derive(Parser, Debug)]
#[command(name = "usuarios", about = "Manage the usuarios directory")]
struct Cli {
    /// Path to a TOML settings file.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List users, newest first.
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        profesion: Option<String>,
        #[arg(long)]
        ciudad: Option<String>,
    },
    Show {
        id: i64,
    },
    Create {
        #[arg(long)]
        nombre: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        telefono: Option<String>,
        #[arg(long)]
        edad: Option<String>,
        #[arg(long)]
        ciudad: Option<String>,
        #[arg(long)]
        profesion: Option<String>,
    },
    /// Update a user; omitted flags keep their value and an empty one clears it.
    Update {
        id: i64,
        #[arg(long)]
        nombre: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        telefono: Option<String>,
        #[arg(long)]
        edad: Option<String>,
        #[arg(long)]
        ciudad: Option<String>,
        #[arg(long)]
        profesion: Option<String>,
    },
    Delete {
        id: i64,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    Stats,
    /// Export every user as JSON.
    Export {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Keep the listing on screen and refresh it on every remote change.
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = config::load_settings(cli.config.as_deref());
    let ctx = AppContext::build(settings).await?;
    let controller = ctx.controller();

    let ok = if matches!(cli.command, Command::Watch) || controller.connect().await {
        run(&ctx, &controller, cli.command).await?
    } else {
        false
    };

    print_notifications(&controller).await;
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn run(ctx: &AppContext, controller: &Arc<Controller>, command: Command) -> Result<bool> {
    let ok = match command {
        Command::List {
            search,
            profesion,
            ciudad,
        } => {
            let ok = controller
                .apply_filters(UserFilters {
                    search,
                    profesion,
                    ciudad,
                })
                .await;
            println!("{}", render::listing(&controller.snapshot().await, &Local));
            ok
        }
        Command::Show { id } => match ctx.dal.read_one(UserId(id)).await {
            Ok(user) => {
                println!("{}", render::user_detail(&user, &Local));
                true
            }
            Err(err) => {
                eprintln!("❌ {err}");
                false
            }
        },
        Command::Create {
            nombre,
            email,
            telefono,
            edad,
            ciudad,
            profesion,
        } => {
            let values = FormValues {
                nombre,
                email,
                telefono: telefono.unwrap_or_default(),
                edad: edad.unwrap_or_default(),
                ciudad: ciudad.unwrap_or_default(),
                profesion: profesion.unwrap_or_default(),
            };
            submit(controller, values).await
        }
        Command::Update {
            id,
            nombre,
            email,
            telefono,
            edad,
            ciudad,
            profesion,
        } => {
            if controller.begin_edit(UserId(id)).await {
                let mut values = controller.snapshot().await.form.values;
                let overrides = [
                    (&mut values.nombre, nombre),
                    (&mut values.email, email),
                    (&mut values.telefono, telefono),
                    (&mut values.edad, edad),
                    (&mut values.ciudad, ciudad),
                    (&mut values.profesion, profesion),
                ];
                for (slot, value) in overrides {
                    if let Some(value) = value {
                        *slot = value;
                    }
                }
                submit(controller, values).await
            } else {
                false
            }
        }
        Command::Delete { id, yes } => delete(controller, UserId(id), yes).await?,
        Command::Stats => {
            let ok = controller.load_stats().await;
            println!("{}", render::stats(&controller.snapshot().await.stats));
            ok
        }
        Command::Export { dir } => {
            let dir = dir.unwrap_or_else(|| ctx.settings.export_dir.clone());
            controller.export(&dir).await.is_some()
        }
        Command::Watch => watch(controller).await?,
    };
    Ok(ok)
}

async fn submit(controller: &Controller, values: FormValues) -> bool {
    if controller.submit_form(values).await {
        return true;
    }
    let state = controller.snapshot().await;
    if !state.form.errors.is_empty() {
        eprintln!("{}", render::form_summary(&state.form));
    }
    false
}

async fn delete(controller: &Controller, id: UserId, yes: bool) -> Result<bool> {
    controller.request_delete(id).await;
    let Some(modal) = controller.snapshot().await.modal else {
        return Ok(false);
    };

    if !yes {
        print!("{}", render::confirmation(&modal));
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            controller.dismiss_delete().await;
            println!("Cancelled");
            return Ok(true);
        }
    }
    Ok(controller.confirm_delete().await)
}

async fn print_notifications(controller: &Controller) {
    for notification in controller.drain_notifications().await {
        println!("{}", notification.text());
    }
}

fn print_screen(state: &ViewState) {
    if let Some(status) = &state.connection {
        println!("{}", status.label());
    }
    println!("{}", render::stats(&state.stats));
    println!("{}", render::listing(state, &Local));
}

async fn watch(controller: &Arc<Controller>) -> Result<bool> {
    if !controller.start().await {
        return Ok(false);
    }
    print_screen(&controller.snapshot().await);
    print_notifications(controller).await;
    let mut events = controller.subscribe_events();
    if !controller.is_following_changes().await {
        warn!("console: live updates unavailable, showing a static listing");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("console: interrupted");
                break;
            }
            event = events.recv() => match event {
                Ok(UiEvent::Refreshed) => print_screen(&controller.snapshot().await),
                Ok(UiEvent::ListRendered { .. } | UiEvent::ListFailed | UiEvent::StatsUpdated(_)) => {}
                Ok(UiEvent::Notified(_)) => print_notifications(controller).await,
                Ok(UiEvent::RemoteChange(change)) => {
                    info!(kind = ?change.kind, user_id = ?change.user_id(), "console: remote change");
                }
                Ok(UiEvent::Connection(status)) => println!("{}", status.label()),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "console: event stream lagged");
                    print_screen(&controller.snapshot().await);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    controller.stop_following_changes().await;
    Ok(true)
}
