use anyhow::{bail, Context, Result};
use humansize::{format_size, DECIMAL};
use plugboo_core::{init_logging, CoreEvent, LoaderStatus, Plugboo, Profile, SettingsStore};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

const USAGE: &str = "\
usage: plugboo [--data-dir <dir>] <command> [args]

commands:
  games                                   list supported games
  setup <game> <path>                     set a game's install folder
  loaders <game>                          list loaders and their versions
  create <game> <name> <loader> <version> create a profile and install its loader
  reinstall <profile>                     install the profile's loader again
  profiles [game]                         list profiles
  start <profile>                         launch the profile's loader and follow its output
  search <game> [query] [page]            search the content catalog
  install-mod <profile> <package>         install a content package
  mods <profile>                          list installed mods
  delete <profile>                        delete a profile and its files";

fn stamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

fn print_event(event: &CoreEvent) {
    match event {
        CoreEvent::DownloadProgress { task, percent } => println!("[{}] {} {}%", stamp(), task, percent),
        CoreEvent::LoaderInstalled { profile_id, success } => {
            println!("[{}] loader install for {}: {}", stamp(), profile_id, if *success { "done" } else { "failed" })
        }
        CoreEvent::PackageInstalled { profile_id, package_id, success } => println!(
            "[{}] package {} for {}: {}",
            stamp(),
            package_id,
            profile_id,
            if *success { "installed" } else { "failed" }
        ),
        CoreEvent::ProcessOutput { line, .. } => println!("[{}] > {}", stamp(), line),
        CoreEvent::ProcessExited { code, .. } => println!("[{}] loader exited with {:?}", stamp(), code),
    }
}

/// Accepts a profile id or a profile name.
fn find_profile(core: &Plugboo, key: &str) -> Result<Profile> {
    let profiles = core.profiles(None);
    profiles
        .iter()
        .find(|p| p.id == key)
        .or_else(|| profiles.iter().find(|p| p.name == key))
        .cloned()
        .with_context(|| format!("no profile named or with id '{key}'"))
}

fn status_label(status: LoaderStatus) -> &'static str {
    match status {
        LoaderStatus::NotInstalled => "not installed",
        LoaderStatus::Installing => "installing",
        LoaderStatus::Ready => "ready",
    }
}

fn arg<'a>(args: &'a [String], i: usize, name: &str) -> Result<&'a str> {
    args.get(i).map(String::as_str).with_context(|| format!("missing <{name}>\n\n{USAGE}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let data_dir = match args.iter().position(|a| a == "--data-dir") {
        Some(i) => {
            let dir = args.get(i + 1).cloned().context("--data-dir needs a value")?;
            args.drain(i..=i + 1);
            PathBuf::from(dir)
        }
        None => SettingsStore::default_data_dir()?,
    };
    let Some(command) = args.first().cloned() else {
        println!("{USAGE}");
        return Ok(());
    };

    let log_filter = SettingsStore::new(&data_dir).and_then(|s| s.load()).map(|s| s.log_filter).unwrap_or_default();
    init_logging(&data_dir.join("logs"), &log_filter);
    let core = Plugboo::with_defaults(&data_dir)?;
    let mut rx = core.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(n)) => debug!("dropped {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let rest = &args[1..];
    match command.as_str() {
        "games" => {
            for game in core.games() {
                let path = game.install_path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "-".into());
                println!("{:<20} {:<20} {}", game.info.id, game.info.name, path);
            }
        }
        "setup" => {
            core.setup_game(arg(rest, 0, "game")?, &PathBuf::from(arg(rest, 1, "path")?))?;
            println!("ok");
        }
        "loaders" => {
            for listing in core.loaders(arg(rest, 0, "game")?).await? {
                println!("{} ({}/{})", listing.loader.id, listing.loader.owner, listing.loader.repo);
                if listing.versions.is_empty() {
                    println!("  no installable versions");
                }
                for v in listing.versions {
                    println!("  {:<12} {}", v.version, v.play_file.name);
                }
            }
        }
        "create" => {
            let (profile, job) = core
                .create_profile(arg(rest, 0, "game")?, arg(rest, 1, "name")?, arg(rest, 2, "loader")?, arg(rest, 3, "version")?)
                .await?;
            println!("created {} ({})", profile.name, profile.id);
            job.wait().await?;
        }
        "reinstall" => {
            let profile = find_profile(&core, arg(rest, 0, "profile")?)?;
            core.reinstall_loader(&profile.id)?.wait().await?;
        }
        "profiles" => {
            for p in core.profiles(rest.first().map(String::as_str)) {
                let version = p.loader.as_ref().map(|l| l.version.as_str()).unwrap_or("-");
                println!("{}  {:<20} {:<18} {:<10} {:<14} {} mods", p.id, p.name, p.game_id, version, status_label(p.status), p.mods.len());
            }
        }
        "start" => {
            let profile = find_profile(&core, arg(rest, 0, "profile")?)?;
            let mut exits = core.subscribe();
            core.start_profile(&profile.id)?;
            loop {
                match exits.recv().await {
                    Ok(CoreEvent::ProcessExited { profile_id, .. }) if profile_id == profile.id => break,
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        }
        "search" => {
            let page = rest.get(2).map(|p| p.parse::<u32>()).transpose().context("page must be a number")?.unwrap_or(1);
            let query = rest.get(1).map(String::as_str).unwrap_or("");
            for package in core.search_packages(arg(rest, 0, "game")?, query, page).await? {
                let size: u64 = package.files.iter().filter_map(|f| f.size).sum();
                println!("{:<10} {:<40} {:<20} {}", package.id, package.name, package.author, format_size(size, DECIMAL));
            }
        }
        "install-mod" => {
            let profile = find_profile(&core, arg(rest, 0, "profile")?)?;
            let installed = core.install_package(&profile.id, arg(rest, 1, "package")?)?.wait().await?;
            println!("installed {} {}", installed.name, installed.version);
        }
        "mods" => {
            let profile = find_profile(&core, arg(rest, 0, "profile")?)?;
            for m in core.mods(&profile.id)? {
                let icon = core.mod_icon(&profile.id, &m.id)?.map(|p| p.display().to_string()).unwrap_or_default();
                println!("{:<10} {:<40} {:<20} {:<10} {}", m.id, m.name, m.author, m.version, icon);
            }
        }
        "delete" => {
            let profile = find_profile(&core, arg(rest, 0, "profile")?)?;
            core.delete_profile(&profile.id).await?;
            println!("deleted {}", profile.name);
        }
        other => bail!("unknown command '{other}'\n\n{USAGE}"),
    }

    // Dropping the core closes the event stream once the printer has drained it.
    drop(core);
    let _ = tokio::time::timeout(Duration::from_secs(2), printer).await;
    Ok(())
}
