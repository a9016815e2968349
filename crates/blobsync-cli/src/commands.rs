use std::io::Write;
use std::net::SocketAddr;

use anyhow::Context;
use blobsync_sdk::{
    BlobStore, DeleteOptions, Endpoint, GetOptions, Outcome, PutOptions, PutResult, RemoteClient,
};
use blobsync_server::{BlobServer, ServerConfig};
use blobsync_store::StoreConfig;
use blobsync_sync::{sync, watch, ReconnectPolicy, SyncOptions, SyncState};
use bytes::Bytes;
use colored::Colorize;
use hyper::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tokio::io::AsyncReadExt;
use url::Url;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args).await,
        Command::Sync(args) => cmd_sync(args).await,
        Command::Watch(args) => cmd_watch(args).await,
        Command::Get(args) => cmd_get(args).await,
        Command::Put(args) => cmd_put(args).await,
        Command::Delete(args) => cmd_delete(args).await,
    }
}

fn remote_client(token: Option<&str>) -> anyhow::Result<RemoteClient> {
    let mut headers = HeaderMap::new();
    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {token}")).context("invalid token")?;
        headers.insert(AUTHORIZATION, value);
    }
    Ok(RemoteClient::with_headers(headers))
}

fn local_store(args: &StoreArgs) -> BlobStore {
    let mut config = StoreConfig::under(&args.root);
    config.peer = args.peer.clone();
    BlobStore::new(config)
}

fn endpoint(target: &str, args: &StoreArgs) -> anyhow::Result<Endpoint> {
    let client = remote_client(args.token.as_deref())?;
    Ok(Endpoint::resolve(target, &local_store(args), &client)?)
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = &args.bind {
        config.bind_addr = bind
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid bind address {bind}"))?;
    }
    if let Some(root) = &args.root {
        config.store = StoreConfig {
            peer: config.store.peer.take(),
            ..StoreConfig::under(root)
        };
    }
    if args.peer.is_some() {
        config.store.peer = args.peer.clone();
    }
    if args.token.is_some() {
        config.auth_token = args.token.clone();
    }

    println!(
        "{} blobsync server on {} (db: {})",
        "▶".green().bold(),
        config.bind_addr.to_string().bold(),
        config.store.db_dir.display()
    );
    BlobServer::new(config).serve().await?;
    Ok(())
}

async fn cmd_sync(args: SyncArgs) -> anyhow::Result<()> {
    let client = remote_client(args.store.token.as_deref())?;
    let store = local_store(&args.store);
    let a = Endpoint::resolve(&args.a, &store, &client)?;
    let b = Endpoint::resolve(&args.b, &store, &client)?;
    println!("Syncing {} with {}", a.to_string().bold(), b.to_string().bold());

    let mut opts = SyncOptions::new();
    if let Some(peer) = &args.store.peer {
        opts = opts.peer(peer);
    }
    let handle = sync(a, b, opts);
    let mut states = handle.watch_state();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                match state {
                    SyncState::Connected => println!("  {} {}", "●".green(), state),
                    SyncState::Backoff { .. } => println!("  {} {}", "●".yellow(), state),
                    _ => println!("  {} {}", "●".dimmed(), state),
                }
                if state.is_closed() {
                    break;
                }
            }
        }
    }
    handle.shutdown().await;
    Ok(())
}

async fn cmd_watch(args: WatchArgs) -> anyhow::Result<()> {
    let url = Url::parse(&args.url).with_context(|| format!("invalid URL {}", args.url))?;
    let client = remote_client(args.token.as_deref())?;
    println!("Watching {}", url.as_str().bold());

    let watcher = watch(
        client,
        url,
        ReconnectPolicy::default(),
        |snapshot| {
            let size = snapshot.body.as_ref().map_or(0, Bytes::len);
            println!(
                "{} {} ({} bytes, {})",
                "↻".cyan(),
                snapshot.version.as_str().yellow(),
                size,
                snapshot.content_type.as_deref().unwrap_or("no content type")
            );
        },
        || println!("{} deleted", "✗".red()),
    );
    tokio::signal::ctrl_c().await?;
    watcher.shutdown().await;
    Ok(())
}

async fn cmd_get(args: GetArgs) -> anyhow::Result<()> {
    let ep = endpoint(&args.target, &args.store)?;
    let mut opts = GetOptions::new();
    if args.head {
        opts = opts.head();
    }
    if let Some(version) = &args.version {
        opts = opts.version(version.as_str());
    }
    if let Some(parents) = &args.parents {
        opts = opts.parents(parents.as_str());
    }

    let Outcome::Done(Some(snapshot)) = ep.get(opts).await? else {
        anyhow::bail!("{} not found", args.target);
    };
    eprintln!(
        "{} {}  {}",
        "version".dimmed(),
        snapshot.version.as_str().yellow(),
        snapshot.content_type.as_deref().unwrap_or("").cyan()
    );
    if let Some(body) = snapshot.body {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&body)?;
        stdout.flush()?;
    }
    Ok(())
}

async fn cmd_put(args: PutArgs) -> anyhow::Result<()> {
    let body = match (&args.file, &args.data) {
        (Some(path), _) => tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?,
        (None, Some(data)) => data.clone().into_bytes(),
        (None, None) => {
            let mut buf = Vec::new();
            tokio::io::stdin().read_to_end(&mut buf).await?;
            buf
        }
    };

    let ep = endpoint(&args.target, &args.store)?;
    let mut opts = PutOptions::new();
    if let Some(version) = &args.version {
        opts = opts.version(version.as_str());
    }
    if let Some(content_type) = &args.content_type {
        opts = opts.content_type(content_type);
    }

    match ep.put(Bytes::from(body), opts).await? {
        Outcome::Done(PutResult::Accepted(version)) => {
            println!("{} {} at {}", "✓".green().bold(), args.target, version.as_str().yellow());
        }
        Outcome::Done(PutResult::Stale { current }) => {
            let current = current.map(|v| v.as_str().to_string()).unwrap_or_default();
            println!("{} stale write ignored; current version is {}", "!".yellow().bold(), current.yellow());
        }
        Outcome::Aborted => println!("aborted"),
    }
    Ok(())
}

async fn cmd_delete(args: DeleteArgs) -> anyhow::Result<()> {
    let ep = endpoint(&args.target, &args.store)?;
    ep.delete(DeleteOptions::new()).await?;
    println!("{} deleted {}", "✓".green().bold(), args.target);
    Ok(())
}
