use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "blobsync",
    about = "blobsync: versioned blobs, served and replicated over HTTP",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve a blob store over HTTP
    Serve(ServeArgs),
    /// Keep two endpoints in sync until interrupted
    Sync(SyncArgs),
    /// Follow a remote URL and print every new version
    Watch(WatchArgs),
    /// Print the current value of a key or URL
    Get(GetArgs),
    /// Write a new value to a key or URL
    Put(PutArgs),
    /// Delete a key or URL
    Delete(DeleteArgs),
}

/// Where the local store lives and how to reach remotes.
#[derive(Args, Clone, Debug)]
pub struct StoreArgs {
    /// Store root; data goes to `<root>/db` and `<root>/meta`
    #[arg(long, default_value = ".blobsync")]
    pub root: PathBuf,
    /// Fixed peer id instead of the one persisted in the store
    #[arg(long)]
    pub peer: Option<String>,
    /// Bearer token sent to remote endpoints
    #[arg(long)]
    pub token: Option<String>,
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub bind: Option<String>,
    #[arg(long)]
    pub root: Option<PathBuf>,
    #[arg(long)]
    pub peer: Option<String>,
    /// Require this bearer token for writes
    #[arg(long)]
    pub token: Option<String>,
}

#[derive(Args)]
pub struct SyncArgs {
    /// A local key (e.g. `/notes`) or an http(s) URL
    pub a: String,
    pub b: String,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args)]
pub struct WatchArgs {
    pub url: String,
    #[arg(long)]
    pub token: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    pub target: String,
    /// Only print version and content type
    #[arg(long)]
    pub head: bool,
    #[arg(long)]
    pub version: Option<String>,
    #[arg(long)]
    pub parents: Option<String>,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args)]
pub struct PutArgs {
    pub target: String,
    /// Read the body from this file (stdin when neither --file nor --data)
    #[arg(short, long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    #[arg(short, long)]
    pub data: Option<String>,
    #[arg(long)]
    pub content_type: Option<String>,
    #[arg(long)]
    pub version: Option<String>,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args)]
pub struct DeleteArgs {
    pub target: String,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serve() {
        let cli = Cli::try_parse_from(["blobsync", "serve", "--bind", "0.0.0.0:8080"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.bind.as_deref(), Some("0.0.0.0:8080"));
            assert!(args.config.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_serve_with_config() {
        let cli = Cli::try_parse_from(["blobsync", "serve", "-c", "server.toml"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.config, Some(PathBuf::from("server.toml")));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_sync() {
        let cli = Cli::try_parse_from(["blobsync", "sync", "/notes", "http://host/notes", "--root", "/tmp/s"]).unwrap();
        if let Command::Sync(args) = cli.command {
            assert_eq!(args.a, "/notes");
            assert_eq!(args.b, "http://host/notes");
            assert_eq!(args.store.root, PathBuf::from("/tmp/s"));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_get_defaults() {
        let cli = Cli::try_parse_from(["blobsync", "get", "/k"]).unwrap();
        if let Command::Get(args) = cli.command {
            assert!(!args.head);
            assert_eq!(args.store.root, PathBuf::from(".blobsync"));
            assert!(args.store.peer.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_put() {
        let cli = Cli::try_parse_from([
            "blobsync", "put", "/k", "-d", "hello", "--content-type", "text/plain", "--version", "7",
        ])
        .unwrap();
        if let Command::Put(args) = cli.command {
            assert_eq!(args.data.as_deref(), Some("hello"));
            assert_eq!(args.content_type.as_deref(), Some("text/plain"));
            assert_eq!(args.version.as_deref(), Some("7"));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn put_file_and_data_conflict() {
        assert!(Cli::try_parse_from(["blobsync", "put", "/k", "-d", "x", "-f", "y"]).is_err());
    }

    #[test]
    fn parse_delete() {
        let cli = Cli::try_parse_from(["blobsync", "delete", "http://host/k"]).unwrap();
        assert!(matches!(cli.command, Command::Delete(_)));
    }

    #[test]
    fn parse_watch() {
        let cli = Cli::try_parse_from(["blobsync", "watch", "http://host/k"]).unwrap();
        if let Command::Watch(args) = cli.command {
            assert_eq!(args.url, "http://host/k");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["blobsync", "--verbose", "get", "/k"]).unwrap();
        assert!(cli.verbose);
    }
}
