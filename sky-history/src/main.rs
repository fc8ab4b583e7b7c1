use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use libskycast::config::Config;
use libskycast::logging::LoggingConfig;
use libskycast::records::{collect_records, delete_post, MAX_PAGE_SIZE};
use libskycast::types::{AtUri, FetchedRecord, POST_COLLECTION, REPOST_COLLECTION};
use libskycast::{SkycastError, XrpcClient};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "sky-history")]
#[command(version, about = "List and delete your Bluesky posts")]
#[command(long_about = r#"List and delete posts and reposts in a Bluesky repository.

EXAMPLES:
    # Show your last 20 posts (default)
    sky-history list

    # Someone else's reposts, as JSON
    sky-history list --actor alice.bsky.social --reposts --format json

    # JSONL output for scripting
    sky-history list --limit 200 --format jsonl | jq -r .uri

    # Delete a post
    sky-history delete at://did:plc:abc/app.bsky.feed.post/3k --force

OUTPUT FORMATS:
    text  - One line per record with timestamp, URI and text preview (default)
    json  - JSON array
    jsonl - JSON lines, one object per line

EXIT CODES:
    0 - Success (including empty results)
    1 - Error (network, configuration, etc.)
    2 - Authentication error
    3 - Invalid input
"#)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List posts (or reposts), newest first
    List {
        /// Handle or DID whose records to list (defaults to the configured handle)
        #[arg(short, long, value_name = "ACTOR")]
        actor: Option<String>,

        /// List reposts instead of posts
        #[arg(long)]
        reposts: bool,

        /// Maximum number of records to return
        #[arg(short, long, default_value = "20", value_name = "N")]
        limit: usize,

        /// Output format
        #[arg(short, long, default_value = "text", value_name = "FORMAT")]
        #[arg(value_parser = ["text", "json", "jsonl"])]
        format: String,
    },

    /// Delete a post or repost
    Delete {
        /// at:// URI of the record to delete
        uri: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

/// A listed record, flattened for output
#[derive(Debug, Serialize, Deserialize)]
struct HistoryEntry {
    uri: String,
    cid: String,
    created_at: Option<String>,
    /// Post text, or the reposted URI for reposts
    text: String,
}

impl From<FetchedRecord> for HistoryEntry {
    fn from(record: FetchedRecord) -> Self {
        let created_at = record.value["createdAt"].as_str().map(str::to_string);
        let text = record.value["text"]
            .as_str()
            .or_else(|| record.value["subject"]["uri"].as_str())
            .unwrap_or_default()
            .to_string();
        Self {
            uri: record.uri,
            cid: record.cid,
            created_at,
            text,
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    LoggingConfig::from_env(args.verbose).init();

    if let Err(e) = run(args).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<SkycastError>()
            .map(SkycastError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let token = CancellationToken::new();

    match args.command {
        Command::List {
            actor,
            reposts,
            limit,
            format,
        } => {
            let actor = actor
                .or_else(|| config.handle())
                .context("No actor given and no handle configured; use --actor or set SKYCAST_HANDLE")?;
            let collection = if reposts {
                REPOST_COLLECTION
            } else {
                POST_COLLECTION
            };

            tracing::debug!("Listing {} for {} (limit {})", collection, actor, limit);
            let client = XrpcClient::new(&config.service(), &config.http)?;
            let records = collect_records(
                &client,
                &actor,
                collection,
                limit.min(MAX_PAGE_SIZE),
                Some(limit),
                &token,
            )
            .await
            .with_context(|| format!("Failed to list {} for {}", collection, actor))?;

            tracing::info!("Found {} records for {}", records.len(), actor);
            let entries: Vec<HistoryEntry> = records.into_iter().map(HistoryEntry::from).collect();
            print_entries(&entries, &format)?;
        }
        Command::Delete { uri, force } => {
            let _: AtUri = uri.parse()?;
            if !force && !confirm(&uri)? {
                tracing::debug!("Deletion of {} declined", uri);
                eprintln!("Cancelled");
                return Ok(());
            }

            let credentials = config.credentials_or_prompt()?;
            let client = XrpcClient::login(&credentials, &config.http).await?;
            tracing::info!(
                "Signed in as {}",
                client.handle().unwrap_or(credentials.handle.as_str())
            );
            delete_post(&client, &uri, &token).await?;
            println!("Deleted {}", uri);
        }
    }

    Ok(())
}

/// Ask before deleting when attached to a terminal. Non-interactive callers
/// must pass --force.
fn confirm(uri: &str) -> Result<bool> {
    use std::io::{self, Write};

    if !atty::is(atty::Stream::Stdin) {
        anyhow::bail!("Refusing to delete without confirmation in non-interactive mode. Use --force.");
    }
    print!("Delete {}? [y/N]: ", uri);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn print_entries(entries: &[HistoryEntry], format: &str) -> Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(entries)?),
        "jsonl" => {
            for entry in entries {
                println!("{}", serde_json::to_string(entry)?);
            }
        }
        _ => {
            for entry in entries {
                let timestamp = entry
                    .created_at
                    .as_deref()
                    .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
                    .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{} | {} | {}", timestamp, entry.uri, preview(&entry.text, 60));
            }
        }
    }
    Ok(())
}

/// First `max` characters of `text` on one line.
fn preview(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() > max {
        let cut: String = flat.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_preview_is_char_safe() {
        assert_eq!(preview("short", 60), "short");
        assert_eq!(preview("line one\nline two", 60), "line one line two");
        assert_eq!(preview("ééééé", 3), "ééé...");
    }

    #[test]
    fn test_entry_from_post_and_repost() {
        let post = HistoryEntry::from(FetchedRecord {
            uri: "at://did:plc:a/app.bsky.feed.post/1".into(),
            cid: "bafy1".into(),
            value: json!({ "text": "hello", "createdAt": "2024-05-01T12:00:00.000Z" }),
        });
        assert_eq!(post.text, "hello");
        assert_eq!(post.created_at.as_deref(), Some("2024-05-01T12:00:00.000Z"));

        let repost = HistoryEntry::from(FetchedRecord {
            uri: "at://did:plc:a/app.bsky.feed.repost/2".into(),
            cid: "bafy2".into(),
            value: json!({ "subject": { "uri": "at://did:plc:b/app.bsky.feed.post/9", "cid": "x" } }),
        });
        assert_eq!(repost.text, "at://did:plc:b/app.bsky.feed.post/9");
        assert!(repost.created_at.is_none());
    }
}
