//! sky-post - Compose and publish a Bluesky post

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use libskycast::cancel::with_deadline;
use libskycast::config::{Config, Credentials};
use libskycast::fetch::HttpFetcher;
use libskycast::logging::{LogFormat, LoggingConfig};
use libskycast::records::repost;
use libskycast::types::CreatedRecord;
use libskycast::{PostComposer, PostDraft, Result, SkycastError, XrpcClient};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "sky-post")]
#[command(version, about = "Compose and publish a Bluesky post")]
#[command(long_about = r#"Compose and publish a Bluesky post.

Mentions (@handle.example.com), links (https://...) and hashtags (#tag) in the
text are detected automatically. A post carries at most one embed: a link
preview, up to four images, or a quoted post.

EXAMPLES:
    # Post text
    sky-post "Hello from the terminal #rust"

    # Read text from stdin
    echo "Release notes are out" | sky-post --embed-link https://example.com/notes

    # Images with alt text (paired in order)
    sky-post "Two cats" --image cat1.jpg --alt "tabby" --image cat2.png --alt "calico"

    # Reply, link part of the text, and print the record without posting
    sky-post "see the docs" --reply at://did:plc:abc/app.bsky.feed.post/3k \
        --link-text "docs=https://docs.bsky.app" --dry-run

    # Repost
    sky-post --repost at://did:plc:abc/app.bsky.feed.post/3k

EXIT CODES:
    0 - Success
    1 - Network or repository error
    2 - Authentication error
    3 - Invalid input
"#)]
struct Cli {
    /// Post text (reads from stdin if not provided)
    text: Option<String>,

    /// Extra tag stored on the post (repeatable)
    #[arg(short, long = "tag", value_name = "TAG")]
    tags: Vec<String>,

    /// Link the first occurrence of TEXT to URL (repeatable)
    #[arg(long = "link-text", value_name = "TEXT=URL")]
    link_texts: Vec<String>,

    /// Language code of the post (repeatable, default from config)
    #[arg(short, long = "lang", value_name = "LANG")]
    langs: Vec<String>,

    /// Reply to this post
    #[arg(long, value_name = "AT_URI")]
    reply: Option<String>,

    /// Quote this post
    #[arg(long, value_name = "AT_URI")]
    quote: Option<String>,

    /// Attach a link preview card for URL
    #[arg(long, value_name = "URL")]
    embed_link: Option<String>,

    /// Attach an image from a local path or URL (repeatable)
    #[arg(short, long = "image", value_name = "LOCATION")]
    images: Vec<String>,

    /// Alt text for the image at the same position (repeatable)
    #[arg(long = "alt", value_name = "TEXT")]
    alts: Vec<String>,

    /// Print the composed record instead of submitting it
    #[arg(long)]
    dry_run: bool,

    /// Repost an existing post instead of composing a new one
    #[arg(long, value_name = "AT_URI", conflicts_with = "text")]
    repost: Option<String>,

    /// Give up after this long, e.g. "30s" or "2m" (overrides config)
    #[arg(long, value_name = "DURATION")]
    timeout: Option<String>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Log format (text, json or pretty)
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env(cli.verbose);
    if let Some(format) = cli.log_format {
        logging.format = format;
    }
    logging.init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let token = cancellation_token(&cli, &config)?;

    if let Some(uri) = &cli.repost {
        let client = login(&config.credentials_or_prompt()?, &config).await?;
        let created = repost(&client, uri, &token).await?;
        print_created(&created, &cli.format)?;
        return Ok(());
    }

    let draft = build_draft(&cli, &config)?;
    draft.validate()?;

    let client = Arc::new(connect(&config, cli.dry_run).await?);
    let fetcher = Arc::new(HttpFetcher::new(&config.http)?);
    let composer = PostComposer::new(client.clone(), client, fetcher.clone(), fetcher);

    if cli.dry_run {
        let record = composer.compose(&draft, &token).await?;
        println!("{}", serde_json::to_string_pretty(&record.to_value()?)?);
        return Ok(());
    }

    let created = composer.submit(&draft, &token).await?;
    print_created(&created, &cli.format)
}

/// Token cancelled by Ctrl-C and, if configured, by the deadline.
fn cancellation_token(cli: &Cli, config: &Config) -> Result<CancellationToken> {
    let timeout = match &cli.timeout {
        Some(raw) => Some(parse_timeout(raw)?),
        None => config.defaults.timeout()?,
    };

    let root = CancellationToken::new();
    let on_interrupt = root.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, abandoning composition");
            on_interrupt.cancel();
        }
    });

    Ok(match timeout {
        Some(timeout) => with_deadline(&root, timeout),
        None => root,
    })
}

fn parse_timeout(raw: &str) -> Result<Duration> {
    humantime::parse_duration(raw)
        .map_err(|e| SkycastError::Validation(format!("invalid --timeout '{}': {}", raw, e)))
}

/// Log in when posting. A dry run only logs in if credentials are at hand,
/// so plain-text previews work without an account.
async fn connect(config: &Config, dry_run: bool) -> Result<XrpcClient> {
    if !dry_run {
        return login(&config.credentials_or_prompt()?, config).await;
    }
    match config.credentials() {
        Ok(credentials) => login(&credentials, config).await,
        Err(_) => {
            tracing::debug!("No credentials configured, composing anonymously");
            XrpcClient::new(&config.service(), &config.http)
        }
    }
}

async fn login(credentials: &Credentials, config: &Config) -> Result<XrpcClient> {
    let client = XrpcClient::login(credentials, &config.http).await?;
    tracing::info!(
        "Signed in as {}",
        client.handle().unwrap_or(credentials.handle.as_str())
    );
    Ok(client)
}

fn read_text(cli: &Cli) -> Result<String> {
    if let Some(text) = &cli.text {
        return Ok(text.clone());
    }
    if atty::is(atty::Stream::Stdin) {
        return Err(SkycastError::Validation(
            "no post text given; pass it as an argument or pipe it on stdin".to_string(),
        ));
    }

    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .map_err(|e| SkycastError::Validation(format!("failed to read stdin: {}", e)))?;
    Ok(buffer.trim_end_matches(['\n', '\r']).to_string())
}

fn build_draft(cli: &Cli, config: &Config) -> Result<PostDraft> {
    let text = read_text(cli)?;

    let has_embed = cli.embed_link.is_some() || !cli.images.is_empty() || cli.quote.is_some();
    if text.trim().is_empty() && !has_embed {
        return Err(SkycastError::Validation("post text is empty".to_string()));
    }
    if cli.alts.len() > cli.images.len() {
        return Err(SkycastError::Validation(format!(
            "{} --alt values given for {} images",
            cli.alts.len(),
            cli.images.len()
        )));
    }

    let langs = if cli.langs.is_empty() {
        &config.defaults.langs
    } else {
        &cli.langs
    };
    let mut builder = PostDraft::builder(text)
        .tags(cli.tags.iter().cloned())
        .langs(langs.iter().cloned());

    for raw in &cli.link_texts {
        let (display, url) = raw.split_once('=').ok_or_else(|| {
            SkycastError::Validation(format!("--link-text '{}' must look like TEXT=URL", raw))
        })?;
        builder = builder.inline_link(display, url);
    }
    for (i, location) in cli.images.iter().enumerate() {
        let alt = cli.alts.get(i).cloned().unwrap_or_default();
        builder = builder.image(alt, location.clone());
    }
    if let Some(url) = &cli.embed_link {
        builder = builder.embed_link(url.clone());
    }
    if let Some(uri) = &cli.quote {
        builder = builder.quote(uri.clone());
    }
    if let Some(uri) = &cli.reply {
        builder = builder.reply_to(uri.clone());
    }

    builder.build()
}

fn print_created(created: &CreatedRecord, format: &str) -> Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string(created)?),
        _ => println!("{}", created.uri),
    }
    Ok(())
}
