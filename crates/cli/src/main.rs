//! Command-line client for ThrowPro.

mod api_client;

use anyhow::{Context, Result};
use api_client::ApiClient;
use clap::{Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use throwpro_core::progress::best_total;
use throwpro_core::{
    AbortHandle, ClientConfig, ComparisonView, CurveKind, FeatureCurves, MergedRow, Profile,
    ProgressItem, ProgressQuery, merge_curves,
};
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "throwproctl")]
#[command(about = "Command-line client for ThrowPro")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ConfigArgs {
    /// Client config file path
    #[arg(long, env = "THROWPRO_CONFIG")]
    config: Option<String>,
}

#[derive(Args, Clone)]
struct ApiArgs {
    /// Server API URL (overrides client config)
    #[arg(long)]
    server: Option<String>,

    /// Bearer token (overrides client config)
    #[arg(long)]
    token: Option<String>,

    /// Profile to use from client config (default: default_profile)
    #[arg(long)]
    profile: Option<String>,

    #[command(flatten)]
    client: ConfigArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Save an API URL and token under a local alias
    Login {
        /// Local alias for the profile
        alias: String,
        /// API base URL (e.g., https://api.throwpro.example)
        url: String,
        /// Token value (avoid if possible; prefer --token-stdin)
        #[arg(long)]
        token: Option<String>,
        /// Read token from stdin
        #[arg(long, default_value_t = false)]
        token_stdin: bool,
        /// Athlete shown by `progress` when none is given
        #[arg(long)]
        athlete: Option<String>,
        /// Make this the default profile
        #[arg(long, default_value_t = false)]
        set_default: bool,
        #[command(flatten)]
        client: ConfigArgs,
    },
    /// Upload a throw video
    Upload {
        /// Video file to upload
        file: PathBuf,
        /// Bytes per chunk request (overrides client config)
        #[arg(long)]
        chunk_size: Option<u64>,
        /// MIME type (default: guessed from the extension)
        #[arg(long)]
        content_type: Option<String>,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Show feature curves and annotations for a session
    Features {
        /// Session ID
        session: String,
        /// Curves to request (comma-separated)
        #[arg(long, default_value = "separation,ω_pelvis,ω_thorax,v_hand")]
        curves: String,
        /// Print JSON instead of tables
        #[arg(long, default_value_t = false)]
        json: bool,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Compare separation between two sessions
    Compare {
        /// Session A (annotations come from this one)
        a: String,
        /// Session B
        b: Option<String>,
        /// Curves to request (comma-separated)
        #[arg(long, default_value = "separation,ω_pelvis,ω_thorax,v_hand")]
        curves: String,
        /// Print JSON instead of tables
        #[arg(long, default_value_t = false)]
        json: bool,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Show an athlete's session history
    Progress {
        /// Athlete ID (default: the profile's athlete_id)
        athlete: Option<String>,
        /// Metrics to include (comma-separated)
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<String>,
        /// Page size
        #[arg(long)]
        limit: Option<u32>,
        /// Follow cursors until the history is exhausted
        #[arg(long, default_value_t = false)]
        all: bool,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Re-queue processing of a session
    Retry {
        /// Session ID
        session: String,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Show the current profile and token role
    Whoami {
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Check server health
    Health {
        #[command(flatten)]
        api: ApiArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli { command } = Cli::parse();

    match command {
        Commands::Login {
            alias,
            url,
            token,
            token_stdin,
            athlete,
            set_default,
            client,
        } => {
            handle_login_command(&alias, &url, token, token_stdin, athlete, set_default, &client)
                .await
        }
        Commands::Upload {
            file,
            chunk_size,
            content_type,
            api,
        } => handle_upload_command(&file, chunk_size, content_type.as_deref(), &api).await,
        Commands::Features {
            session,
            curves,
            json,
            api,
        } => handle_features_command(&session, &curves, json, &api).await,
        Commands::Compare {
            a,
            b,
            curves,
            json,
            api,
        } => handle_compare_command(&a, b.as_deref(), &curves, json, &api).await,
        Commands::Progress {
            athlete,
            metrics,
            limit,
            all,
            api,
        } => handle_progress_command(athlete, metrics, limit, all, &api).await,
        Commands::Retry { session, api } => handle_retry_command(&session, &api).await,
        Commands::Whoami { api } => handle_whoami_command(&api).await,
        Commands::Health { api } => handle_health_command(&api).await,
    }
}

/// Resolved connection settings for one invocation.
struct ApiContext {
    client: ApiClient,
    config: ClientConfig,
    base_url: String,
    profile: Option<String>,
    athlete_id: Option<String>,
}

async fn resolve_api(api: &ApiArgs) -> Result<ApiContext> {
    let config_path = client_config_path(api.client.config.as_deref())?;
    let config = load_client_config(&config_path).await?;
    config.validate().context("invalid client configuration")?;

    let (server, token, profile, athlete_id) = match resolve_override(api)? {
        Some((server, token)) => (server, token, None, None),
        None => {
            let (name, profile) = config.profile(api.profile.as_deref())?;
            (
                profile.api_url.clone(),
                profile.token.clone(),
                Some(name.to_string()),
                profile.athlete_id.clone(),
            )
        }
    };

    let base_url = normalize_base_url(&server)?;
    let client = ApiClient::new(&base_url, &token)?
        .with_max_retries(config.max_retries)
        .with_retry_base_delay(Duration::from_millis(config.retry_base_delay_ms));
    Ok(ApiContext {
        client,
        config,
        base_url,
        profile,
        athlete_id,
    })
}

/// `--server/--token`, then `THROWPRO_SERVER/THROWPRO_TOKEN`. Both halves are required.
fn resolve_override(api: &ApiArgs) -> Result<Option<(String, String)>> {
    match (&api.server, &api.token) {
        (Some(server), Some(token)) => return Ok(Some((server.clone(), token.clone()))),
        (Some(_), None) | (None, Some(_)) => {
            anyhow::bail!("missing paired flag: use both --server and --token");
        }
        (None, None) => {}
    }

    let server_env = std::env::var("THROWPRO_SERVER").ok();
    let token_env = std::env::var("THROWPRO_TOKEN").ok();

    match (server_env, token_env) {
        (Some(server), Some(token)) => Ok(Some((server, token))),
        (Some(_), None) | (None, Some(_)) => {
            anyhow::bail!("missing paired env var: set both THROWPRO_SERVER and THROWPRO_TOKEN");
        }
        (None, None) => Ok(None),
    }
}

async fn handle_login_command(
    alias: &str,
    url: &str,
    token: Option<String>,
    token_stdin: bool,
    athlete: Option<String>,
    set_default: bool,
    client: &ConfigArgs,
) -> Result<()> {
    let token = read_token(token, token_stdin)?;
    let base_url = normalize_base_url(url)?;
    let config_path = client_config_path(client.config.as_deref())?;

    let api = ApiClient::new(&base_url, &token)?;
    let me = api.admin_me().await?;

    let mut config = load_client_config(&config_path).await?;
    config.profiles.insert(
        alias.to_string(),
        Profile {
            api_url: base_url.clone(),
            token,
            athlete_id: athlete,
        },
    );
    if set_default || config.default_profile.is_none() {
        config.default_profile = Some(alias.to_string());
    }

    save_client_config(&config_path, &config).await?;

    println!("Logged in as '{alias}'");
    println!("  URL: {base_url}");
    if me.is_admin {
        println!("  Role: admin");
    }
    println!("Client config: {}", config_path.display());
    Ok(())
}

async fn handle_upload_command(
    file: &Path,
    chunk_size: Option<u64>,
    content_type: Option<&str>,
    api: &ApiArgs,
) -> Result<()> {
    let ctx = resolve_api(api).await?;
    let mut policy = ctx.config.upload.clone();
    if let Some(chunk_size) = chunk_size {
        policy.chunk_size = chunk_size;
    }

    let (handle, signal) = AbortHandle::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.abort();
        }
    });

    let uploaded = ctx
        .client
        .upload_file(file, content_type, &policy, &signal, render_progress)
        .await;
    eprintln!();
    let uploaded = uploaded.with_context(|| format!("failed to upload {}", file.display()))?;

    println!("Session: {}", uploaded.session_id);
    println!(
        "Uploaded {} in {} request(s)",
        format_bytes(uploaded.report.bytes_sent),
        uploaded.report.requests
    );
    if let Some(gs_uri) = &uploaded.gs_uri {
        println!("Object: {gs_uri}");
    }
    Ok(())
}

fn render_progress(done: u64, total: u64) {
    let pct = (done * 100).checked_div(total).unwrap_or(100);
    eprint!(
        "\rUploading: {pct:>3}% ({} / {})",
        format_bytes(done),
        format_bytes(total)
    );
    let _ = std::io::stderr().flush();
}

async fn handle_features_command(
    session: &str,
    curves: &str,
    json: bool,
    api: &ApiArgs,
) -> Result<()> {
    let ctx = resolve_api(api).await?;
    let kinds = parse_curves(curves)?;
    let features = ctx.client.fetch_features(session, &kinds).await?;
    let view = ComparisonView::build(&features, None);

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("Session: {session}");
    print_rows(&requested_rows(&features, &kinds));
    print_annotations(&view);
    Ok(())
}

async fn handle_compare_command(
    a: &str,
    b: Option<&str>,
    curves: &str,
    json: bool,
    api: &ApiArgs,
) -> Result<()> {
    let ctx = resolve_api(api).await?;
    let kinds = parse_curves(curves)?;
    let (fa, fb) = ctx.client.compare(a, b, &kinds).await?;
    let view = ComparisonView::build(&fa, fb.as_deref());

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    match b {
        Some(b) => println!("Separation: A = {a}, B = {b}"),
        None => println!("Separation: A = {a}"),
    }
    print_rows(&view.separation);
    if !view.kinematics.is_empty() {
        println!();
        println!("Kinematics (A):");
        print_rows(&view.kinematics);
    }
    print_annotations(&view);
    Ok(())
}

async fn handle_progress_command(
    athlete: Option<String>,
    metrics: Vec<String>,
    limit: Option<u32>,
    all: bool,
    api: &ApiArgs,
) -> Result<()> {
    let ctx = resolve_api(api).await?;
    let athlete = athlete
        .or(ctx.athlete_id)
        .ok_or_else(|| anyhow::anyhow!("athlete required: pass it or set athlete_id in the profile"))?;

    let query = ProgressQuery {
        metrics,
        limit,
        cursor: None,
    };
    let page = if all {
        ctx.client.fetch_all_progress(&athlete, &query).await?
    } else {
        ctx.client.fetch_progress(&athlete, &query).await?
    };

    if page.items.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    print_progress(&page.items);
    if let Some((id, total)) = best_total(&page.items) {
        println!();
        println!("Best total: {total:.1} ({id})");
    }
    if !all && let Some(cursor) = &page.next_cursor {
        println!("More sessions available (cursor: {cursor}); use --all to fetch them.");
    }
    Ok(())
}

async fn handle_retry_command(session: &str, api: &ApiArgs) -> Result<()> {
    let ctx = resolve_api(api).await?;
    let response = ctx.client.retry_session(session).await?;
    if !response.ok {
        anyhow::bail!("server did not accept the retry for session {session}");
    }
    println!("Processing re-queued for session {session}");
    Ok(())
}

async fn handle_whoami_command(api: &ApiArgs) -> Result<()> {
    let ctx = resolve_api(api).await?;
    let me = ctx.client.admin_me().await?;

    println!("Server: {}", ctx.base_url);
    if let Some(profile) = &ctx.profile {
        println!("Profile: {profile}");
    }
    if let Some(athlete) = &ctx.athlete_id {
        println!("Athlete: {athlete}");
    }
    println!("Admin: {}", if me.is_admin { "yes" } else { "no" });
    Ok(())
}

async fn handle_health_command(api: &ApiArgs) -> Result<()> {
    let ctx = resolve_api(api).await?;
    let health = ctx.client.health().await?;

    println!("Status: {}", if health.ok { "ok" } else { "degraded" });
    println!("Client version: {}", env!("CARGO_PKG_VERSION"));
    if !health.ok {
        anyhow::bail!("server reported unhealthy status");
    }
    Ok(())
}

fn parse_curves(list: &str) -> Result<Vec<CurveKind>> {
    let kinds = CurveKind::parse_list(list)?;
    if kinds.is_empty() {
        anyhow::bail!("at least one curve is required");
    }
    Ok(kinds)
}

fn requested_rows(features: &FeatureCurves, kinds: &[CurveKind]) -> Vec<MergedRow> {
    let curves: Vec<_> = kinds.iter().filter_map(|kind| features.curve(kind)).collect();
    merge_curves(&curves)
}

fn print_rows(rows: &[MergedRow]) {
    if rows.is_empty() {
        println!("  (no samples)");
        return;
    }

    let fields: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.fields().map(|(name, _)| name))
        .collect();

    let mut header = format!("{:>8}", "t_ms");
    for field in &fields {
        header.push_str(&format!(" {field:>12}"));
    }
    println!("{header}");

    for row in rows {
        let mut line = format!("{:>8}", row.timestamp);
        for field in &fields {
            line.push_str(&format!(" {:>12}", format_value(row.get(field))));
        }
        println!("{line}");
    }
}

fn print_annotations(view: &ComparisonView) {
    println!();
    match &view.band {
        Some(band) => println!("Separation band: {:.1} to {:.1} deg", band.low, band.high),
        None => println!("Separation band: none"),
    }

    if view.phases.is_empty() {
        println!("Phases: none");
    } else {
        println!("Phases:");
        for phase in &view.phases {
            println!(
                "  {}: {} -> {} ms",
                phase.name, phase.start_ms, phase.end_ms
            );
        }
    }

    if view.peaks.is_empty() {
        println!("Peaks: none");
    } else {
        let peaks: Vec<String> = view.peaks.iter().map(|t| format!("{t} ms")).collect();
        println!("Peaks: {}", peaks.join(", "));
    }

    println!("Metrics:");
    for badge in &view.badges {
        println!(
            "  {}: {} ({})",
            badge.label,
            format_value(badge.value),
            badge.fit
        );
    }
}

fn print_progress(items: &[ProgressItem]) {
    println!(
        "{:<24} {:<12} {:>8} {:>10} {:>8} {:>8}",
        "SESSION", "DATE", "TOTAL", "RELEASE", "CHAIN", "V_HAND"
    );
    for item in items {
        let date = item
            .created_at()
            .map(format_date)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:<12} {:>8} {:>10} {:>8} {:>8}",
            item.id,
            date,
            format_value(item.total),
            format_value(item.release_angle_deg),
            format_value(item.chain_order_score),
            format_value(item.v_hand_peak_norm),
        );
    }
}

fn format_date(at: OffsetDateTime) -> String {
    at.date().to_string()
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}"),
        None => "-".to_string(),
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

fn client_config_path(explicit: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(PathBuf::from(path));
    }

    if let Some(path) = std::env::var_os("THROWPRO_CONFIG") {
        return Ok(PathBuf::from(path));
    }

    let base = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(path) => PathBuf::from(path),
        None => {
            let home = std::env::var_os("HOME")
                .ok_or_else(|| anyhow::anyhow!("HOME not set; set THROWPRO_CONFIG"))?;
            PathBuf::from(home).join(".config")
        }
    };

    Ok(base.join("throwpro").join("config.toml"))
}

async fn load_client_config(path: &Path) -> Result<ClientConfig> {
    let mut figment = Figment::new();

    if path.exists() {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("THROWPRO_").split("__"));

    match figment.extract() {
        Ok(config) => Ok(config),
        Err(_) if !path.exists() => Ok(ClientConfig::default()),
        Err(err) => Err(anyhow::anyhow!(err).context("failed to load client configuration")),
    }
}

async fn save_client_config(path: &Path, config: &ClientConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let contents = toml::to_string_pretty(config)?;

    tokio::fs::write(path, contents).await?;

    // 0600: the file holds bearer tokens
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(path, perms).await?;
    }

    Ok(())
}

fn read_token(token: Option<String>, token_stdin: bool) -> Result<String> {
    if let Some(token) = token {
        return Ok(token);
    }
    if token_stdin {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        let token = buf.trim().to_string();
        if token.is_empty() {
            anyhow::bail!("token read from stdin is empty");
        }
        return Ok(token);
    }
    anyhow::bail!("token required: use --token or --token-stdin");
}

fn normalize_base_url(url: &str) -> Result<String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("API URL must start with http:// or https://");
    }
    Ok(url.trim_end_matches('/').to_string())
}
