//! arc: boot resource manifests and dispatch pipes from the command line.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::{json, Map, Value};

use arc_core::bundle::{parse_bundle, select};
use arc_core::{parse_frame, FileStore, FormData, Manifest, Parsed, PipeTemplate, Token};
use arc_runtime::config::{resolve_base, resolve_store_path, timeout_from_millis};
use arc_runtime::types::{exit_codes, RuntimeError};
use arc_runtime::{
    transport, Booter, Context, Dispatch, Document, FailurePolicy, HttpTransport, LoadPolicy,
    Machine, MachineConfig, Model,
};

#[derive(Parser)]
#[command(
    name = "arc",
    about = "Ordered, versioned resource booting and pipe dispatch",
    version
)]
struct Cli {
    /// Path to the .arcs cache store.
    #[arg(short, long, global = true)]
    store: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a manifest into a page and print the boot report.
    Boot {
        /// Manifest JSON file.
        manifest: PathBuf,

        /// Base URL or directory resource paths resolve against.
        #[arg(long)]
        base: Option<String>,

        /// Boot even when the capability check fails.
        #[arg(long)]
        force: bool,

        /// User agent for the capability check.
        #[arg(long)]
        user_agent: Option<String>,

        /// Per-fetch timeout in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// What to do with a failed fetch.
        #[arg(long, value_enum, default_value_t = FailurePolicy::Stall)]
        on_failure: FailurePolicy,

        /// Do not append the cache-busting query to fetches.
        #[arg(long)]
        no_cache_bust: bool,

        /// Write the rendered page here.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Send one pipe to an endpoint and print the returned pipe.
    Dispatch {
        /// Dispatch URL.
        #[arg(long)]
        endpoint: String,

        /// Pipe fields as a JSON object; must name a model.
        #[arg(long)]
        pipe: String,

        /// Pipe template JSON the fields are merged onto.
        #[arg(long)]
        template: Option<String>,

        /// Upload a file as NAME=PATH (switches to multipart).
        #[arg(long = "file", value_name = "NAME=PATH")]
        files: Vec<String>,

        /// Request timeout in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Parse resource paths into tokens.
    Token {
        paths: Vec<String>,
    },

    /// Demultiplex a response frame read from a file or stdin.
    Frame {
        /// Input file; stdin when omitted.
        input: Option<PathBuf>,
    },

    /// List the entries of a text bundle.
    Bundle {
        input: PathBuf,

        /// Runtime variant tag (ie, ch, sa, ff).
        #[arg(long)]
        variant: Option<String>,
    },

    /// Show the cache store.
    Cache,

    /// Drop every entry of the cache store.
    Clear,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   arc completions bash > ~/.local/share/bash-completion/completions/arc
    ///   arc completions zsh > ~/.zfunc/_arc
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },

    /// Launch interactive REPL mode.
    Repl,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let store_path = resolve_store_path(cli.store.as_deref());

    match cli.command.unwrap_or(Commands::Repl) {
        Commands::Boot {
            manifest,
            base,
            force,
            user_agent,
            timeout_ms,
            on_failure,
            no_cache_bust,
            out,
        } => {
            let manifest = Manifest::from_path(&manifest)?;
            let base = resolve_base(base.as_deref())?;
            let timeout = timeout_from_millis(timeout_ms);
            let policy = LoadPolicy {
                timeout,
                on_failure,
                cache_bust: !no_cache_bust,
            };

            let context = Arc::new(Context::new(FileStore::open(&store_path)?));
            let transport = transport::for_base(&base, timeout)?;
            let mut booter = Booter::new(context, transport, base).with_policy(policy);
            booter.set_resources(manifest);

            if let Some(ua) = user_agent {
                booter.validate(&ua);
            }

            let mut page = Document::new();
            let report = booter.boot(&mut page, force).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            if let Some(out) = out {
                std::fs::write(&out, page.render_html())
                    .with_context(|| format!("writing {}", out.display()))?;
            }
            if report.gated {
                std::process::exit(exit_codes::USAGE);
            }
            if report.stalled > 0 {
                std::process::exit(exit_codes::STALLED);
            }
        }

        Commands::Dispatch {
            endpoint,
            pipe,
            template,
            files,
            timeout_ms,
        } => {
            let fields = json_object(&pipe).context("--pipe")?;
            let model = fields
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            let timeout = timeout_from_millis(timeout_ms);
            let context = Arc::new(Context::in_memory());
            let machine = Machine::new(
                context,
                Arc::new(HttpTransport::new(timeout)?),
                MachineConfig {
                    endpoint: Some(endpoint),
                    timeout,
                },
            );
            if let Some(template) = template {
                machine.define_pipe(PipeTemplate::new(
                    json_object(&template).context("--template")?,
                ));
            }
            machine.register(Model::passthrough(&model));

            let dispatch = if files.is_empty() {
                machine.invoke(fields).await
            } else {
                machine.invoke_with_form(fields, read_form(&files)?).await
            };

            match dispatch {
                Ok(Dispatch::Completed { pipe, debug, .. })
                | Ok(Dispatch::NoPostHook { pipe, debug, .. }) => {
                    if let Some(debug) = debug {
                        eprintln!("|D| {debug}");
                    }
                    println!("{}", serde_json::to_string_pretty(&pipe)?);
                }
                Ok(Dispatch::Dropped { reason, .. }) => {
                    eprintln!("Dropped: {reason}");
                    std::process::exit(exit_codes::TRANSPORT);
                }
                Ok(other) => {
                    eprintln!("Not sent: {other:?}");
                    std::process::exit(exit_codes::FAILURE);
                }
                Err(e) => exit_with(e),
            }
        }

        Commands::Token { paths } => {
            let mut rows = Vec::new();
            for path in &paths {
                rows.push(match Token::parse(path) {
                    Ok(Parsed::Local(token)) => json!({
                        "path": path,
                        "cache_key": token.cache_key,
                        "content_type": token.content_type,
                    }),
                    Ok(Parsed::NotImplemented { .. }) => {
                        json!({"path": path, "not_implemented": true})
                    }
                    Err(e) => json!({"path": path, "error": e.to_string()}),
                });
            }
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }

        Commands::Frame { input } => {
            let body = read_input(input.as_deref())?;
            match parse_frame(&body) {
                Ok(frame) => {
                    let data = serde_json::from_str::<Value>(frame.data)
                        .unwrap_or_else(|_| Value::String(frame.data.to_string()));
                    let out = json!({"debug": frame.debug, "data": data});
                    println!("{}", serde_json::to_string_pretty(&out)?);
                }
                Err(e) => exit_with(e.into()),
            }
        }

        Commands::Bundle { input, variant } => {
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let entries = parse_bundle(&text);
            let selected: Vec<_> = select(&entries, variant.as_deref())
                .map(|e| {
                    json!({
                        "cache_key": e.cache_key(),
                        "variant": e.variant,
                        "bytes": e.body.len(),
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "entries": entries.len(),
                    "selected": selected,
                }))?
            );
        }

        Commands::Cache => {
            let context = Context::new(FileStore::open(&store_path)?);
            let cache = context.cache();
            let info = json!({
                "store": store_path,
                "version": cache.persisted_version().map(|v| v.0),
                "entries": cache.entry_count(),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Clear => {
            let context = Context::new(FileStore::open(&store_path)?);
            context.cache().clear()?;
            eprintln!("Cleared {store_path}");
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "arc", &mut std::io::stdout());
        }

        Commands::Repl => {
            arc_runtime::repl::run(&store_path).await?;
        }
    }

    Ok(())
}

fn exit_with(error: RuntimeError) -> ! {
    eprintln!("Error: {error}");
    std::process::exit(error.exit_code());
}

fn json_object(raw: &str) -> anyhow::Result<Map<String, Value>> {
    match serde_json::from_str(raw)? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("expected a JSON object, got {other}"),
    }
}

fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut body = String::new();
            std::io::stdin().read_to_string(&mut body)?;
            Ok(body)
        }
    }
}

fn read_form(files: &[String]) -> anyhow::Result<FormData> {
    let mut form = FormData::new();
    for spec in files {
        let (name, path) = spec
            .split_once('=')
            .with_context(|| format!("--file expects NAME=PATH, got {spec}"))?;
        let path = Path::new(path);
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(name)
            .to_string();
        form = form.file(name, &file_name, None, bytes);
    }
    Ok(form)
}
