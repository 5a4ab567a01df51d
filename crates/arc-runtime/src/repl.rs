//! Interactive shell: inspect tokens, frames, bundles and the store, boot a
//! manifest into a scratch page, send a pipe.
//!
//! Started by `arc repl` (or plain `arc`). `/help` lists the commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};
use serde_json::Value;

use arc_core::bundle::{parse_bundle, select};
use arc_core::{parse_frame, FileStore, Manifest, Parsed, Token, VersionedCache};

use crate::config::{resolve_base, MachineConfig};
use crate::transport::{self, HttpTransport};
use crate::{Booter, Context, Dispatch, Document, Machine, Model};

const PROMPT: &str = " \x1b[36marc>\x1b[0m ";

struct Command {
    name: &'static str,
    usage: &'static str,
    about: &'static str,
    /// File extension offered by tab completion for the first argument.
    completes: Option<&'static str>,
}

const COMMANDS: &[Command] = &[
    Command {
        name: "/boot",
        usage: "<manifest.json>",
        about: "Boot a manifest into a scratch page",
        completes: Some("json"),
    },
    Command {
        name: "/base",
        usage: "[url|dir]",
        about: "Show or set where resource paths resolve",
        completes: None,
    },
    Command {
        name: "/dispatch",
        usage: "<endpoint> <pipe json>",
        about: "Send one pipe and print the reply",
        completes: None,
    },
    Command {
        name: "/token",
        usage: "<path>...",
        about: "Parse resource paths",
        completes: None,
    },
    Command {
        name: "/frame",
        usage: "<frame>",
        about: "Split a response frame",
        completes: None,
    },
    Command {
        name: "/bundle",
        usage: "<file.txt> [variant]",
        about: "List the entries of a text bundle",
        completes: Some("txt"),
    },
    Command {
        name: "/cache",
        usage: "",
        about: "Show the cache store",
        completes: None,
    },
    Command {
        name: "/store",
        usage: "<file.arcs>",
        about: "Switch to another store",
        completes: Some("arcs"),
    },
    Command {
        name: "/purge",
        usage: "",
        about: "Drop every entry of the store",
        completes: None,
    },
    Command {
        name: "/clear",
        usage: "",
        about: "Clear the screen",
        completes: None,
    },
    Command {
        name: "/help",
        usage: "",
        about: "Show this list",
        completes: None,
    },
    Command {
        name: "/exit",
        usage: "",
        about: "Leave",
        completes: None,
    },
];

fn lookup(name: &str) -> Option<&'static Command> {
    COMMANDS.iter().find(|c| c.name == name)
}

/// Files under the directory part of `partial` ending in `.ext`, plus
/// subdirectories to descend into.
fn files_with_extension(partial: &str, ext: &str) -> Vec<String> {
    let (dir, prefix) = match partial.rfind('/') {
        Some(i) => (&partial[..=i], &partial[i + 1..]),
        None => ("", partial),
    };
    let Ok(entries) = std::fs::read_dir(if dir.is_empty() { "." } else { dir }) else {
        return Vec::new();
    };

    let mut found: Vec<String> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            if !name.starts_with(prefix) {
                return None;
            }
            if entry.file_type().ok()?.is_dir() {
                Some(format!("{dir}{name}/"))
            } else if Path::new(&name).extension().is_some_and(|e| e == ext) {
                Some(format!("{dir}{name}"))
            } else {
                None
            }
        })
        .collect();
    found.sort();
    found
}

#[derive(Default)]
struct ShellHelper;

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];
        let Some((name, arg)) = input.split_once(' ') else {
            let commands = COMMANDS
                .iter()
                .filter(|c| c.name.starts_with(input))
                .map(|c| Pair {
                    display: format!("{:<10} {}", c.name, c.about),
                    replacement: format!("{} ", c.name),
                })
                .collect();
            return Ok((0, commands));
        };

        match lookup(name).and_then(|c| c.completes) {
            Some(ext) if !arg.contains(' ') => {
                let files = files_with_extension(arg, ext)
                    .into_iter()
                    .map(|f| Pair {
                        display: f.clone(),
                        replacement: f,
                    })
                    .collect();
                Ok((name.len() + 1, files))
            }
            _ => Ok((pos, Vec::new())),
        }
    }
}

impl Hinter for ShellHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos != line.len() || !line.starts_with('/') || line.contains(' ') {
            return None;
        }
        COMMANDS
            .iter()
            .find(|c| c.name.len() > line.len() && c.name.starts_with(line))
            .map(|c| c.name[line.len()..].to_string())
    }
}

impl Highlighter for ShellHelper {}
impl Validator for ShellHelper {}
impl Helper for ShellHelper {}

/// Tab accepts a visible hint, otherwise completes.
struct TabAction;

impl ConditionalEventHandler for TabAction {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        Some(if ctx.has_hint() {
            Cmd::CompleteHint
        } else {
            Cmd::Complete
        })
    }
}

fn editor() -> rustyline::Result<Editor<ShellHelper, DefaultHistory>> {
    let config = Config::builder()
        .auto_add_history(true)
        .history_ignore_space(true)
        .completion_type(CompletionType::List)
        .build();
    let mut rl = Editor::with_config(config)?;
    rl.set_helper(Some(ShellHelper));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabAction)),
    );
    Ok(rl)
}

fn history_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(|home| PathBuf::from(home).join(".arc_history"))
}

#[derive(PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

struct Session {
    store_path: String,
    base: Option<String>,
}

/// Run the shell against the store at `store_path` until `/exit` or EOF.
pub async fn run(store_path: &str) -> anyhow::Result<()> {
    eprintln!(
        "\n  \x1b[1marc {}\x1b[0m \x1b[90mstore {store_path}\x1b[0m\n  \x1b[90m/help for commands, Tab completes\x1b[0m\n",
        env!("CARGO_PKG_VERSION")
    );

    let mut rl = editor()?;
    let history = history_path();
    if let Some(path) = &history {
        let _ = rl.load_history(path);
    }

    let mut session = Session {
        store_path: store_path.to_string(),
        base: None,
    };

    loop {
        // Reading a line blocks; keep it off the async scheduler.
        match tokio::task::block_in_place(|| rl.readline(PROMPT)) {
            Ok(line) => {
                if session.execute(line.trim()).await == Flow::Exit {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => eprintln!("  \x1b[90m/exit to leave\x1b[0m"),
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    if let Some(path) = &history {
        let _ = rl.save_history(path);
    }
    Ok(())
}

impl Session {
    async fn execute(&mut self, line: &str) -> Flow {
        if line.is_empty() {
            return Flow::Continue;
        }
        let Some(input) = line.strip_prefix('/') else {
            eprintln!("  Commands start with '/'. Try /help.");
            return Flow::Continue;
        };
        let (cmd, args) = input
            .split_once(' ')
            .map(|(c, a)| (c, a.trim()))
            .unwrap_or((input, ""));

        let outcome = match cmd {
            "exit" | "quit" => return Flow::Exit,
            "" | "help" | "?" => {
                help();
                Ok(())
            }
            "clear" => {
                eprint!("\x1b[2J\x1b[H");
                Ok(())
            }
            "boot" => self.boot(args).await,
            "base" => self.set_base(args),
            "dispatch" => dispatch(args).await,
            "token" => tokens(args),
            "frame" => frame(args),
            "bundle" => bundle(args),
            "cache" => self.cache(),
            "store" => self.switch_store(args),
            "purge" => self.purge(),
            other => Err(anyhow::anyhow!("Unknown command '/{other}'. Try /help.")),
        };
        if let Err(e) = outcome {
            eprintln!("  \x1b[31m{e:#}\x1b[0m");
        }
        Flow::Continue
    }

    /// The capability check is skipped: the shell has no user agent.
    async fn boot(&self, args: &str) -> anyhow::Result<()> {
        anyhow::ensure!(!args.is_empty(), "Usage: /boot <manifest.json>");
        let manifest = Manifest::from_path(Path::new(args))?;
        let base = resolve_base(self.base.as_deref())?;
        let transport = transport::for_base(&base, None)?;
        let context = Arc::new(Context::new(FileStore::open(&self.store_path)?));

        let mut booter = Booter::new(context, transport, base);
        booter.set_resources(manifest);
        let mut page = Document::new();
        let report = booter.boot(&mut page, true).await?;

        eprintln!(
            "  {} injected ({} cached, {} fetched), {} skipped, {} missing, {} stalled in {}ms",
            report.injected,
            report.cached,
            report.fetched,
            report.skipped,
            report.missing,
            report.stalled,
            report.elapsed_ms
        );
        for element in page.head().iter().chain(page.body()) {
            if let Some(id) = &element.id {
                eprintln!("    <{}> {id}", element.tag);
            }
        }
        Ok(())
    }

    fn set_base(&mut self, args: &str) -> anyhow::Result<()> {
        if !args.is_empty() {
            resolve_base(Some(args))?;
            self.base = Some(args.to_string());
        }
        eprintln!("  Base: {}", resolve_base(self.base.as_deref())?);
        Ok(())
    }

    fn open_cache(&self) -> anyhow::Result<VersionedCache<FileStore>> {
        let store = FileStore::open(&self.store_path)
            .with_context(|| format!("opening {}", self.store_path))?;
        Ok(VersionedCache::new(store))
    }

    fn cache(&self) -> anyhow::Result<()> {
        let cache = self.open_cache()?;
        let version = cache
            .persisted_version()
            .map_or_else(|| "none".to_string(), |v| v.to_string());
        eprintln!("  Store:   {}", self.store_path);
        eprintln!("  Version: {version}");
        eprintln!("  Entries: {}", cache.entry_count());
        Ok(())
    }

    fn switch_store(&mut self, args: &str) -> anyhow::Result<()> {
        anyhow::ensure!(!args.is_empty(), "Usage: /store <file.arcs>");
        let store = FileStore::open(args).with_context(|| format!("opening {args}"))?;
        eprintln!("  Using {args} ({} entries)", store.len());
        self.store_path = args.to_string();
        Ok(())
    }

    fn purge(&self) -> anyhow::Result<()> {
        self.open_cache()?.clear()?;
        eprintln!("  Cleared {}", self.store_path);
        Ok(())
    }
}

fn help() {
    eprintln!();
    for c in COMMANDS {
        eprintln!("  {:<10} {:<24} {}", c.name, c.usage, c.about);
    }
    eprintln!();
}

async fn dispatch(args: &str) -> anyhow::Result<()> {
    let (endpoint, raw) = args
        .split_once(' ')
        .context("Usage: /dispatch <endpoint> <pipe json>")?;
    let fields = match serde_json::from_str(raw.trim())? {
        Value::Object(fields) => fields,
        other => anyhow::bail!("expected a JSON object, got {other}"),
    };
    let model = fields
        .get("model")
        .and_then(Value::as_str)
        .context("the pipe needs a string 'model'")?
        .to_string();

    let machine = Machine::new(
        Arc::new(Context::in_memory()),
        Arc::new(HttpTransport::new(None)?),
        MachineConfig {
            endpoint: Some(endpoint.to_string()),
            timeout: None,
        },
    );
    machine.register(Model::passthrough(&model));

    match machine.invoke(fields).await? {
        Dispatch::Completed { pipe, debug, .. } | Dispatch::NoPostHook { pipe, debug, .. } => {
            if let Some(segment) = debug {
                eprintln!("  |D| {segment}");
            }
            eprintln!("{}", serde_json::to_string_pretty(&pipe)?);
        }
        Dispatch::Dropped { reason, .. } => eprintln!("  Dropped: {reason}"),
        other => eprintln!("  Not sent: {other:?}"),
    }
    Ok(())
}

fn tokens(args: &str) -> anyhow::Result<()> {
    anyhow::ensure!(!args.is_empty(), "Usage: /token <path>...");
    for path in args.split_whitespace() {
        match Token::parse(path) {
            Ok(Parsed::Local(token)) => {
                eprintln!("  {path:<32} {:<28} {}", token.cache_key, token.content_type)
            }
            Ok(Parsed::NotImplemented { .. }) => eprintln!("  {path:<32} not implemented"),
            Err(e) => eprintln!("  {path:<32} {e}"),
        }
    }
    Ok(())
}

fn frame(args: &str) -> anyhow::Result<()> {
    anyhow::ensure!(!args.is_empty(), "Usage: /frame <|D|debug|A|data or |A|data>");
    let frame = parse_frame(args)?;
    if let Some(segment) = frame.debug {
        eprintln!("  debug: {segment}");
    }
    eprintln!("  data:  {}", frame.data);
    Ok(())
}

fn bundle(args: &str) -> anyhow::Result<()> {
    let mut parts = args.split_whitespace();
    let path = parts.next().context("Usage: /bundle <file.txt> [variant]")?;
    let variant = parts.next();

    let text = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let entries = parse_bundle(&text);
    eprintln!("  {path}: {} entries", entries.len());
    for entry in select(&entries, variant) {
        eprintln!("    {:<32} {} bytes", entry.cache_key(), entry.body.len());
    }
    Ok(())
}
