//! GrabKit CLI - convert web content, stream downloads, run the HTTP service

mod config;
mod server;

use clap::{Parser, Subcommand, ValueEnum};
use config::ServerConfig;
use futures::StreamExt;
use grabkit::{
    ConvertRequest, Operation, OutputFormat, PayloadFormat, Tool, TransformedPayload, TOOL_LLMTXT,
};
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

/// Output format for convert subcommand
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum Output {
    /// Markdown with YAML frontmatter
    #[default]
    Md,
    /// JSON format
    Json,
}

/// GrabKit - web content conversion and streaming downloads
#[derive(Parser, Debug)]
#[command(name = "grabkit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Print full help with examples (llmtxt)
    #[arg(long)]
    llmtxt: bool,

    /// Custom User-Agent
    #[arg(long, global = true)]
    user_agent: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert a URL to text, markdown, HTML or pretty JSON
    Convert {
        /// URL to convert
        url: String,

        /// Representation for HTML pages
        #[arg(long, short, default_value = "text")]
        format: OutputFormat,

        /// Skip page metadata
        #[arg(long)]
        no_metadata: bool,

        /// Output format
        #[arg(long, short, default_value = "md")]
        output: Output,
    },
    /// HEAD a URL and describe it as JSON
    Probe {
        /// URL to probe
        url: String,
    },
    /// Stream a URL body to a file or stdout
    Download {
        /// URL to download
        url: String,

        /// Destination file (stdout when omitted)
        #[arg(long, short)]
        out: Option<PathBuf>,

        /// Range header to forward, e.g. bytes=0-1023
        #[arg(long)]
        range: Option<String>,

        /// Attachment filename to report
        #[arg(long)]
        filename: Option<String>,
    },
    /// Print the capability description as JSON
    Info,
    /// Run the HTTP service
    Serve {
        /// Bind address, overrides GRABKIT_BIND_ADDR
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Handle --llmtxt flag
    if cli.llmtxt {
        writeln_safe(TOOL_LLMTXT);
        std::process::exit(0);
    }

    let default_level = match cli.command {
        Some(Commands::Serve { .. }) => "info",
        _ => "warn",
    };
    init_tracing(default_level);

    match cli.command {
        Some(Commands::Convert {
            url,
            format,
            no_metadata,
            output,
        }) => {
            let mut request = ConvertRequest::new(url).format(format);
            if no_metadata {
                request = request.without_metadata();
            }
            run_convert(build_tool(cli.user_agent), request, output).await;
        }
        Some(Commands::Probe { url }) => {
            run_probe(build_tool(cli.user_agent), &url).await;
        }
        Some(Commands::Download {
            url,
            out,
            range,
            filename,
        }) => {
            run_download(build_tool(cli.user_agent), &url, out, range, filename).await;
        }
        Some(Commands::Info) => {
            print_json(&build_tool(cli.user_agent).capabilities());
        }
        Some(Commands::Serve { bind }) => {
            run_serve(bind, cli.user_agent).await;
        }
        None => {
            eprintln!("Usage: grabkit convert <URL>");
            eprintln!("   or: grabkit download <URL> --out <FILE>");
            eprintln!("   or: grabkit serve");
            eprintln!("   or: grabkit --help");
            std::process::exit(1);
        }
    }
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn build_tool(user_agent: Option<String>) -> Tool {
    let mut builder = Tool::builder();
    if let Some(ua) = user_agent {
        builder = builder.user_agent(ua);
    }
    builder.build().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    })
}

async fn run_convert(tool: Tool, request: ConvertRequest, output: Output) {
    match tool.convert(request).await {
        Ok(payload) => match output {
            Output::Md => writeln_safe(&format_md_with_frontmatter(&payload)),
            Output::Json => print_json(&payload),
        },
        Err(e) => {
            eprintln!("Error: {}", e.public_message(Operation::Convert));
            std::process::exit(1);
        }
    }
}

async fn run_probe(tool: Tool, url: &str) {
    match tool.probe(url).await {
        Ok(probe) => print_json(&probe.into_info(url)),
        Err(e) => {
            eprintln!("Error: {}", e.public_message(Operation::Download));
            std::process::exit(1);
        }
    }
}

async fn run_download(
    tool: Tool,
    url: &str,
    out: Option<PathBuf>,
    range: Option<String>,
    filename: Option<String>,
) {
    let mut stream = match tool.stream(url, range, filename.as_deref()).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("Error: {}", e.public_message(Operation::Download));
            std::process::exit(1);
        }
    };

    let mut sink: Box<dyn tokio::io::AsyncWrite + Unpin + Send> = match &out {
        Some(path) => match tokio::fs::File::create(path).await {
            Ok(file) => Box::new(file),
            Err(e) => {
                eprintln!("Error creating {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => Box::new(tokio::io::stdout()),
    };

    while let Some(chunk) = stream.body.next().await {
        let written = match chunk {
            Ok(chunk) => sink.write_all(&chunk).await,
            Err(e) => {
                eprintln!(
                    "Error: download interrupted after {} bytes: {}",
                    stream.body.bytes_emitted(),
                    e.public_message(Operation::Download)
                );
                std::process::exit(1);
            }
        };
        if let Err(e) = written {
            if e.kind() == io::ErrorKind::BrokenPipe {
                std::process::exit(0);
            }
            eprintln!("Error writing output: {}", e);
            std::process::exit(1);
        }
    }

    if let Err(e) = sink.flush().await {
        eprintln!("Error writing output: {}", e);
        std::process::exit(1);
    }

    eprintln!(
        "{} {} ({} bytes, {})",
        stream.status,
        stream.filename,
        stream.body.bytes_emitted(),
        stream.content_type
    );
}

async fn run_serve(bind: Option<String>, user_agent: Option<String>) {
    let config = ServerConfig::from_env().and_then(|config| match bind {
        Some(addr) => config.with_bind_addr(addr),
        None => Ok(config),
    });
    let config = config.unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });
    let config = match user_agent {
        Some(ua) => config.with_user_agent(ua),
        None => config,
    };

    let tool = config.tool().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
    tracing::info!(
        bind = config.bind_addr(),
        fetch_timeout = ?config.fetch_timeout(),
        stream_timeout = ?config.stream_timeout(),
        "Starting HTTP service"
    );

    let listener = match tokio::net::TcpListener::bind(config.bind_addr()).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Error binding {}: {}", config.bind_addr(), e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server::serve(listener, tool).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    let json = serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        eprintln!("Error serializing response: {}", e);
        std::process::exit(1);
    });
    writeln_safe(&json);
}

/// Format a payload as markdown with YAML frontmatter
fn format_md_with_frontmatter(payload: &TransformedPayload) -> String {
    let mut output = String::new();

    output.push_str("---\n");
    output.push_str(&format!("url: {}\n", payload.url));
    if !payload.content_type.is_empty() {
        output.push_str(&format!("content_type: {}\n", payload.content_type));
    }
    output.push_str(&format!("format: {}\n", format_tag(payload.format)));
    if let Some(size) = payload.size {
        output.push_str(&format!("size: {}\n", size));
    }
    if let Some(meta) = &payload.metadata {
        for (key, value) in [
            ("title", &meta.title),
            ("description", &meta.description),
            ("author", &meta.author),
            ("published_date", &meta.published_date),
            ("canonical_url", &meta.canonical_url),
            ("lang", &meta.lang),
        ] {
            if !value.is_empty() {
                output.push_str(&format!("{}: {}\n", key, value));
            }
        }
    }
    if let Some(file) = &payload.file_info {
        output.push_str(&format!("file_size: {}\n", file.file_size_formatted));
    }
    output.push_str("---\n");

    // Binary resources get a pointer instead of a body
    if let Some(content) = &payload.content {
        output.push_str(content);
    } else if payload.file_info.is_some() {
        output.push_str(&format!(
            "Binary content not converted. Use `grabkit download {}` to fetch it.",
            payload.url
        ));
    }

    output
}

fn format_tag(format: PayloadFormat) -> &'static str {
    match format {
        PayloadFormat::Json => "json",
        PayloadFormat::Text => "text",
        PayloadFormat::Markdown => "markdown",
        PayloadFormat::Html => "html",
        PayloadFormat::Binary => "binary",
    }
}

/// Write to stdout, exit silently on broken pipe
fn writeln_safe(s: &str) {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if let Err(e) = writeln!(handle, "{}", s) {
        if e.kind() == io::ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        eprintln!("Error writing to stdout: {}", e);
        std::process::exit(1);
    }
}
