/// Cadence - drive the media pipeline from the command line
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Chunked streaming, spectrum and waveform tools", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "cadence.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a track through the chunked ingestion engine
    Stream {
        /// Track URL (http/https) or local file path
        source: String,
        /// Write the buffered bytes to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Bytes per ranged read
        #[arg(long)]
        chunk_size: Option<u64>,
        /// MIME type negotiated with the sink
        #[arg(long)]
        mime: Option<String>,
    },
    /// Render the waveform of a track
    Waveform {
        /// Track URL (http/https) or local file path
        source: String,
        /// Canvas width in pixels
        #[arg(short, long, default_value_t = 400)]
        width: u32,
        #[arg(long, value_enum, default_value_t = ThemeArg::Dark)]
        theme: ThemeArg,
        /// Played fraction of the track, 0.0 to 1.0
        #[arg(long, default_value_t = 0.0)]
        progress: f64,
        /// Write the rendered frame as SVG
        #[arg(long)]
        svg: Option<PathBuf>,
    },
    /// Render the frequency bars of a local track at a point in time
    Spectrum {
        /// Local audio file
        path: PathBuf,
        /// Viewport width in pixels
        #[arg(short, long)]
        width: Option<u32>,
        /// Position in seconds to analyse up to
        #[arg(long, default_value_t = 1.0)]
        at: f64,
        #[arg(long, value_enum, default_value_t = ThemeArg::Dark)]
        theme: ThemeArg,
        /// Write the rendered frame as SVG
        #[arg(long)]
        svg: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ThemeArg {
    Light,
    Dark,
}

impl From<ThemeArg> for cadence_core::Theme {
    fn from(theme: ThemeArg) -> Self {
        match theme {
            ThemeArg::Light => Self::Light,
            ThemeArg::Dark => Self::Dark,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence=info,cadence_stream=info,cadence_visual=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cadence_core::PipelineConfig::load_from(&cli.config)?;

    match cli.command {
        Commands::Stream {
            source,
            out,
            chunk_size,
            mime,
        } => {
            let mut settings = config.stream;
            if let Some(chunk_size) = chunk_size {
                settings.chunk_size = chunk_size;
            }
            if let Some(mime) = mime {
                settings.mime_type = mime;
            }
            commands::stream::run(&source, settings, out.as_deref()).await?;
        }
        Commands::Waveform {
            source,
            width,
            theme,
            progress,
            svg,
        } => {
            commands::waveform::run(
                &source,
                config.stream.request_timeout(),
                config.waveform,
                commands::waveform::View {
                    width,
                    theme: theme.into(),
                    progress,
                },
                svg.as_deref(),
            )
            .await?;
        }
        Commands::Spectrum {
            path,
            width,
            at,
            theme,
            svg,
        } => {
            commands::spectrum::run(&path, config.equalizer, width, at, theme.into(), svg.as_deref())
                .await?;
        }
    }

    Ok(())
}
