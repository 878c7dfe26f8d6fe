use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "margin")]
#[command(about = "Highlight and annotate exam study material from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// User the highlights belong to
    #[arg(long, global = true, value_name = "ID")]
    pub user: Option<String>,

    /// Optional path to a JSON config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Highlight a passage of a material
    #[command(alias = "new")]
    Add {
        /// Material the source belongs to
        #[arg(short, long)]
        material: String,
        /// HTML file, or text-layer JSON (`.json`)
        #[arg(short, long, value_name = "PATH")]
        source: PathBuf,
        /// Exact text to highlight
        quote: Vec<String>,
        /// Which occurrence of the quote to anchor (1-based)
        #[arg(long, default_value = "1")]
        occurrence: usize,
        /// Highlight color
        #[arg(short, long, value_enum, default_value_t = ColorArg::Yellow)]
        color: ColorArg,
        /// Question the passage answers
        #[arg(long, value_name = "ID")]
        question: Option<String>,
        /// Note to attach right away
        #[arg(long)]
        note: Option<String>,
    },
    /// List highlights
    List {
        /// Only show highlights on this material
        #[arg(short, long)]
        material: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Paint a material's highlights and print the result
    Render {
        #[arg(short, long)]
        material: String,
        /// HTML file, or text-layer JSON (`.json`)
        #[arg(short, long, value_name = "PATH")]
        source: PathBuf,
        /// Painting strategy; text layers default to overlay
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Attach, replace, or remove a highlight's note
    Note {
        /// Highlight ID or unique ID prefix
        id: String,
        /// Note content (stdin or $EDITOR when omitted)
        content: Vec<String>,
        /// Remove the note instead
        #[arg(long, conflicts_with = "content")]
        clear: bool,
    },
    /// Delete a highlight
    Delete {
        /// Highlight ID or unique ID prefix
        id: String,
    },
    /// Export highlights
    Export {
        /// Export format
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        /// Only export highlights on this material
        #[arg(short, long)]
        material: Option<String>,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Push queued offline changes to the remote store
    Sync,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ColorArg {
    Yellow,
    Green,
    Red,
    Blue,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StrategyArg {
    Wrap,
    Overlay,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Markdown,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

impl From<ColorArg> for margin_core::HighlightColor {
    fn from(color: ColorArg) -> Self {
        match color {
            ColorArg::Yellow => Self::Yellow,
            ColorArg::Green => Self::Green,
            ColorArg::Red => Self::Red,
            ColorArg::Blue => Self::Blue,
        }
    }
}

impl From<StrategyArg> for margin_core::render::RenderStrategy {
    fn from(strategy: StrategyArg) -> Self {
        match strategy {
            StrategyArg::Wrap => Self::Wrap,
            StrategyArg::Overlay => Self::Overlay,
        }
    }
}

impl From<ExportFormat> for margin_core::export::ExportFormat {
    fn from(format: ExportFormat) -> Self {
        match format {
            ExportFormat::Json => Self::Json,
            ExportFormat::Markdown => Self::Markdown,
        }
    }
}
