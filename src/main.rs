use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use famtree::*;

#[derive(Parser)]
#[command(name = "famtree")]
#[command(about = "Lay out and extend a two-sided family tree")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute node placements and edges for a member collection.
    Layout(LayoutArgs),
    /// Add a relative through the add-relative flow and save the result.
    Add(AddArgs),
}

#[derive(Args)]
struct SourceArgs {
    /// JSON array of family members.
    input: Option<PathBuf>,
    /// Use the household backend at this address instead of a file.
    #[cfg(feature = "http")]
    #[arg(long)]
    base_url: Option<String>,
}

#[derive(Args)]
struct LayoutArgs {
    #[command(flatten)]
    source: SourceArgs,
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// JSON file overriding layout constants.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 1.0)]
    scale: f32,
    #[arg(long, default_value = "white")]
    background: String,
}

#[derive(Args)]
struct AddArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// parent, child, sibling, spouse or self.
    #[arg(long)]
    action: ActionKind,
    /// Id of the member the new relative is attached to.
    #[arg(long)]
    base: Option<String>,
    /// Side to register on when the action is self.
    #[arg(long, value_enum, default_value_t = SideArg::Husband)]
    side: SideArg,
    #[arg(long)]
    name: String,
    #[arg(long, value_enum)]
    gender: Option<GenderArg>,
    #[arg(long)]
    relation: Option<String>,
    /// Where to write the updated collection; defaults to the input file.
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Svg,
    Png,
}

#[derive(Clone, Copy, ValueEnum)]
enum SideArg {
    Husband,
    Wife,
}

#[derive(Clone, Copy, ValueEnum)]
enum GenderArg {
    Male,
    Female,
}

impl From<SideArg> for Side {
    fn from(value: SideArg) -> Self {
        match value {
            SideArg::Husband => Side::Husband,
            SideArg::Wife => Side::Wife,
        }
    }
}

impl From<GenderArg> for Gender {
    fn from(value: GenderArg) -> Self {
        match value {
            GenderArg::Male => Gender::Male,
            GenderArg::Female => Gender::Female,
        }
    }
}

enum Source {
    File(PathBuf),
    #[cfg(feature = "http")]
    Remote(HttpMemberApi),
}

impl SourceArgs {
    #[cfg(feature = "http")]
    fn remote(&self) -> Result<Option<Source>> {
        self.base_url
            .as_deref()
            .map(|url| HttpMemberApi::new(url).map(Source::Remote))
            .transpose()
    }

    #[cfg(not(feature = "http"))]
    fn remote(&self) -> Result<Option<Source>> {
        Ok(None)
    }

    fn resolve(&self) -> Result<Source> {
        if let Some(remote) = self.remote()? {
            return Ok(remote);
        }
        self.input
            .clone()
            .map(Source::File)
            .ok_or_else(|| anyhow!("a members file is required"))
    }
}

impl Source {
    async fn members(&self) -> Result<Vec<Member>> {
        match self {
            Source::File(path) => read_members(path),
            #[cfg(feature = "http")]
            Source::Remote(api) => api.list_members().await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Layout(args) => run_layout(args).await,
        Commands::Add(args) => run_add(args).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run_layout(args: LayoutArgs) -> Result<()> {
    let members = args.source.resolve()?.members().await?;
    let config = match &args.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read layout config '{}'", path.display()))?;
            serde_json::from_str::<LayoutConfig>(&raw)
                .with_context(|| format!("invalid layout config '{}'", path.display()))?
        }
        None => LayoutConfig::default(),
    };

    let view = chart_with(&members, &config);
    let options = RenderOptions {
        background: args.background,
        scale: args.scale,
    };

    let bytes = match (args.format, &view) {
        (OutputFormat::Json, _) => {
            let mut body = serde_json::to_string_pretty(&view)?;
            body.push('\n');
            body.into_bytes()
        }
        (_, ChartView::Empty { .. }) => {
            bail!("no family members to draw; register a self member first")
        }
        (OutputFormat::Svg, ChartView::Tree(tree)) => render_svg(tree, &options)?.into_bytes(),
        (OutputFormat::Png, ChartView::Tree(tree)) => {
            if args.output.is_none() {
                bail!("PNG output requires --output");
            }
            render_png(tree, &options)?
        }
    };

    emit(args.output.as_deref(), &bytes)
}

async fn run_add(args: AddArgs) -> Result<()> {
    match args.source.resolve()? {
        Source::File(path) => {
            let api = MemoryMemberApi::with_members(read_members(&path)?);
            let members = add_relative(&api, &args).await?;
            let target = args.output.as_deref().unwrap_or(path.as_path());
            write_members(target, &members)?;
            info!(path = %target.display(), total = members.len(), "members saved");
        }
        #[cfg(feature = "http")]
        Source::Remote(api) => {
            let members = add_relative(&api, &args).await?;
            let mut body = serde_json::to_string_pretty(&members)?;
            body.push('\n');
            emit(args.output.as_deref(), body.as_bytes())?;
        }
    }
    Ok(())
}

async fn add_relative<A>(api: &A, args: &AddArgs) -> Result<Vec<Member>>
where
    A: MemberApi + ?Sized,
{
    let current = api.list_members().await?;
    let base = match &args.base {
        Some(id) => Some(
            current
                .iter()
                .rev()
                .find(|member| member.id == *id)
                .ok_or_else(|| anyhow!("family member '{id}' not found"))?,
        ),
        None => None,
    };
    let entry = EntryPoint {
        side: args.side.into(),
        generation: 0,
    };

    let mut flow = AddRelativeFlow::new();
    flow.open(args.action, base, Some(entry))?;
    flow.set_name(args.name.clone())?;
    if let Some(gender) = args.gender {
        flow.set_gender(gender.into())?;
    }
    if let Some(relation) = &args.relation {
        flow.set_relation(relation)?;
    }

    Ok(flow.submit(api).await?)
}

fn emit(output: Option<&Path>, bytes: &[u8]) -> Result<()> {
    match output {
        Some(path) => fs::write(path, bytes)
            .with_context(|| format!("failed to write '{}'", path.display())),
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
            Ok(())
        }
    }
}
