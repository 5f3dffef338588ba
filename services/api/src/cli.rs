use crate::server;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use suite_territoriale::config::AppConfig;
use suite_territoriale::directory::load_directory;
use suite_territoriale::error::AppError;
use suite_territoriale::onboarding::{onboarding_page, OnboardingQuery};

#[derive(Parser, Debug)]
#[command(
    name = "suite-territoriale",
    about = "Serve La Suite territoriale or resolve onboarding cases from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Resolve the onboarding case of one organization and print it as JSON
    Resolve(ResolveArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct ResolveArgs {
    /// SIRET of the organization
    #[arg(long)]
    pub(crate) siret: String,
    /// Directory holding the CSV dumps (defaults to DIRECTORY_DATA_DIR)
    #[arg(long)]
    pub(crate) data_dir: Option<PathBuf>,
    /// Skip the partner structure choice
    #[arg(long)]
    pub(crate) direct: bool,
    /// Partner structure selected by the user
    #[arg(long)]
    pub(crate) structure_id: Option<String>,
    /// The organization already belongs to the selected structure
    #[arg(long)]
    pub(crate) existing_member: bool,
    /// Resolve as if the onboarding were open
    #[arg(long)]
    pub(crate) preview: bool,
}

impl ResolveArgs {
    fn query(&self) -> OnboardingQuery {
        OnboardingQuery {
            direct: self.direct.then(|| "1".to_string()),
            structure_id: self.structure_id.clone(),
            is_existing_member: self.existing_member.then(|| "true".to_string()),
            futur: self.preview.then(|| "1".to_string()),
        }
    }
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Resolve(args) => resolve(args),
    }
}

fn resolve(args: ResolveArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let data_dir = args
        .data_dir
        .clone()
        .or(config.directory.data_dir)
        .unwrap_or_else(|| PathBuf::from("data"));
    let directory = load_directory(&data_dir)?;

    let page = onboarding_page(&directory, &args.siret, &args.query(), config.onboarding.open);
    let rendered = serde_json::to_string_pretty(&page)
        .map_err(|err| AppError::Io(std::io::Error::other(err)))?;
    println!("{rendered}");
    Ok(())
}
