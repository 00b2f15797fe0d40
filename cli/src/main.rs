mod commands;
mod util;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::prompt::ProfileArgs;
use commands::token::KindArg;

#[derive(Parser)]
#[command(name = "mealsense", version, about = "Mealsense CLI: session restore, token refresh and error triage")]
struct Cli {
    /// API base URL
    #[arg(long, global = true, env = "MEALSENSE_API_URL")]
    api_url: Option<String>,

    /// Where the session credential is stored
    #[arg(long, global = true, env = "MEALSENSE_CREDENTIALS_PATH")]
    credentials_path: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Restore the saved session and keep tokens fresh until Ctrl-C
    Run {
        /// Print the restored state and exit
        #[arg(long)]
        once: bool,
    },
    /// Save a session token and user profile
    Login {
        #[arg(long)]
        token: String,
        /// User profile as a JSON object
        #[arg(long)]
        user: String,
        #[arg(long)]
        terms_accepted: bool,
        /// Require a biometric check on the next restore
        #[arg(long)]
        biometric: bool,
    },
    /// Remove all saved session keys
    Logout,
    /// Show which session keys are stored
    Status,
    /// Classify a backend response into a user-facing error record
    Classify {
        /// JSON file with the response body (use '-' for stdin)
        file: String,
        /// Transport failure text, e.g. "fetch failed"
        #[arg(long)]
        failure: Option<String>,
    },
    /// Screen a prompt against a health profile
    CheckPrompt {
        #[arg(long)]
        prompt: String,
        #[command(flatten)]
        profile: ProfileArgs,
    },
    /// Screen a prompt and submit it with a fresh AI token
    SubmitPrompt {
        /// API path to post to
        #[arg(long, default_value = "/v1/ai/prompt")]
        path: String,
        #[arg(long)]
        prompt: String,
        #[command(flatten)]
        profile: ProfileArgs,
    },
    /// Fetch one bearer token
    Token {
        #[arg(long, value_enum)]
        kind: KindArg,
        /// Print the full token instead of a prefix
        #[arg(long)]
        reveal: bool,
    },
    /// Send a raw authenticated request
    Api(commands::api::ApiArgs),
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mealsense=info,mealsense_session=info".into()),
        )
        .with(
            cli.log_json
                .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        )
        .with(
            (!cli.log_json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        )
        .init();

    let overrides = util::ConfigOverrides {
        api_url: cli.api_url,
        credentials_path: cli.credentials_path,
    };
    let config = || util::load_config(&overrides);

    let code = match cli.command {
        Commands::Run { once } => commands::run::run(&config(), once).await,
        Commands::Login {
            token,
            user,
            terms_accepted,
            biometric,
        } => commands::auth::login(&config(), &token, &user, terms_accepted, biometric).await,
        Commands::Logout => commands::auth::logout(&config()).await,
        Commands::Status => commands::auth::status(&config()).await,
        Commands::Classify { file, failure } => commands::classify::run(&file, failure.as_deref()),
        Commands::CheckPrompt { prompt, profile } => commands::prompt::check(&prompt, &profile),
        Commands::SubmitPrompt {
            path,
            prompt,
            profile,
        } => commands::prompt::submit(&config(), &path, &prompt, &profile).await,
        Commands::Token { kind, reveal } => {
            commands::token::run(&config(), kind, reveal).await
        }
        Commands::Api(args) => commands::api::run(&config(), args).await,
    };

    std::process::exit(code);
}
