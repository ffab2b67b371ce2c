//! jx CLI - operate Jenkins X teams, users, environments and extensions

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use colored::Colorize;
use jx::commands;
use jx::config::Settings;
use jx::k8s::Kubectl;
use jx::utils::errors::{JxError, display_error_and_exit, enhance_error};
use jx::utils::{CommonPrereqs, Prerequisite, dryrun, logger};
use jx::{log_info, log_warn};
use std::io;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "jx")]
#[command(author, version, about = "Operate Jenkins X on Kubernetes", long_about = None)]
struct Cli {
    /// Verbose output (can be used multiple times: -v, -vv, -vvv)
    /// -v: INFO, -vv: DEBUG, -vvv: TRACE
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Dry-run mode: show what would be done without making changes
    #[arg(long, global = true)]
    dry_run: bool,

    /// Path to kubeconfig file
    #[arg(long, global = true, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Dev namespace holding the team resources (default from config: jx)
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create teams, users and environments
    Create {
        #[command(subcommand)]
        command: CreateCommands,
    },

    /// Delete teams and users
    Delete {
        #[command(subcommand)]
        command: DeleteCommands,
    },

    /// Display resources
    Get {
        #[command(subcommand)]
        command: GetCommands,
    },

    /// Edit role assignments
    Edit {
        #[command(subcommand)]
        command: EditCommands,
    },

    /// Run controllers
    Controller {
        #[command(subcommand)]
        command: ControllerCommands,
    },

    /// Upgrade installed components
    Upgrade {
        #[command(subcommand)]
        command: UpgradeCommands,
    },

    /// Wait for resources to become ready
    Wait {
        #[command(subcommand)]
        command: WaitCommands,
    },

    /// Check prerequisites
    Check,

    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum CreateCommands {
    /// Create a Team
    Team {
        name: String,

        /// Team member login (repeatable)
        #[arg(short, long = "member")]
        members: Vec<String>,
    },

    /// Create a User
    User {
        login: String,

        /// Display name (defaults to the title-cased login)
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,
    },

    /// Create an Environment
    Env {
        name: String,

        /// Namespace the environment deploys into (default: jx-<name>)
        #[arg(long)]
        env_namespace: Option<String>,

        /// Promotion strategy: auto, manual or never
        #[arg(long)]
        promotion: Option<String>,

        /// Promotion order (default: after the last environment)
        #[arg(long)]
        order: Option<i32>,

        /// Create a preview environment
        #[arg(long)]
        preview: bool,
    },
}

#[derive(Subcommand)]
enum DeleteCommands {
    /// Delete a Team
    Team {
        name: String,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete a User and remove it from all role bindings
    User {
        login: String,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum GetCommands {
    /// List Teams
    Teams,

    /// List Users
    Users,

    /// List Environments in promotion order
    #[command(visible_alias = "envs")]
    Environments,

    /// List team roles and their subjects
    Roles,
}

#[derive(Subcommand)]
enum EditCommands {
    /// Set the roles of a user or service account
    Userroles {
        login: String,

        /// Role to hold (repeatable); prints the current roles when omitted
        #[arg(short, long = "role")]
        roles: Vec<String>,

        /// The login is a ServiceAccount
        #[arg(long)]
        service_account: bool,
    },
}

#[derive(Subcommand)]
enum ControllerCommands {
    /// Copy EnvironmentRoleBindings into every environment namespace
    Role {
        /// Reconcile once and exit
        #[arg(long)]
        no_watch: bool,
    },
}

#[derive(Subcommand)]
enum UpgradeCommands {
    /// Install or upgrade the team's configured extensions
    Extensions {
        /// Repository to read, e.g. github.com/<org>/<repo> or a lock file URL
        #[arg(long)]
        extensions_repository: Option<String>,

        /// Local lock file to read instead of a repository
        #[arg(long)]
        extensions_repository_file: Option<String>,

        /// Stream extension script output
        #[arg(long)]
        verbose_scripts: bool,
    },
}

#[derive(Subcommand)]
enum WaitCommands {
    /// Wait for pods matching a label selector
    Pods {
        /// Label selector, e.g. app=jenkins
        #[arg(short = 'l', long)]
        selector: String,

        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Wait for a deployment rollout
    Deployment {
        name: String,

        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Wait for a job to complete
    Job {
        name: String,

        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write an example configuration file
    Init {
        /// Where to write the file (defaults to the user config directory)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let settings = Settings::load();
    if !settings.colors.enabled {
        colored::control::set_override(false);
    }

    if cli.dry_run {
        dryrun::set_dry_run(true);
        println!("{}", "DRY RUN MODE: No changes will be made".cyan().bold());
        println!();
    }

    if let Err(e) = run(cli, settings) {
        display_error_and_exit(enhance_error(e));
    }
}

fn run(cli: Cli, settings: Settings) -> Result<()> {
    let ns = cli
        .namespace
        .clone()
        .unwrap_or_else(|| settings.defaults.dev_namespace.clone());
    let kubeconfig = cli
        .kubeconfig
        .clone()
        .or_else(|| settings.defaults.kubeconfig.as_ref().map(PathBuf::from));
    let client = Kubectl::new(kubeconfig);
    let skip_confirm = |yes: bool| yes || cli.dry_run || !settings.behavior.confirm_destructive;

    match cli.command {
        Commands::Create { command } => handle_create_command(&client, &ns, command),
        Commands::Delete { command } => match command {
            DeleteCommands::Team { name, yes } => {
                commands::team::delete_team(&client, &ns, &name, skip_confirm(yes))
            }
            DeleteCommands::User { login, yes } => {
                commands::user::delete_user(&client, &ns, &login, skip_confirm(yes))
            }
        },
        Commands::Get { command } => match command {
            GetCommands::Teams => commands::team::get_teams(&client, &ns),
            GetCommands::Users => commands::user::get_users(&client, &ns),
            GetCommands::Environments => commands::env::get_environments(&client, &ns),
            GetCommands::Roles => commands::roles::get_roles(&client, &ns),
        },
        Commands::Edit { command } => match command {
            EditCommands::Userroles {
                login,
                roles,
                service_account,
            } => commands::roles::edit_user_roles(
                &client,
                &ns,
                &commands::roles::EditUserRolesOptions {
                    login,
                    roles,
                    service_account,
                },
            ),
        },
        Commands::Controller { command } => match command {
            ControllerCommands::Role { no_watch } => commands::roles::controller_role(
                &client,
                &ns,
                &commands::roles::ControllerOptions {
                    watch: !no_watch,
                    resync_interval: Duration::from_secs(settings.wait.resync_interval_secs.max(1)),
                },
            ),
        },
        Commands::Upgrade { command } => match command {
            UpgradeCommands::Extensions {
                extensions_repository,
                extensions_repository_file,
                verbose_scripts,
            } => commands::extensions::upgrade_extensions(
                &client,
                &ns,
                &settings,
                &commands::extensions::UpgradeExtensionsOptions {
                    repository: extensions_repository,
                    repository_file: extensions_repository_file,
                    verbose_scripts,
                    dry_run: cli.dry_run,
                },
            ),
        },
        Commands::Wait { command } => handle_wait_command(&client, &ns, command, &settings),
        Commands::Check => handle_check_command(),
        Commands::Config { command } => handle_config_command(command, &settings),
        Commands::Completion { shell } => handle_completion_command(shell),
        Commands::Version => handle_version_command(),
    }
}

fn handle_create_command(client: &Kubectl, ns: &str, command: CreateCommands) -> Result<()> {
    match command {
        CreateCommands::Team { name, members } => {
            commands::team::create_team(client, ns, &name, &members)
        }
        CreateCommands::User { login, name, email } => commands::user::create_user(
            client,
            ns,
            &commands::user::CreateUserOptions { login, name, email },
        ),
        CreateCommands::Env {
            name,
            env_namespace,
            promotion,
            order,
            preview,
        } => {
            let promotion = promotion
                .as_deref()
                .map(commands::env::parse_promotion_strategy)
                .transpose()?;
            commands::env::create_env(
                client,
                ns,
                &commands::env::CreateEnvOptions {
                    name,
                    namespace: env_namespace,
                    promotion,
                    order,
                    preview,
                },
            )
        }
    }
}

fn handle_wait_command(
    client: &Kubectl,
    ns: &str,
    command: WaitCommands,
    settings: &Settings,
) -> Result<()> {
    use commands::wait::{WaitTarget, wait};

    let secs = |timeout: Option<u64>| timeout.map(Duration::from_secs);
    match command {
        WaitCommands::Pods { selector, timeout } => wait(
            client,
            ns,
            WaitTarget::Pods {
                selector: &selector,
            },
            secs(timeout),
            settings,
        ),
        WaitCommands::Deployment { name, timeout } => wait(
            client,
            ns,
            WaitTarget::Deployment { name: &name },
            secs(timeout),
            settings,
        ),
        WaitCommands::Job { name, timeout } => wait(
            client,
            ns,
            WaitTarget::Job { name: &name },
            secs(timeout),
            settings,
        ),
    }
}

fn handle_check_command() -> Result<()> {
    log_info!("Checking prerequisites...");

    let kubectl = CommonPrereqs::kubectl();
    let helm = CommonPrereqs::helm();
    let git = CommonPrereqs::git();
    let bash = CommonPrereqs::bash();
    let prereqs: Vec<&dyn Prerequisite> = vec![&kubectl, &helm, &git, &bash];

    let report = CommonPrereqs::check_all(&prereqs);
    for tool in &report.found {
        println!("  {} {}", "✓".green(), tool);
    }
    for (tool, _) in &report.missing {
        println!("  {} {}", "✗".red(), tool);
    }

    if report.is_satisfied() {
        println!("{}", "All prerequisites satisfied".green());
        return Ok(());
    }

    if let [(tool, hint)] = report.missing.as_slice() {
        return Err(JxError::tool_not_found(tool, hint).into());
    }
    let mut err = JxError::new(format!(
        "{} required tools missing",
        report.missing.len()
    ));
    for (tool, hint) in &report.missing {
        err = err.suggest(format!("{}: {}", tool, hint));
    }
    Err(err.into())
}

fn handle_config_command(command: ConfigCommands, settings: &Settings) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            match Settings::find_config_file() {
                Some(path) => {
                    println!("# Loaded from {}", path.display());
                    print!("{}", toml::to_string_pretty(settings)?);
                }
                None => print!("{}", Settings::example_config()?),
            }
            Ok(())
        }
        ConfigCommands::Init { path, force } => {
            let path = match path {
                Some(path) => path,
                None => Settings::default_config_path().ok_or_else(|| {
                    JxError::new("Could not determine the user config directory")
                })?,
            };
            if !Settings::init_file(&path, force)? {
                log_warn!("{} already exists, use --force to overwrite", path.display());
                return Ok(());
            }
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

fn handle_completion_command(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "jx", &mut io::stdout());
    Ok(())
}

fn handle_version_command() -> Result<()> {
    println!("jx {}", env!("CARGO_PKG_VERSION"));
    println!("Command line tool for Jenkins X");
    Ok(())
}
