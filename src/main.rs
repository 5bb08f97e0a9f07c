use clap::Parser;
use tenantenc::cli::{commands, output, Cli, Commands};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so tokens and plaintext on stdout stay pipeable.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let result = match cli.command {
        Commands::Encrypt { tenant, ref value } => {
            commands::encrypt::execute(&cli, tenant, value.as_deref())
        }
        Commands::Decrypt { tenant, ref token } => commands::decrypt::execute(&cli, tenant, token),
        Commands::Put {
            tenant,
            ref path,
            ref value,
        } => commands::put::execute(&cli, tenant, path, value.as_deref()),
        Commands::Get { tenant, ref path } => commands::get::execute(&cli, tenant, path),
        Commands::Rotate {
            tenant,
            actor,
            ref reason,
            json,
        } => commands::rotate::execute(&cli, tenant, actor, reason.as_deref(), json),
        Commands::Metadata { tenant, json } => commands::metadata::execute(&cli, tenant, json),
        Commands::Keys { tenant } => commands::keys::execute(&cli, tenant),
        Commands::Audit {
            tenant,
            last,
            ref since,
        } => commands::audit_cmd::execute(&cli, tenant, last, since.as_deref()),
        Commands::Keygen => commands::keygen::execute(),
    };

    if let Err(e) = result {
        output::error(&e.to_string());
        std::process::exit(1);
    }
}
