use anyhow::Context;
use clap::Parser;
use content_manager::utils::error::{ContentError, ErrorSeverity};
use content_manager::utils::{logger, validation::Validate};
use content_manager::{AdminApp, CliConfig, CmsConfig};

fn exit_code(e: &ContentError) -> i32 {
    match e.severity() {
        ErrorSeverity::Low => 4,      // entry not found
        ErrorSeverity::Medium => 2,   // bad request or unknown model
        ErrorSeverity::High => 1,     // store, upload or config failure
        ErrorSeverity::Critical => 3, // system error
    }
}

fn fail(e: ContentError) -> ! {
    tracing::error!(
        "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(exit_code(&e));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    let config = match CmsConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Cannot load {}: {}", cli.config.display(), e);
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    logger::init_logger(cli.verbose, config.log_level(), config.log_format());
    tracing::debug!("CLI arguments: {:?}", cli);

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        fail(e);
    }

    let app = match AdminApp::from_config(&config).await {
        Ok(app) => app,
        Err(e) => fail(e),
    };

    match app.run(&cli.command).await {
        Ok(output) => {
            let rendered =
                serde_json::to_string_pretty(&output).context("rendering command output")?;
            println!("{}", rendered);
        }
        Err(e) => fail(e),
    }

    Ok(())
}
