use clap::{Parser, Subcommand};
use env_logger::fmt::Formatter;
use log::{info, Record};
use std::io::Write;
use std::path::PathBuf;
use taxifare::model::loader::load_model;
use taxifare::model::model_manager::{log_load_error, ModelManager};
use taxifare::model::model_utils::{default_model_path, Backend};
use taxifare::serve::run_server;

/// Web service estimating NYC taxi fares with a pre-trained regressor
#[derive(Parser, Debug)]
#[command(
    name = "taxifare",
    version,
    about = "Serve taxi fare predictions from a pre-trained regression model",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// load the model and serve predictions over HTTP
    Serve {
        /// host to listen to
        #[arg(short('H'), long, default_value = "127.0.0.1")]
        host: String,

        /// port to listen to
        #[arg(short, long, default_value = "5000")]
        port: u16,

        /// Path to the ONNX model artifact.
        #[arg(short, long, default_value_os_t = default_model_path())]
        model: PathBuf,
    },

    /// load the model without serving it, optionally predicting one trip
    Check {
        /// Path to the ONNX model artifact.
        #[arg(short, long, default_value_os_t = default_model_path())]
        model: PathBuf,

        /// JSON object with the same fields /predict accepts
        #[arg(short, long)]
        input: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .format(|buf: &mut Formatter, record: &Record| {
            writeln!(
                buf,
                "[{} {}] {}",
                chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                record.level(),
                record.args()
            )
        })
        .filter_module("ort", log::LevelFilter::Error)
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { host, port, model } => {
            let manager = ModelManager::load(model, Backend::ONNX).await;
            run_server(host.to_string(), port.to_owned(), manager).await?;
        }

        Commands::Check { model, input } => {
            let regressor = match load_model(model, Backend::ONNX).await {
                Ok(regressor) => regressor,
                Err(err) => {
                    log_load_error(&err);
                    return Err(err.into());
                }
            };
            info!("Model at {} is ready to serve", model.display());

            if let Some(input) = input {
                let manager = ModelManager::new(Some(regressor));
                let prediction = manager.predict_body(input.as_bytes()).await?;
                println!("{}", serde_json::json!({ "prediction": prediction }));
            }
        }
    }

    Ok(())
}
